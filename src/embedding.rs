//! Embeddings API client.
//!
//! Calls an OpenAI-style `POST /v1/embeddings` endpoint and returns one
//! vector per input text, in input order. Requires the `OPENAI_API_KEY`
//! environment variable.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! All failures surface as [`Error::EmbeddingProvider`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Client for the external embeddings provider.
pub struct EmbeddingClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// Build a client from configuration, reading `OPENAI_API_KEY` from the
    /// environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::EmbeddingProvider("OPENAI_API_KEY not set".into()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::EmbeddingProvider(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
        })
    }

    /// The configured vector dimensionality.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed a batch of texts, one vector per text in input order.
    ///
    /// Inputs larger than the configured batch size are split into
    /// sequential API calls; a failure in any sub-batch fails the whole
    /// operation (vectors from earlier sub-batches are discarded).
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    /// Embed a single query text (used on the retrieval path).
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingProvider("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingResponse = response
                            .json()
                            .await
                            .map_err(|e| Error::EmbeddingProvider(e.to_string()))?;
                        let vectors = order_vectors(parsed, texts.len())?;
                        if let Some(v) = vectors.iter().find(|v| v.len() != self.dims) {
                            return Err(Error::EmbeddingProvider(format!(
                                "model returned {}-dim vectors, index expects {}",
                                v.len(),
                                self.dims
                            )));
                        }
                        return Ok(vectors);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "embedding request failed, retrying");
                        last_err = Some(format!("HTTP {status}: {body_text}"));
                        continue;
                    }

                    return Err(Error::EmbeddingProvider(format!(
                        "HTTP {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "embedding request errored, retrying");
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(Error::EmbeddingProvider(
            last_err.unwrap_or_else(|| "retries exhausted".into()),
        ))
    }
}

/// Reorder response vectors by their reported index so the output matches
/// the input order regardless of how the provider ordered them.
fn order_vectors(parsed: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if parsed.data.len() != expected {
        return Err(Error::EmbeddingProvider(format!(
            "expected {expected} vectors, got {}",
            parsed.data.len()
        )));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for datum in parsed.data {
        let slot = slots
            .get_mut(datum.index)
            .ok_or_else(|| Error::EmbeddingProvider(format!("index {} out of range", datum.index)))?;
        *slot = Some(datum.embedding);
    }

    slots
        .into_iter()
        .map(|s| s.ok_or_else(|| Error::EmbeddingProvider("missing vector index".into())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datum(index: usize, v: f32) -> EmbeddingDatum {
        EmbeddingDatum {
            index,
            embedding: vec![v],
        }
    }

    #[test]
    fn out_of_order_response_is_reordered() {
        let parsed = EmbeddingResponse {
            data: vec![datum(1, 2.0), datum(0, 1.0)],
        };
        let vectors = order_vectors(parsed, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn count_mismatch_is_an_error() {
        let parsed = EmbeddingResponse {
            data: vec![datum(0, 1.0)],
        };
        assert!(order_vectors(parsed, 2).is_err());
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let parsed = EmbeddingResponse {
            data: vec![datum(5, 1.0)],
        };
        assert!(order_vectors(parsed, 1).is_err());
    }
}
