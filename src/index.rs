//! Vector index client.
//!
//! Talks to a Pinecone-style REST index: `POST /vectors/upsert` on the
//! write path and `POST /query` on the retrieval path. Every call is
//! scoped to a namespace; queries never cross namespaces. Requires the
//! `DOCENT_INDEX_API_KEY` environment variable.
//!
//! Upserts are not atomic across a batch: a failed call may leave a prefix
//! of the batch written, and resubmitting a document mints fresh chunk ids,
//! so retries can create duplicate entries sharing content. The ingestion
//! orchestrator treats any failure as whole-batch failure and surfaces it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::config::IndexConfig;
use crate::error::{Error, Result};

/// A chunk text retrieved from the index with its similarity score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    pub source: Option<String>,
}

/// Client for the external vector index.
pub struct IndexClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    top_k: usize,
}

#[derive(Serialize)]
struct UpsertRequest {
    vectors: Vec<VectorRecord>,
    namespace: String,
}

#[derive(Serialize)]
struct VectorRecord {
    id: String,
    values: Vec<f32>,
    metadata: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    namespace: &'a str,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    score: f32,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

/// Metadata key under which the chunk's text is stored in the index.
const META_TEXT: &str = "text";

impl IndexClient {
    /// Build a client from configuration, reading `DOCENT_INDEX_API_KEY`
    /// from the environment.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let api_key = std::env::var("DOCENT_INDEX_API_KEY")
            .map_err(|_| Error::IndexWrite("DOCENT_INDEX_API_KEY not set".into()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::IndexWrite(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            top_k: config.top_k,
        })
    }

    /// Write one (vector, text, metadata) record per chunk under the
    /// chunk's namespace. `vectors` must be parallel to `chunks`.
    pub async fn upsert(&self, chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::IndexWrite(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let Some(first) = chunks.first() else {
            return Err(Error::IndexWrite("empty chunk batch".into()));
        };
        let namespace = first.namespace.clone();

        let records = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| {
                let mut metadata = chunk.metadata.clone();
                metadata.insert(META_TEXT.to_string(), chunk.text.clone());
                metadata.insert("chunk_index".to_string(), chunk.index.to_string());
                VectorRecord {
                    id: chunk.id.clone(),
                    values,
                    metadata,
                }
            })
            .collect();

        let body = UpsertRequest {
            vectors: records,
            namespace,
        };

        let response = self
            .http
            .post(format!("{}/vectors/upsert", self.base_url))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::IndexWrite(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::IndexWrite(format!("HTTP {status}: {body_text}")));
        }

        Ok(())
    }

    /// Query the namespace for the chunks most similar to `vector`.
    pub async fn query(&self, namespace: &str, vector: &[f32]) -> Result<Vec<RetrievedChunk>> {
        let body = QueryRequest {
            vector,
            top_k: self.top_k,
            namespace,
            include_metadata: true,
        };

        let response = self
            .http
            .post(format!("{}/query", self.base_url))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::IndexWrite(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::IndexWrite(format!("HTTP {status}: {body_text}")));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::IndexWrite(e.to_string()))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|mut m| RetrievedChunk {
                text: m.metadata.remove(META_TEXT).unwrap_or_default(),
                score: m.score,
                source: m.metadata.remove(crate::chunk::META_SOURCE),
            })
            .collect())
    }
}
