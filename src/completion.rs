//! Chat completion client and grounded prompt composition.
//!
//! [`CompletionClient`] calls an OpenAI-style `POST /v1/chat/completions`
//! endpoint with a typed message list. [`GroundedResponder`] layers
//! retrieval on top: the utterance is embedded, the namespace queried, and
//! the retrieved chunk texts folded into a system message ahead of the
//! conversation history, so replies are grounded in the uploaded documents
//! rather than the model's general knowledge.
//!
//! Requires the `OPENAI_API_KEY` environment variable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::index::{IndexClient, RetrievedChunk};

/// A single chat message on the completion wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for the external completion provider.
pub struct CompletionClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    /// Build a client from configuration, reading `OPENAI_API_KEY` from
    /// the environment.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::CompletionRequest("OPENAI_API_KEY not set".into()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::CompletionRequest(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            api_key,
            model: config.model.clone(),
        })
    }

    /// Request one completion for the given message list.
    ///
    /// The request is bounded by the configured timeout and is not
    /// retried; a conversational turn should fail fast rather than reply
    /// half a minute late.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::CompletionRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::CompletionRequest(format!(
                "HTTP {status}: {body_text}"
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::CompletionRequest(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| Error::CompletionRequest("empty completion".into()))
    }
}

const SYSTEM_PREAMBLE: &str = "You are a voice assistant answering questions about the user's \
uploaded documents. Answer using only the document excerpts below. If the excerpts do not \
contain the answer, say you don't know. Keep replies short and suitable for being read aloud.";

/// Fold retrieved chunks into the system message that precedes the
/// conversation history.
pub fn grounding_prompt(chunks: &[RetrievedChunk]) -> String {
    let mut prompt = String::from(SYSTEM_PREAMBLE);
    if chunks.is_empty() {
        prompt.push_str("\n\nNo relevant excerpts were found for this question.");
        return prompt;
    }

    prompt.push_str("\n\nDocument excerpts:");
    for (i, chunk) in chunks.iter().enumerate() {
        prompt.push_str(&format!("\n\n[{}]", i + 1));
        if let Some(ref source) = chunk.source {
            prompt.push_str(&format!(" (from {source})"));
        }
        prompt.push('\n');
        prompt.push_str(&chunk.text);
    }
    prompt
}

/// Retrieval-augmented reply generation: embed, query, compose, complete.
pub struct GroundedResponder {
    embedder: EmbeddingClient,
    index: IndexClient,
    completion: CompletionClient,
}

impl GroundedResponder {
    pub fn new(embedder: EmbeddingClient, index: IndexClient, completion: CompletionClient) -> Self {
        Self {
            embedder,
            index,
            completion,
        }
    }

    /// Produce a grounded reply to `utterance` within `namespace`.
    ///
    /// `history` carries the prior user/assistant turns in order; the
    /// grounding system message is composed fresh for every call, so each
    /// question retrieves its own context.
    pub async fn reply(
        &self,
        namespace: &str,
        utterance: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        let query_vector = self.embedder.embed_query(utterance).await?;
        let retrieved = self.index.query(namespace, &query_vector).await?;
        tracing::debug!(
            namespace,
            retrieved = retrieved.len(),
            "retrieved grounding chunks"
        );

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(grounding_prompt(&retrieved)));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(utterance));

        self.completion.complete(&messages).await
    }
}
