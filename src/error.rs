//! Error kinds shared across the ingestion and conversation pipelines.
//!
//! Every external-service failure is converted into one of these kinds at
//! the boundary where the call is made. None of them carry partial state:
//! the caller that receives one must treat the whole operation as failed.

use thiserror::Error;

/// The failure modes of the docent pipelines.
#[derive(Debug, Error)]
pub enum Error {
    /// The uploaded bytes could not be parsed into text. Fatal; the file
    /// must be converted or replaced before resubmission.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The raw file could not be persisted to object storage. Ingestion
    /// aborts before any chunking occurs.
    #[error("storage write failed: {0}")]
    StorageWrite(String),

    /// The embeddings API rejected or failed the request (after retries).
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// The vector index rejected an upsert or query.
    #[error("index write failed: {0}")]
    IndexWrite(String),

    /// The live transcription stream dropped or refused the connection.
    /// The session must be torn down and restarted by the user.
    #[error("transcription stream error: {0}")]
    TranscriptionStream(String),

    /// The completion endpoint failed for this turn.
    #[error("completion request failed: {0}")]
    CompletionRequest(String),

    /// The speech-synthesis endpoint failed for this turn.
    #[error("synthesis request failed: {0}")]
    SynthesisRequest(String),
}

impl Error {
    /// Whether a caller adding its own retry policy may reasonably retry
    /// this kind. Network-class failures are retryable; format failures
    /// are not. Retrying an ingestion batch can write duplicate vectors
    /// (same content, different ids) — dedupe first.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::UnsupportedFormat(_))
    }
}

/// Convenience alias used throughout the pipeline modules.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_is_not_retryable() {
        assert!(!Error::UnsupportedFormat("image/png".into()).is_retryable());
    }

    #[test]
    fn network_class_errors_are_retryable() {
        assert!(Error::EmbeddingProvider("timeout".into()).is_retryable());
        assert!(Error::IndexWrite("503".into()).is_retryable());
        assert!(Error::StorageWrite("connection reset".into()).is_retryable());
        assert!(Error::CompletionRequest("429".into()).is_retryable());
    }

    #[test]
    fn display_includes_detail() {
        let e = Error::SynthesisRequest("voice not found".into());
        assert!(e.to_string().contains("voice not found"));
    }
}
