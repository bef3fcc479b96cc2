//! Ingestion orchestration.
//!
//! Coordinates the full upload flow: durable storage write → text
//! extraction → chunking → provenance stamping → embedding → index upsert.
//! Tracks a per-namespace [`ProcessingState`] that moves strictly forward
//! (`NotInitiated → Processing → Processed`) and falls back to
//! `NotInitiated` on any failure — the file must be resubmitted whole, no
//! partial resume. Note that resubmission after a partial index write can
//! leave duplicate vectors behind (same content, fresh ids).
//!
//! Concurrent ingestion into one namespace is not coordinated: a second
//! caller observes `Processing` but nothing stops it, and no ordering
//! between the two batches is promised.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::chunk::{self, META_SOURCE};
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::extract::extract_text;
use crate::index::IndexClient;
use crate::storage::ObjectStore;

/// Where a namespace's document stands in the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingState {
    NotInitiated,
    Processing,
    Processed,
}

/// Summary returned on successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub namespace: String,
    pub stored_path: String,
    pub chunk_count: usize,
}

/// The ingestion orchestrator: owns the storage, embedding, and index
/// clients plus the per-namespace state map.
pub struct Ingestor {
    store: ObjectStore,
    embedder: EmbeddingClient,
    index: IndexClient,
    chunking: ChunkingConfig,
    states: Mutex<HashMap<String, ProcessingState>>,
}

impl Ingestor {
    pub fn new(
        store: ObjectStore,
        embedder: EmbeddingClient,
        index: IndexClient,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            chunking,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Current processing state for a namespace (`NotInitiated` if the
    /// namespace has never been submitted).
    pub fn state(&self, namespace: &str) -> ProcessingState {
        self.states
            .lock()
            .expect("state map poisoned")
            .get(namespace)
            .copied()
            .unwrap_or(ProcessingState::NotInitiated)
    }

    fn set_state(&self, namespace: &str, state: ProcessingState) {
        self.states
            .lock()
            .expect("state map poisoned")
            .insert(namespace.to_string(), state);
    }

    /// Ingest one uploaded file into `namespace`.
    ///
    /// Success means every chunk of the document was embedded and written
    /// to the index; any failure leaves the namespace `NotInitiated` and
    /// reports which step failed. There is no partial-progress result.
    pub async fn ingest(
        &self,
        namespace: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<IngestReport> {
        self.set_state(namespace, ProcessingState::Processing);
        tracing::info!(namespace, file_name, "ingestion started");

        match self.run(namespace, file_name, bytes).await {
            Ok(report) => {
                self.set_state(namespace, ProcessingState::Processed);
                tracing::info!(namespace, chunks = report.chunk_count, "ingestion complete");
                Ok(report)
            }
            Err(e) => {
                self.set_state(namespace, ProcessingState::NotInitiated);
                tracing::warn!(namespace, error = %e, "ingestion failed");
                Err(e)
            }
        }
    }

    async fn run(&self, namespace: &str, file_name: &str, bytes: &[u8]) -> Result<IngestReport> {
        // Durable write first; failure here aborts before any chunking.
        let stored_path = self.store.put(namespace, file_name, bytes).await?;

        let text = extract_text(file_name, bytes)?;

        let mut chunks = chunk::chunk_text(namespace, file_name, &text, &self.chunking);
        for chunk in &mut chunks {
            chunk
                .metadata
                .insert(META_SOURCE.to_string(), stored_path.clone());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        self.index.upsert(&chunks, vectors).await?;

        Ok(IngestReport {
            namespace: namespace.to_string(),
            stored_path,
            chunk_count: chunks.len(),
        })
    }
}
