//! TOML configuration parsing.
//!
//! One `[section]` per external collaborator plus chunking and server
//! settings. Credentials are never stored in the file; each client reads
//! its API key from the environment:
//!
//! | Service | Environment variable |
//! |---------|---------------------|
//! | Embeddings / completions | `OPENAI_API_KEY` |
//! | Vector index | `DOCENT_INDEX_API_KEY` |
//! | Transcription / synthesis | `DOCENT_SPEECH_API_KEY` |
//! | Object storage | `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub completion: CompletionConfig,
    pub synthesis: SynthesisConfig,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,
    pub model: String,
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Base URL of the vector index (e.g. a Pinecone index host).
    pub url: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_url")]
    pub url: String,
    pub model: String,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_completion_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    pub url: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
    /// Command used to play synthesized audio from the `talk` session
    /// (e.g. `afplay` on macOS, `mpv` or `aplay` on Linux).
    #[serde(default = "default_player")]
    pub player: String,
}

fn default_player() -> String {
    "mpv".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    /// WebSocket URL of the live transcription service.
    pub url: String,
    pub model: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_keep_alive_secs() -> u64 {
    10
}
fn default_sample_rate() -> u32 {
    16000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.index.top_k == 0 {
        anyhow::bail!("index.top_k must be >= 1");
    }
    if config.transcription.keep_alive_secs == 0 {
        anyhow::bail!("transcription.keep_alive_secs must be > 0");
    }

    Ok(config)
}
