//! # Docent CLI (`docent`)
//!
//! The `docent` binary serves the HTTP API and drives document ingestion
//! and conversations from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent serve` | Start the JSON HTTP API |
//! | `docent ingest <file>` | Upload a document into a namespace |
//! | `docent ask "<question>"` | One grounded question, text in and out |
//! | `docent talk` | Live voice session against a namespace |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a PDF manual
//! docent ingest manual.pdf --namespace appliance
//!
//! # Ask about it without audio
//! docent ask "how do I descale it?" --namespace appliance
//!
//! # Talk to it
//! docent talk --namespace appliance
//! ```

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docent::completion::{CompletionClient, GroundedResponder};
use docent::config::{load_config, Config};
use docent::converse::ConversationEngine;
use docent::embedding::EmbeddingClient;
use docent::index::IndexClient;
use docent::ingest::Ingestor;
use docent::session::{SessionHandler, VoiceSession};
use docent::storage::ObjectStore;
use docent::stt::LiveSttSocket;
use docent::synthesis::{CommandPlayer, SynthesisClient};

/// Docent — a voice-driven assistant for your own documents.
#[derive(Parser)]
#[command(
    name = "docent",
    about = "Docent — upload documents, then ask about them by voice",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the JSON HTTP API.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// ingestion, chat, and synthesis endpoints.
    Serve,

    /// Ingest a document into a namespace.
    ///
    /// Stores the raw file, extracts its text, chunks and embeds it, and
    /// writes the vectors to the index. The namespace is queryable as
    /// soon as the command exits successfully.
    Ingest {
        /// Path to the document (PDF, plain text, or Markdown).
        file: PathBuf,

        /// Namespace the document's chunks are indexed under.
        #[arg(long)]
        namespace: String,
    },

    /// Ask one grounded question without audio.
    Ask {
        /// The question text.
        question: String,

        /// Namespace to retrieve grounding chunks from.
        #[arg(long)]
        namespace: String,
    },

    /// Start a live voice session.
    ///
    /// Streams microphone audio to the transcription service; each
    /// completed utterance is answered from the namespace's documents and
    /// the reply is played aloud. The microphone stays muted until the
    /// reply has finished playing. Ctrl-C ends the session.
    Talk {
        /// Namespace to converse about.
        #[arg(long)]
        namespace: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            docent::server::run_server(&config).await?;
        }
        Commands::Ingest { file, namespace } => {
            run_ingest(&config, &file, &namespace).await?;
        }
        Commands::Ask {
            question,
            namespace,
        } => {
            let responder = build_responder(&config)?;
            let reply = responder.reply(&namespace, &question, &[]).await?;
            println!("{reply}");
        }
        Commands::Talk { namespace } => {
            run_talk(&config, namespace).await?;
        }
    }

    Ok(())
}

fn build_responder(config: &Config) -> anyhow::Result<GroundedResponder> {
    Ok(GroundedResponder::new(
        EmbeddingClient::new(&config.embedding)?,
        IndexClient::new(&config.index)?,
        CompletionClient::new(&config.completion)?,
    ))
}

async fn run_ingest(config: &Config, file: &PathBuf, namespace: &str) -> anyhow::Result<()> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file path has no usable file name")?
        .to_string();
    let bytes = std::fs::read(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let ingestor = Ingestor::new(
        ObjectStore::new(config.storage.clone()),
        EmbeddingClient::new(&config.embedding)?,
        IndexClient::new(&config.index)?,
        config.chunking.clone(),
    );

    let report = ingestor.ingest(namespace, &file_name, &bytes).await?;
    println!(
        "Ingested {} into '{}' ({} chunks, stored at {})",
        file_name, report.namespace, report.chunk_count, report.stored_path
    );
    Ok(())
}

async fn run_talk(config: &Config, namespace: String) -> anyhow::Result<()> {
    let engine = ConversationEngine::new(
        build_responder(config)?,
        SynthesisClient::new(&config.synthesis)?,
        CommandPlayer::new(config.synthesis.player.clone()),
        namespace,
    );

    let stream = LiveSttSocket::connect(&config.transcription).await?;
    let (_capture, frames) = docent::audio::start_capture(config.transcription.sample_rate)?;
    let session = VoiceSession::new(
        stream,
        frames,
        std::time::Duration::from_secs(config.transcription.keep_alive_secs),
    );

    println!("Listening. Speak your question; Ctrl-C to quit.");
    let mut handler = TalkHandler { engine };
    session.run(&mut handler).await?;
    println!("Session ended.");
    Ok(())
}

/// Terminal frontend for the voice session: live caption on one line,
/// each completed turn printed as a transcript.
struct TalkHandler {
    engine: ConversationEngine<GroundedResponder, SynthesisClient, CommandPlayer>,
}

#[async_trait]
impl SessionHandler for TalkHandler {
    fn caption(&mut self, caption: Option<&str>) {
        match caption {
            Some(text) => print!("\r\x1b[2K… {text}"),
            None => print!("\r\x1b[2K"),
        }
        let _ = std::io::stdout().flush();
    }

    async fn utterance(&mut self, text: String) -> docent::error::Result<()> {
        println!("\rYou: {text}");
        let reply = self.engine.take_turn(text).await?;
        println!("Docent: {reply}");
        Ok(())
    }
}
