//! # Docent
//!
//! A voice-driven assistant for your own documents.
//!
//! Docent ingests uploaded documents (PDF, plain text, Markdown) into a
//! vector index, then answers spoken questions about them: live speech is
//! transcribed over a streaming connection, each completed utterance is
//! answered with a retrieval-grounded completion, and the reply is
//! synthesized and played back.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌──────────────┐
//! │  Upload   │──▶│ Store+Chunk    │──▶│ Vector index  │
//! │ PDF/text  │   │ +Embed         │   │ (namespaced)  │
//! └──────────┘   └────────────────┘   └──────┬───────┘
//!                                            │
//! ┌──────────┐   ┌────────────────┐   ┌──────▼───────┐
//! │   Mic     │──▶│ Streaming STT  │──▶│  Grounded     │
//! │  frames   │   │ (utterances)   │   │  completion   │
//! └──────────┘   └────────────────┘   └──────┬───────┘
//!                                            │
//!                                     ┌──────▼───────┐
//!                                     │  TTS playback │
//!                                     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docent serve                             # start the HTTP API
//! docent ingest manual.pdf --namespace m   # upload a document
//! docent ask "how do I reset it?" --namespace m
//! docent talk --namespace m                # live voice session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error kinds |
//! | [`extract`] | Text extraction from uploaded files |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embeddings API client |
//! | [`index`] | Vector index client |
//! | [`storage`] | Object storage for uploaded files |
//! | [`ingest`] | Ingestion orchestration and processing state |
//! | [`transcript`] | Session state machines and utterance aggregation |
//! | [`stt`] | Streaming speech-to-text transport |
//! | [`session`] | Live voice session loop |
//! | [`completion`] | Grounded chat completion |
//! | [`synthesis`] | Speech synthesis and playback |
//! | [`converse`] | Conversation history and turn orchestration |
//! | [`audio`] | Microphone capture |
//! | [`server`] | JSON HTTP API |

pub mod audio;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod converse;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod server;
pub mod session;
pub mod storage;
pub mod stt;
pub mod synthesis;
pub mod transcript;
