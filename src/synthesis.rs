//! Text-to-speech synthesis and playback.
//!
//! [`SynthesisClient`] posts reply text to a speech service and gets audio
//! bytes back. [`AudioSink`] is the playback seam: the real implementation
//! ([`CommandPlayer`]) writes the audio to a temp file and runs the
//! configured player command to completion, which is what holds the
//! microphone paused until the reply has finished playing.
//!
//! Requires the `DOCENT_SPEECH_API_KEY` environment variable.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::config::SynthesisConfig;
use crate::error::{Error, Result};

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

/// Client for the external speech synthesis service.
pub struct SynthesisClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    voice: Option<String>,
}

impl SynthesisClient {
    /// Build a client from configuration, reading `DOCENT_SPEECH_API_KEY`
    /// from the environment.
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let api_key = std::env::var("DOCENT_SPEECH_API_KEY")
            .map_err(|_| Error::SynthesisRequest("DOCENT_SPEECH_API_KEY not set".into()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::SynthesisRequest(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            api_key,
            voice: config.voice.clone(),
        })
    }

    /// Synthesize `text` into playable audio bytes.
    pub async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let body = SynthesisRequest {
            text,
            voice: self.voice.as_deref(),
        };

        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::SynthesisRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::SynthesisRequest(format!(
                "HTTP {status}: {body_text}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::SynthesisRequest(e.to_string()))?;

        if audio.is_empty() {
            return Err(Error::SynthesisRequest("empty audio response".into()));
        }
        Ok(audio)
    }
}

/// Plays synthesized audio; `play` returns only once playback is done.
#[async_trait]
pub trait AudioSink: Send {
    async fn play(&mut self, audio: Bytes) -> Result<()>;
}

/// [`AudioSink`] backed by an external player command (`mpv`, `afplay`,
/// `aplay`). The audio is written to a temp file that lives until the
/// player exits.
pub struct CommandPlayer {
    player: String,
}

impl CommandPlayer {
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
        }
    }
}

#[async_trait]
impl AudioSink for CommandPlayer {
    async fn play(&mut self, audio: Bytes) -> Result<()> {
        let path = std::env::temp_dir().join(format!("docent-reply-{}.mp3", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| Error::SynthesisRequest(format!("write audio: {e}")))?;

        let status = tokio::process::Command::new(&self.player)
            .arg(&path)
            .status()
            .await;
        let _ = tokio::fs::remove_file(&path).await;

        let status =
            status.map_err(|e| Error::SynthesisRequest(format!("spawn {}: {e}", self.player)))?;
        if !status.success() {
            return Err(Error::SynthesisRequest(format!(
                "{} exited with {status}",
                self.player
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_voice_when_unset() {
        let body = SynthesisRequest {
            text: "hello",
            voice: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"text":"hello"}"#);
    }

    #[test]
    fn request_includes_voice_when_set() {
        let body = SynthesisRequest {
            text: "hello",
            voice: Some("aura-2"),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"text":"hello","voice":"aura-2"}"#);
    }
}
