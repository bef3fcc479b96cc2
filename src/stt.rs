//! Live speech-to-text transport.
//!
//! Maintains the bidirectional WebSocket to the transcription service:
//! binary PCM frames go out, JSON transcript events come back, and a
//! `{"type":"KeepAlive"}` text message holds the connection open through
//! silence. Raw service events are mapped into [`SessionEvent`]s so the
//! session loop never sees wire format details.
//!
//! The [`SttStream`] trait is the seam the session loop consumes; tests
//! drive it with a scripted implementation instead of a socket.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::TranscriptionConfig;
use crate::error::{Error, Result};
use crate::transcript::{SessionEvent, TranscriptEvent};

/// The session loop's view of the transcription service.
#[async_trait]
pub trait SttStream: Send {
    /// Forward one raw audio frame.
    async fn send_frame(&mut self, frame: Bytes) -> Result<()>;
    /// Send the periodic keep-alive signal.
    async fn send_keep_alive(&mut self) -> Result<()>;
    /// Next event from the service; `None` once the stream is exhausted.
    async fn next_event(&mut self) -> Option<SessionEvent>;
    /// Tell the service no more audio is coming and close the stream.
    async fn finish(&mut self) -> Result<()>;
}

/// WebSocket-backed [`SttStream`] implementation.
pub struct LiveSttSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// The handshake completes in `connect`, so the first `next_event`
    /// call reports `ConnectionOpened` before reading from the socket.
    announced: bool,
}

impl LiveSttSocket {
    /// Open the streaming connection, authenticating with
    /// `DOCENT_SPEECH_API_KEY`.
    pub async fn connect(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = std::env::var("DOCENT_SPEECH_API_KEY")
            .map_err(|_| Error::TranscriptionStream("DOCENT_SPEECH_API_KEY not set".into()))?;

        let url = format!(
            "{}?model={}&interim_results=true&smart_format=true&encoding=linear16&sample_rate={}&channels=1",
            config.url, config.model, config.sample_rate
        );

        let mut request = url
            .into_client_request()
            .map_err(|e| Error::TranscriptionStream(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {api_key}"))
                .map_err(|e| Error::TranscriptionStream(e.to_string()))?,
        );

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| Error::TranscriptionStream(e.to_string()))?;

        tracing::debug!(url = %config.url, "transcription stream connected");
        Ok(Self {
            ws,
            announced: false,
        })
    }
}

#[async_trait]
impl SttStream for LiveSttSocket {
    async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        self.ws
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(|e| Error::TranscriptionStream(e.to_string()))
    }

    async fn send_keep_alive(&mut self) -> Result<()> {
        self.ws
            .send(Message::Text(r#"{"type":"KeepAlive"}"#.to_string()))
            .await
            .map_err(|e| Error::TranscriptionStream(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        if !self.announced {
            self.announced = true;
            return Some(SessionEvent::ConnectionOpened);
        }
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => {
                    if let Some(event) = parse_event(&text) {
                        return Some(event);
                    }
                }
                Ok(Message::Close(_)) => return Some(SessionEvent::ConnectionClosed),
                Ok(_) => continue,
                Err(e) => return Some(SessionEvent::Error(e.to_string())),
            }
        }
    }

    async fn finish(&mut self) -> Result<()> {
        let _ = self
            .ws
            .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()))
            .await;
        self.ws
            .close(None)
            .await
            .map_err(|e| Error::TranscriptionStream(e.to_string()))
    }
}

// ============ Wire format ============

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    channel: RawChannel,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    duration: f64,
}

#[derive(Deserialize, Default)]
struct RawChannel {
    #[serde(default)]
    alternatives: Vec<RawAlternative>,
}

#[derive(Deserialize)]
struct RawAlternative {
    #[serde(default)]
    transcript: String,
}

/// Map one service message to a [`SessionEvent`].
///
/// Non-result messages (metadata, utterance-end markers) yield `None` and
/// are skipped; a message that fails to parse is surfaced as an error
/// rather than silently dropped.
fn parse_event(text: &str) -> Option<SessionEvent> {
    let raw: RawEvent = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => return Some(SessionEvent::Error(format!("malformed event: {e}"))),
    };

    if raw.kind != "Results" {
        return None;
    }

    let transcript = raw
        .channel
        .alternatives
        .first()
        .map(|a| a.transcript.clone())
        .unwrap_or_default();

    let event = TranscriptEvent {
        text: transcript,
        is_final: raw.is_final,
        speech_final: raw.speech_final,
        start: raw.start,
        duration: raw.duration,
    };

    Some(if raw.is_final {
        SessionEvent::FinalTranscript(event)
    } else {
        SessionEvent::InterimTranscript(event)
    })
}
