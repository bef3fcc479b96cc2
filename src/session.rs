//! The live voice session loop.
//!
//! A single-threaded loop that owns the microphone and connection state
//! machines, forwards audio frames to the transcription stream, applies
//! transcript events through the [`TranscriptAggregator`], sends
//! keep-alives during silence, and hands completed utterances to a
//! [`SessionHandler`].
//!
//! Ordering guarantee: the handler runs to completion (reply spoken and
//! played) before the microphone is re-armed, and frames that arrived
//! while the handler ran are discarded, so the assistant never hears
//! itself. Keep-alives continue during the reply since the connection is
//! open while the microphone is paused.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::stt::SttStream;
use crate::transcript::{
    keep_alive_active, streaming, ConnState, MicState, SessionEvent, TranscriptAggregator,
};

/// Callbacks driven by the session loop.
#[async_trait]
pub trait SessionHandler: Send {
    /// The displayed caption changed (`None` means cleared).
    fn caption(&mut self, _caption: Option<&str>) {}

    /// One completed utterance. The microphone stays paused until this
    /// returns; an error is surfaced as a notification and the session
    /// continues — the user retries by speaking again.
    async fn utterance(&mut self, text: String) -> Result<()>;
}

enum Flow {
    Continue,
    Stop,
}

/// Owns one voice conversation's transport, frame source, and state.
pub struct VoiceSession<S: SttStream> {
    stream: S,
    frames: mpsc::Receiver<Bytes>,
    mic: MicState,
    conn: ConnState,
    aggregator: TranscriptAggregator,
    keep_alive_period: Duration,
}

impl<S: SttStream> VoiceSession<S> {
    /// `frames` carries raw PCM from the capture side; closing it ends
    /// the session cleanly.
    pub fn new(stream: S, frames: mpsc::Receiver<Bytes>, keep_alive_period: Duration) -> Self {
        Self {
            stream,
            frames,
            mic: MicState::Ready,
            conn: ConnState::Connecting,
            aggregator: TranscriptAggregator::new(),
            keep_alive_period,
        }
    }

    pub fn mic_state(&self) -> MicState {
        self.mic
    }

    pub fn conn_state(&self) -> ConnState {
        self.conn
    }

    /// Run the session until the connection closes, the frame source
    /// ends, or the stream errors.
    pub async fn run<H: SessionHandler>(mut self, handler: &mut H) -> Result<()> {
        let mut keep_alive_at = Instant::now() + self.keep_alive_period;

        loop {
            let gate = keep_alive_active(self.mic, self.conn);

            tokio::select! {
                maybe_frame = self.frames.recv() => {
                    match maybe_frame {
                        Some(frame) if streaming(self.mic, self.conn) => {
                            self.stream.send_frame(frame).await?;
                        }
                        // Not both open yet: the frame is dropped, not buffered.
                        Some(_) => {}
                        None => {
                            tracing::debug!("frame source closed, ending session");
                            self.stream.finish().await?;
                            return Ok(());
                        }
                    }
                }
                maybe_event = self.stream.next_event() => {
                    let Some(event) = maybe_event else {
                        return Ok(());
                    };
                    let was_gated = keep_alive_active(self.mic, self.conn);
                    let (flow, utterance) = self.handle_event(event)?;
                    handler.caption(self.aggregator.caption());

                    if let Some(text) = utterance {
                        // Stop capturing for the duration of the reply.
                        self.mic = MicState::Paused;
                        handler.caption(None);
                        keep_alive_at = Instant::now() + self.keep_alive_period;
                        self.speak_turn(handler, text, &mut keep_alive_at).await?;

                        // Frames captured while the reply played are stale.
                        while self.frames.try_recv().is_ok() {}
                        if self.conn == ConnState::Open {
                            self.mic = MicState::Open;
                        }
                    } else if !was_gated && keep_alive_active(self.mic, self.conn) {
                        // Timer restarts from zero whenever the gate opens.
                        keep_alive_at = Instant::now() + self.keep_alive_period;
                    }

                    if let Flow::Stop = flow {
                        return Ok(());
                    }
                }
                _ = tokio::time::sleep_until(keep_alive_at), if gate => {
                    self.stream.send_keep_alive().await?;
                    keep_alive_at = Instant::now() + self.keep_alive_period;
                }
            }
        }
    }

    /// Drive the utterance handler while keeping the idle connection
    /// alive; the handler's own failure is reported, not propagated, so
    /// conversation state stays usable for the next attempt.
    async fn speak_turn<H: SessionHandler>(
        &mut self,
        handler: &mut H,
        text: String,
        keep_alive_at: &mut Instant,
    ) -> Result<()> {
        let mut turn = std::pin::pin!(handler.utterance(text));
        loop {
            tokio::select! {
                result = &mut turn => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "turn failed; speak again to retry");
                    }
                    return Ok(());
                }
                _ = tokio::time::sleep_until(*keep_alive_at) => {
                    self.stream.send_keep_alive().await?;
                    *keep_alive_at = Instant::now() + self.keep_alive_period;
                }
            }
        }
    }

    fn handle_event(&mut self, event: SessionEvent) -> Result<(Flow, Option<String>)> {
        match event {
            SessionEvent::ConnectionOpened => {
                self.conn = ConnState::Open;
                if matches!(
                    self.mic,
                    MicState::Ready | MicState::Opening | MicState::Paused
                ) {
                    self.mic = MicState::Open;
                }
                tracing::debug!("connection open, streaming started");
                Ok((Flow::Continue, None))
            }
            SessionEvent::ConnectionClosed => {
                self.conn = ConnState::Closed;
                tracing::debug!("connection closed by service");
                Ok((Flow::Stop, None))
            }
            SessionEvent::Error(message) => {
                self.conn = ConnState::Error;
                self.mic = MicState::Error;
                Err(Error::TranscriptionStream(message))
            }
            SessionEvent::InterimTranscript(ev) | SessionEvent::FinalTranscript(ev) => {
                let utterance = self.aggregator.apply(&ev);
                Ok((Flow::Continue, utterance))
            }
        }
    }
}
