//! Transcription session state: explicit state machines and the utterance
//! aggregator.
//!
//! Everything here is synchronous and owns no I/O, so the session rules
//! are testable without a microphone or a network connection:
//!
//! - microphone and connection states are independent enums, and frames
//!   stream only when **both** are `Open` ([`streaming`]);
//! - transcription events are a tagged enum consumed one at a time in
//!   arrival order;
//! - the utterance buffer and caption live in [`TranscriptAggregator`],
//!   whose only mutation point is [`TranscriptAggregator::apply`].

/// Microphone lifecycle. `Error` is terminal and reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicState {
    Unset,
    Ready,
    Opening,
    Open,
    Paused,
    Error,
}

/// Transcription connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Open,
    Closed,
    Error,
}

/// Audio frames are forwarded to the service only when both the microphone
/// and the connection are open. Frames captured earlier are dropped, never
/// buffered.
pub fn streaming(mic: MicState, conn: ConnState) -> bool {
    mic == MicState::Open && conn == ConnState::Open
}

/// The keep-alive timer runs while the connection is open but the
/// microphone is not actively capturing, and is cancelled when the
/// microphone reopens.
pub fn keep_alive_active(mic: MicState, conn: ConnState) -> bool {
    conn == ConnState::Open && mic != MicState::Open
}

/// One transcription result from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    /// The service will not revise this text further.
    pub is_final: bool,
    /// The service detected the end of the utterance's speech.
    pub speech_final: bool,
    /// Offset of the audio span, in seconds.
    pub start: f64,
    /// Length of the audio span, in seconds.
    pub duration: f64,
}

/// Events consumed by the session loop, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    InterimTranscript(TranscriptEvent),
    FinalTranscript(TranscriptEvent),
    ConnectionOpened,
    ConnectionClosed,
    Error(String),
}

/// Accumulates transcript events into captions and completed utterances.
///
/// Out-of-order delivery is not reconciled: the caption is last-write-wins
/// and finals are appended in the order they arrive.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    caption: Option<String>,
    buffer: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent non-empty transcript text, cleared on handoff.
    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    /// The utterance text accumulated so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Apply one transcript event.
    ///
    /// Returns the completed utterance when the event is final, marks the
    /// end of speech, and the buffer is non-empty; the buffer and caption
    /// are reset before returning. All other events return `None`.
    pub fn apply(&mut self, event: &TranscriptEvent) -> Option<String> {
        if !event.text.is_empty() {
            self.caption = Some(event.text.clone());
        }

        if event.is_final && !event.text.is_empty() {
            if !self.buffer.is_empty() {
                self.buffer.push(' ');
            }
            self.buffer.push_str(&event.text);
        }

        if event.is_final && event.speech_final && !self.buffer.is_empty() {
            let utterance = self.buffer.trim().to_string();
            self.buffer.clear();
            self.caption = None;
            return Some(utterance);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interim(text: &str) -> TranscriptEvent {
        TranscriptEvent {
            text: text.into(),
            is_final: false,
            speech_final: false,
            start: 0.0,
            duration: 0.5,
        }
    }

    fn final_ev(text: &str, speech_final: bool) -> TranscriptEvent {
        TranscriptEvent {
            text: text.into(),
            is_final: true,
            speech_final,
            start: 0.0,
            duration: 0.5,
        }
    }

    #[test]
    fn streaming_requires_both_open() {
        assert!(streaming(MicState::Open, ConnState::Open));
        assert!(!streaming(MicState::Opening, ConnState::Open));
        assert!(!streaming(MicState::Open, ConnState::Connecting));
        assert!(!streaming(MicState::Paused, ConnState::Open));
    }

    #[test]
    fn keep_alive_gate() {
        assert!(keep_alive_active(MicState::Paused, ConnState::Open));
        assert!(keep_alive_active(MicState::Ready, ConnState::Open));
        assert!(!keep_alive_active(MicState::Open, ConnState::Open));
        assert!(!keep_alive_active(MicState::Paused, ConnState::Closed));
    }

    #[test]
    fn interim_updates_caption_last_write_wins() {
        let mut agg = TranscriptAggregator::new();
        agg.apply(&interim("what"));
        agg.apply(&interim("what is"));
        assert_eq!(agg.caption(), Some("what is"));
        assert_eq!(agg.buffer(), "");
    }

    #[test]
    fn empty_interim_does_not_clear_caption() {
        let mut agg = TranscriptAggregator::new();
        agg.apply(&interim("hello"));
        agg.apply(&interim(""));
        assert_eq!(agg.caption(), Some("hello"));
    }

    #[test]
    fn finals_accumulate_space_joined_in_order() {
        let mut agg = TranscriptAggregator::new();
        agg.apply(&final_ev("what is", false));
        agg.apply(&interim("the refund"));
        agg.apply(&final_ev("the refund policy", false));
        assert_eq!(agg.buffer(), "what is the refund policy");
    }

    #[test]
    fn completed_utterance_hands_off_once_and_resets() {
        let mut agg = TranscriptAggregator::new();
        assert_eq!(agg.apply(&final_ev("what is", false)), None);
        let utterance = agg.apply(&final_ev("the refund policy?", true));
        assert_eq!(utterance.as_deref(), Some("what is the refund policy?"));
        assert_eq!(agg.buffer(), "");
        assert_eq!(agg.caption(), None);

        // A speech-final with an empty buffer produces nothing.
        assert_eq!(agg.apply(&final_ev("", true)), None);
    }

    #[test]
    fn speech_final_alone_with_empty_buffer_is_ignored() {
        let mut agg = TranscriptAggregator::new();
        assert_eq!(agg.apply(&final_ev("", true)), None);
        assert_eq!(agg.buffer(), "");
    }
}
