//! Conversation state and turn orchestration.
//!
//! A [`Conversation`] is an ordered, timestamped list of turns. The
//! [`ConversationEngine`] drives one turn end to end: append the user
//! turn, request a grounded reply, synthesize it, play it to completion,
//! and only then append the assistant turn. A failure anywhere after the
//! user turn leaves the conversation with the question recorded but no
//! answer, and nothing is retried automatically.
//!
//! The engine talks to its collaborators through the [`Responder`],
//! [`Synthesizer`], and [`AudioSink`] traits so the turn rules are
//! testable without any network service.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::completion::{ChatMessage, ChatRole, GroundedResponder};
use crate::error::Result;
use crate::synthesis::{AudioSink, SynthesisClient};

/// One turn of the conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn now(role: ChatRole, text: String) -> Self {
        Self {
            role,
            text,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only turn history for one session.
#[derive(Debug, Default, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push_user(&mut self, text: String) {
        self.turns.push(Turn::now(ChatRole::User, text));
    }

    pub fn push_assistant(&mut self, text: String) {
        self.turns.push(Turn::now(ChatRole::Assistant, text));
    }

    /// The turns as completion messages, oldest first.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|t| ChatMessage {
                role: t.role,
                content: t.text.clone(),
            })
            .collect()
    }
}

/// Produces the assistant's reply text for an utterance.
#[async_trait]
pub trait Responder: Send {
    async fn reply(
        &self,
        namespace: &str,
        utterance: &str,
        history: &[ChatMessage],
    ) -> Result<String>;
}

#[async_trait]
impl Responder for GroundedResponder {
    async fn reply(
        &self,
        namespace: &str,
        utterance: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        GroundedResponder::reply(self, namespace, utterance, history).await
    }
}

/// Turns reply text into playable audio.
#[async_trait]
pub trait Synthesizer: Send {
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

#[async_trait]
impl Synthesizer for SynthesisClient {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        SynthesisClient::synthesize(self, text).await
    }
}

/// Drives conversational turns against one document namespace.
pub struct ConversationEngine<R, S, A> {
    responder: R,
    synthesizer: S,
    sink: A,
    namespace: String,
    conversation: Conversation,
}

impl<R: Responder, S: Synthesizer, A: AudioSink> ConversationEngine<R, S, A> {
    pub fn new(responder: R, synthesizer: S, sink: A, namespace: impl Into<String>) -> Self {
        Self {
            responder,
            synthesizer,
            sink,
            namespace: namespace.into(),
            conversation: Conversation::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Run one full turn for `utterance` and return the reply text.
    ///
    /// The user turn is recorded before anything can fail. The assistant
    /// turn is recorded only after the reply has been generated,
    /// synthesized, and played all the way through.
    pub async fn take_turn(&mut self, utterance: String) -> Result<String> {
        let history = self.conversation.history();
        self.conversation.push_user(utterance.clone());

        let reply = self
            .responder
            .reply(&self.namespace, &utterance, &history)
            .await?;
        tracing::info!(chars = reply.len(), "reply generated");

        let audio = self.synthesizer.synthesize(&reply).await?;
        self.sink.play(audio).await?;

        self.conversation.push_assistant(reply.clone());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct ScriptedResponder {
        fail: bool,
    }

    #[async_trait]
    impl Responder for ScriptedResponder {
        async fn reply(
            &self,
            _namespace: &str,
            utterance: &str,
            history: &[ChatMessage],
        ) -> Result<String> {
            if self.fail {
                return Err(Error::CompletionRequest("provider down".into()));
            }
            Ok(format!("answer to '{utterance}' after {} turns", history.len()))
        }
    }

    struct OkSynth;

    #[async_trait]
    impl Synthesizer for OkSynth {
        async fn synthesize(&self, _text: &str) -> Result<Bytes> {
            Ok(Bytes::from_static(b"audio"))
        }
    }

    struct FailSynth;

    #[async_trait]
    impl Synthesizer for FailSynth {
        async fn synthesize(&self, _text: &str) -> Result<Bytes> {
            Err(Error::SynthesisRequest("no voice".into()))
        }
    }

    struct CountingSink {
        played: usize,
    }

    #[async_trait]
    impl AudioSink for CountingSink {
        async fn play(&mut self, _audio: Bytes) -> Result<()> {
            self.played += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_turn_appends_both_turns() {
        let mut engine = ConversationEngine::new(
            ScriptedResponder { fail: false },
            OkSynth,
            CountingSink { played: 0 },
            "ns",
        );

        let reply = engine
            .take_turn("what is the refund policy?".into())
            .await
            .unwrap();
        assert!(reply.contains("refund policy"));

        let turns = engine.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ChatRole::User);
        assert_eq!(turns[1].role, ChatRole::Assistant);
        assert_eq!(engine.sink.played, 1);
    }

    #[tokio::test]
    async fn history_excludes_the_current_utterance() {
        let mut engine = ConversationEngine::new(
            ScriptedResponder { fail: false },
            OkSynth,
            CountingSink { played: 0 },
            "ns",
        );

        let first = engine.take_turn("first".into()).await.unwrap();
        assert!(first.contains("after 0 turns"));

        let second = engine.take_turn("second".into()).await.unwrap();
        assert!(second.contains("after 2 turns"));
    }

    #[tokio::test]
    async fn completion_failure_keeps_user_turn_only() {
        let mut engine = ConversationEngine::new(
            ScriptedResponder { fail: true },
            OkSynth,
            CountingSink { played: 0 },
            "ns",
        );

        let err = engine.take_turn("hello?".into()).await.unwrap_err();
        assert!(matches!(err, Error::CompletionRequest(_)));

        let turns = engine.conversation().turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, ChatRole::User);
        assert_eq!(engine.sink.played, 0);
    }

    #[tokio::test]
    async fn synthesis_failure_appends_no_assistant_turn() {
        let mut engine = ConversationEngine::new(
            ScriptedResponder { fail: false },
            FailSynth,
            CountingSink { played: 0 },
            "ns",
        );

        let err = engine.take_turn("hello?".into()).await.unwrap_err();
        assert!(matches!(err, Error::SynthesisRequest(_)));
        assert_eq!(engine.conversation().turns().len(), 1);
        assert_eq!(engine.sink.played, 0);
    }

    #[tokio::test]
    async fn failed_turn_does_not_poison_the_next_one() {
        struct FlakyResponder {
            calls: std::sync::atomic::AtomicUsize,
        }

        #[async_trait]
        impl Responder for FlakyResponder {
            async fn reply(
                &self,
                _namespace: &str,
                _utterance: &str,
                _history: &[ChatMessage],
            ) -> Result<String> {
                let n = self
                    .calls
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n == 0 {
                    Err(Error::CompletionRequest("transient".into()))
                } else {
                    Ok("recovered".into())
                }
            }
        }

        let mut engine = ConversationEngine::new(
            FlakyResponder {
                calls: std::sync::atomic::AtomicUsize::new(0),
            },
            OkSynth,
            CountingSink { played: 0 },
            "ns",
        );

        assert!(engine.take_turn("first".into()).await.is_err());
        let reply = engine.take_turn("again".into()).await.unwrap();
        assert_eq!(reply, "recovered");
        // First question recorded unanswered, second answered.
        assert_eq!(engine.conversation().turns().len(), 3);
    }
}
