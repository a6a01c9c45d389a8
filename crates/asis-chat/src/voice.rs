//! Voice glue between speech engines and the orchestrator.
//!
//! Speech-to-text and text-to-speech engines are platform collaborators.
//! They report asynchronously through a [`VoiceEvent`] channel; the
//! [`VoiceSession`] consumes those events, sends recognised text to the
//! orchestrator and speaks the reply.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::orchestrator::{AssistantReply, ConversationOrchestrator};

/// Spoken when recognition fails.
pub const NOT_UNDERSTOOD_REPLY: &str = "Nu am înțeles ce ai spus. Poți repeta mai clar?";

/// What the speech engines report back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Recognized(String),
    RecognitionError(String),
    SpeakingStarted,
    SpeakingCompleted,
    SpeakingError(String),
}

pub type VoiceEventSender = mpsc::UnboundedSender<VoiceEvent>;
pub type VoiceEventReceiver = mpsc::UnboundedReceiver<VoiceEvent>;

/// Channel the engines publish on and the session reads from.
pub fn event_channel() -> (VoiceEventSender, VoiceEventReceiver) {
    mpsc::unbounded_channel()
}

/// Speech-to-text engine. Results arrive as [`VoiceEvent::Recognized`] or
/// [`VoiceEvent::RecognitionError`].
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Begin capturing; false when the engine is unavailable.
    async fn start_listening(&self) -> bool;

    async fn stop_listening(&self);
}

/// Text-to-speech engine. Progress arrives as `Speaking*` events.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str);
}

/// One voice-driven conversation loop.
pub struct VoiceSession {
    orchestrator: Arc<ConversationOrchestrator>,
    recognizer: Arc<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    events: VoiceEventReceiver,
    listening: bool,
    speaking: bool,
}

impl VoiceSession {
    pub fn new(
        orchestrator: Arc<ConversationOrchestrator>,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        events: VoiceEventReceiver,
    ) -> Self {
        Self {
            orchestrator,
            recognizer,
            synthesizer,
            events,
            listening: false,
            speaking: false,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub async fn start_listening(&mut self) -> Result<(), ChatError> {
        if self.listening {
            return Err(ChatError::Voice("already listening".to_string()));
        }
        if !self.recognizer.start_listening().await {
            return Err(ChatError::Voice("speech recognition is unavailable".to_string()));
        }
        self.listening = true;
        debug!("Listening started");
        Ok(())
    }

    pub async fn stop_listening(&mut self) -> Result<(), ChatError> {
        if !self.listening {
            return Err(ChatError::Voice("not listening".to_string()));
        }
        self.recognizer.stop_listening().await;
        self.listening = false;
        Ok(())
    }

    /// React to one engine event. Returns the reply when one was produced.
    pub async fn handle(&mut self, event: VoiceEvent) -> Option<AssistantReply> {
        match event {
            VoiceEvent::Recognized(text) => {
                self.listening = false;
                let text = text.trim();
                if text.is_empty() {
                    self.synthesizer.speak(NOT_UNDERSTOOD_REPLY).await;
                    return None;
                }
                info!(chars = text.len(), "Speech recognised");
                let reply = self.orchestrator.process_message(text).await;
                self.synthesizer.speak(&reply.response).await;
                Some(reply)
            }
            VoiceEvent::RecognitionError(message) => {
                self.listening = false;
                warn!(error = %message, "Speech recognition failed");
                self.synthesizer.speak(NOT_UNDERSTOOD_REPLY).await;
                None
            }
            VoiceEvent::SpeakingStarted => {
                self.speaking = true;
                None
            }
            VoiceEvent::SpeakingCompleted => {
                self.speaking = false;
                None
            }
            VoiceEvent::SpeakingError(message) => {
                self.speaking = false;
                warn!(error = %message, "Speech synthesis failed");
                None
            }
        }
    }

    /// Consume events until every sender is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
        }
        debug!("Voice event channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorSettings;
    use crate::testing::{self, ScriptedLlm, StaticSearch};
    use asis_storage::Database;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct FakeRecognizer {
        available: bool,
        stopped: AtomicBool,
    }

    #[async_trait]
    impl SpeechRecognizer for FakeRecognizer {
        async fn start_listening(&self) -> bool {
            self.available
        }

        async fn stop_listening(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Records what it was asked to say and reports progress like a real engine.
    struct FakeSynthesizer {
        spoken: Mutex<Vec<String>>,
        events: VoiceEventSender,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynthesizer {
        async fn speak(&self, text: &str) {
            self.spoken.lock().unwrap().push(text.to_string());
            let _ = self.events.send(VoiceEvent::SpeakingStarted);
            let _ = self.events.send(VoiceEvent::SpeakingCompleted);
        }
    }

    fn session(
        replies: &[&str],
        available: bool,
    ) -> (VoiceSession, Arc<FakeSynthesizer>, Arc<FakeRecognizer>, VoiceEventSender) {
        let db = Arc::new(Database::in_memory().unwrap());
        let search = Arc::new(StaticSearch::default());
        let orchestrator = Arc::new(ConversationOrchestrator::new(
            Arc::new(ScriptedLlm::new(replies.iter().copied())),
            testing::dispatcher(Arc::clone(&db), Arc::clone(&search)),
            search,
            db,
            testing::clock(),
            OrchestratorSettings::default(),
        ));
        let (tx, rx) = event_channel();
        let recognizer = Arc::new(FakeRecognizer {
            available,
            stopped: AtomicBool::new(false),
        });
        let synthesizer = Arc::new(FakeSynthesizer {
            spoken: Mutex::new(Vec::new()),
            events: tx.clone(),
        });
        (
            VoiceSession::new(orchestrator, recognizer.clone(), synthesizer.clone(), rx),
            synthesizer,
            recognizer,
            tx,
        )
    }

    #[tokio::test]
    async fn test_recognised_text_is_answered_aloud() {
        let (mut session, synth, _, _) = session(&[r#"{"response": "Bună dimineața!"}"#], true);
        let reply = session
            .handle(VoiceEvent::Recognized("bună".to_string()))
            .await
            .unwrap();
        assert_eq!(reply.response, "Bună dimineața!");
        assert_eq!(*synth.spoken.lock().unwrap(), vec!["Bună dimineața!"]);
    }

    #[tokio::test]
    async fn test_recognition_error_asks_to_repeat() {
        let (mut session, synth, _, _) = session(&[], true);
        let reply = session
            .handle(VoiceEvent::RecognitionError("no match".to_string()))
            .await;
        assert!(reply.is_none());
        assert_eq!(*synth.spoken.lock().unwrap(), vec![NOT_UNDERSTOOD_REPLY]);
    }

    #[tokio::test]
    async fn test_listening_state() {
        let (mut session, _, recognizer, _) = session(&[], true);
        session.start_listening().await.unwrap();
        assert!(session.is_listening());
        assert!(session.start_listening().await.is_err());

        session.stop_listening().await.unwrap();
        assert!(!session.is_listening());
        assert!(recognizer.stopped.load(Ordering::SeqCst));
        assert!(session.stop_listening().await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_recognizer() {
        let (mut session, _, _, _) = session(&[], false);
        let err = session.start_listening().await.unwrap_err();
        assert!(matches!(err, ChatError::Voice(_)));
        assert!(!session.is_listening());
    }

    #[tokio::test]
    async fn test_speaking_events_track_state() {
        let (mut session, _, _, _) = session(&[], true);
        session.handle(VoiceEvent::SpeakingStarted).await;
        assert!(session.is_speaking());
        session
            .handle(VoiceEvent::SpeakingError("audio device lost".to_string()))
            .await;
        assert!(!session.is_speaking());
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let (session, synth, _, tx) = session(&[r#"{"response": "Gata"}"#], true);
        tx.send(VoiceEvent::Recognized("fă ceva".to_string())).unwrap();
        drop(tx);

        let handle = tokio::spawn(session.run());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(*synth.spoken.lock().unwrap(), vec!["Gata"]);
        handle.abort();
    }
}
