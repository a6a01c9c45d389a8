//! Conversational layer for ASIS.
//!
//! Sends user text to the hosted LLM, recovers a structured reply from its
//! output, runs the requested action through the dispatcher (or augments
//! the answer with a web search) and keeps a bounded rolling history plus
//! persisted conversations.

pub mod error;
pub mod history;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod summary;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ChatError;
pub use history::{RollingHistory, Turn};
pub use llm::{GeminiClient, LlmClient};
pub use orchestrator::{AssistantReply, ConversationOrchestrator, OrchestratorSettings};
pub use parser::{ParsedReply, ResponseParser};
pub use voice::{
    event_channel, SpeechRecognizer, SpeechSynthesizer, VoiceEvent, VoiceEventReceiver,
    VoiceEventSender, VoiceSession,
};
