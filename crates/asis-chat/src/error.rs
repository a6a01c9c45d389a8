//! Error types for the conversational layer.

use asis_core::error::AsisError;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),
    #[error("conversation not found: {0}")]
    ConversationNotFound(uuid::Uuid),
    #[error("voice error: {0}")]
    Voice(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<AsisError> for ChatError {
    fn from(err: AsisError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Llm(err.to_string())
    }
}
