//! Conversation orchestrator: LLM call, reply parsing, search augmentation,
//! action dispatch and persistence of the exchange.
//!
//! Each utterance is one sequential chain of awaits. The rolling history and
//! the active conversation live behind a short-lived `std::sync::Mutex` that
//! is never held across an `.await`; overlapping utterances may interleave.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use asis_action::{payload, ActionDispatcher, ActionOutcome, Intent, WebSearch};
use asis_core::clock::Clock;
use asis_core::config::AsisConfig;
use asis_core::types::{Conversation, Message, Role};
use asis_storage::{ConversationRepository, Database};

use crate::error::ChatError;
use crate::history::{RollingHistory, Turn};
use crate::llm::LlmClient;
use crate::parser::{ParsedReply, ResponseParser, ERROR_INTENT};
use crate::summary;

/// Spoken when the pipeline fails for an unclassified reason.
pub const GENERIC_ERROR_REPLY: &str = "A apărut o eroare. Te rog încearcă din nou.";

/// Conversation titles are cut to this many characters.
const TITLE_CHARS: usize = 50;

/// Tunables read from `[assistant]` and `[search]`.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub history_capacity: usize,
    pub context_turns: usize,
    pub request_timeout: Duration,
    pub max_message_length: usize,
    pub search_enabled: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AsisConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &AsisConfig) -> Self {
        Self {
            history_capacity: config.assistant.history_capacity,
            context_turns: config.assistant.context_turns,
            request_timeout: Duration::from_secs(config.assistant.request_timeout_secs),
            max_message_length: config.assistant.max_message_length,
            search_enabled: config.search.enabled,
        }
    }
}

/// Everything the UI needs to show (and speak) one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub success: bool,
    pub response: String,
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_result: Option<ActionOutcome>,
    pub needs_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_question: Option<String>,
    pub search_performed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssistantReply {
    fn failure(err: &ChatError) -> Self {
        Self {
            success: false,
            response: apology(err).to_string(),
            intent: ERROR_INTENT.to_string(),
            action_result: None,
            needs_confirmation: false,
            follow_up_question: None,
            search_performed: false,
            conversation_id: None,
            error: Some(err.to_string()),
        }
    }
}

/// User-facing sentence for a pipeline failure.
fn apology(err: &ChatError) -> &'static str {
    match err {
        ChatError::EmptyMessage => "Nu am primit niciun mesaj.",
        ChatError::MessageTooLong(_) => "Mesajul este prea lung. Te rog să-l scurtezi.",
        ChatError::NotConfigured(_) => {
            "Îmi pare rău, serviciul AI nu este configurat. Verifică cheia API Gemini."
        }
        ChatError::Timeout(_) => "Îmi pare rău, răspunsul a durat prea mult. Te rog încearcă din nou.",
        ChatError::Llm(detail) => {
            let lower = detail.to_lowercase();
            if lower.contains("quota") || lower.contains("429") {
                "Am atins limita de cereri. Te rog încearcă din nou mai târziu."
            } else if lower.contains("key") && (lower.contains("invalid") || lower.contains("not valid")) {
                "Cheia API nu este validă. Verifică configurația."
            } else if lower.contains("connect") || lower.contains("network") || lower.contains("dns") {
                "Probleme de conexiune la internet. Verifică rețeaua."
            } else {
                GENERIC_ERROR_REPLY
            }
        }
        _ => GENERIC_ERROR_REPLY,
    }
}

#[derive(Debug, Default)]
struct ChatState {
    history: RollingHistory,
    active: Option<Uuid>,
}

/// Glues the LLM, the response parser and the action dispatcher together.
pub struct ConversationOrchestrator {
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<ActionDispatcher>,
    search: Arc<dyn WebSearch>,
    conversations: ConversationRepository,
    parser: ResponseParser,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
    state: Mutex<ChatState>,
}

impl ConversationOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: Arc<ActionDispatcher>,
        search: Arc<dyn WebSearch>,
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        let state = ChatState {
            history: RollingHistory::new(settings.history_capacity),
            active: None,
        };
        Self {
            llm,
            dispatcher,
            search,
            conversations: ConversationRepository::new(db),
            parser: ResponseParser::new(),
            clock,
            settings,
            state: Mutex::new(state),
        }
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------
    // Session management
    // -----------------------------------------------------------------

    /// Start a fresh conversation and make it the active one.
    pub fn start_conversation(&self, title: &str) -> Result<Conversation, ChatError> {
        let conversation = self.create_conversation(title)?;
        let mut state = self.state();
        state.history.clear();
        state.active = Some(conversation.id);
        info!(conversation = %conversation.id, "Conversation started");
        Ok(conversation)
    }

    /// Make a stored conversation active and preload its recent turns.
    pub fn resume_conversation(&self, id: Uuid) -> Result<Conversation, ChatError> {
        let conversation = self
            .conversations
            .get(id)?
            .ok_or(ChatError::ConversationNotFound(id))?;
        let recent = self
            .conversations
            .recent_messages(id, self.settings.context_turns)?;

        let mut state = self.state();
        state.history.replace(recent.iter().map(Turn::from));
        state.active = Some(id);
        info!(conversation = %id, turns = recent.len(), "Conversation resumed");
        Ok(conversation)
    }

    /// Detach from the active conversation; returns its id.
    pub fn end_conversation(&self) -> Option<Uuid> {
        let mut state = self.state();
        state.history.clear();
        state.active.take()
    }

    pub fn active_conversation(&self) -> Option<Uuid> {
        self.state().active
    }

    /// Snapshot of the rolling history, oldest first.
    pub fn history(&self) -> Vec<Turn> {
        self.state().history.iter().cloned().collect()
    }

    // -----------------------------------------------------------------
    // Message processing
    // -----------------------------------------------------------------

    /// Process one utterance against the rolling history and the active
    /// conversation. Never fails: errors become `success: false`.
    pub async fn process_message(&self, text: &str) -> AssistantReply {
        let text = text.trim();
        if let Err(e) = self.validate(text) {
            return AssistantReply::failure(&e);
        }

        let history = self.state().history.recent(self.settings.context_turns);
        let mut reply = match self.respond(text, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Message processing failed");
                return AssistantReply::failure(&e);
            }
        };

        let active = {
            let mut state = self.state();
            state.history.push_exchange(text, reply.response.as_str());
            state.active
        };
        if let Some(id) = active {
            self.persist_exchange(id, text, &reply.response);
            reply.conversation_id = Some(id);
        }
        reply
    }

    /// Process one utterance within a stored conversation, creating it (titled
    /// after the text) when `conversation_id` is absent or unknown.
    ///
    /// Uses the conversation's own stored turns as context and leaves the
    /// rolling history untouched.
    pub async fn process_in_conversation(
        &self,
        conversation_id: Option<Uuid>,
        text: &str,
    ) -> Result<AssistantReply, ChatError> {
        let text = text.trim();
        self.validate(text)?;

        let existing = match conversation_id {
            Some(id) => self.conversations.get(id)?,
            None => None,
        };
        let (conversation, history) = match existing {
            Some(conversation) => {
                let history = self
                    .conversations
                    .recent_messages(conversation.id, self.settings.context_turns)?
                    .iter()
                    .map(Turn::from)
                    .collect::<Vec<_>>();
                (conversation, history)
            }
            None => {
                let title: String = text.chars().take(TITLE_CHARS).collect();
                (self.create_conversation(&title)?, Vec::new())
            }
        };

        let mut reply = match self.respond(text, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(conversation = %conversation.id, error = %e, "Message processing failed");
                AssistantReply::failure(&e)
            }
        };
        if reply.success {
            self.persist_exchange(conversation.id, text, &reply.response);
        }
        reply.conversation_id = Some(conversation.id);
        Ok(reply)
    }

    fn validate(&self, text: &str) -> Result<(), ChatError> {
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.settings.max_message_length {
            return Err(ChatError::MessageTooLong(self.settings.max_message_length));
        }
        Ok(())
    }

    /// LLM call, parse, then either search augmentation or action dispatch.
    async fn respond(&self, text: &str, history: &[Turn]) -> Result<AssistantReply, ChatError> {
        let raw = self.with_timeout(self.llm.chat(text, history)).await?;
        let parsed = self.parser.parse(&raw);
        debug!(
            intent = %parsed.intent,
            needs_confirmation = parsed.needs_confirmation,
            has_data = parsed.action_data.is_some(),
            "LLM reply parsed"
        );

        let mut reply = AssistantReply {
            success: true,
            response: parsed.response.clone(),
            intent: parsed.intent.clone(),
            action_result: None,
            needs_confirmation: parsed.needs_confirmation,
            follow_up_question: parsed.follow_up_question.clone(),
            search_performed: false,
            conversation_id: None,
            error: None,
        };

        if parsed.wants_search() {
            if self.settings.search_enabled {
                self.augment_with_search(text, history, &parsed, &mut reply)
                    .await?;
            }
            return Ok(reply);
        }

        let Some(intent) = parsed.action_intent() else {
            return Ok(reply);
        };
        if parsed.needs_confirmation {
            return Ok(reply);
        }
        let data = parsed.action_data.clone().unwrap_or(Value::Null);
        if payload::is_empty(&data) && !intent.is_listing() {
            debug!(intent = %intent, "No action data, skipping dispatch");
            return Ok(reply);
        }

        let data = if data.is_null() {
            Value::Object(Map::new())
        } else {
            data
        };
        let outcome = self.dispatcher.dispatch(intent, &data).await;
        reply.response = self.spoken_outcome(intent, &outcome);
        reply.action_result = Some(outcome);
        Ok(reply)
    }

    async fn augment_with_search(
        &self,
        text: &str,
        history: &[Turn],
        parsed: &ParsedReply,
        reply: &mut AssistantReply,
    ) -> Result<(), ChatError> {
        let query = parsed
            .search_query
            .clone()
            .or_else(|| {
                parsed
                    .action_data
                    .as_ref()
                    .and_then(|d| d.get("query"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| text.to_string());

        let results = self.search.search(&query).await;
        if !results.success {
            warn!(query = %query, error = ?results.error, "Search failed, keeping first reply");
            return Ok(());
        }

        let context = results.format_for_prompt();
        let raw = self
            .with_timeout(self.llm.chat_with_context(text, &context, history))
            .await?;
        let second = self.parser.parse(&raw);
        info!(query = %query, results = results.results.len(), "Answer augmented with search");

        reply.response = second.response;
        reply.needs_confirmation = second.needs_confirmation;
        reply.follow_up_question = second.follow_up_question;
        reply.search_performed = true;
        Ok(())
    }

    fn spoken_outcome(&self, intent: Intent, outcome: &ActionOutcome) -> String {
        if !outcome.success {
            let error = outcome.error.as_deref().unwrap_or(GENERIC_ERROR_REPLY);
            return format!("Îmi pare rău, {}", error);
        }
        summary::list_summary(intent, outcome.data.as_ref(), self.dispatcher.dates())
            .or_else(|| outcome.message.clone())
            .unwrap_or_else(|| "Gata.".to_string())
    }

    async fn with_timeout<F>(&self, call: F) -> Result<String, ChatError>
    where
        F: Future<Output = Result<String, ChatError>>,
    {
        match tokio::time::timeout(self.settings.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout(self.settings.request_timeout.as_secs())),
        }
    }

    // -----------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------

    fn create_conversation(&self, title: &str) -> Result<Conversation, ChatError> {
        let now = self.clock.now();
        let title = title.trim();
        let mut conversation = Conversation::new(if title.is_empty() {
            "Conversație nouă"
        } else {
            title
        });
        conversation.created_at = now;
        conversation.updated_at = now;
        self.conversations.create(&conversation)?;
        Ok(conversation)
    }

    /// Store both turns; failures are logged, never surfaced.
    fn persist_exchange(&self, conversation_id: Uuid, user: &str, assistant: &str) {
        let now = self.clock.now();
        for (role, content) in [(Role::User, user), (Role::Assistant, assistant)] {
            let mut message = Message::new(conversation_id, role, content);
            message.created_at = now;
            if let Err(e) = self.conversations.add_message(&message) {
                warn!(conversation = %conversation_id, error = %e, "Failed to persist message");
                return;
            }
        }
        if let Err(e) = self.conversations.touch(conversation_id, now) {
            warn!(conversation = %conversation_id, error = %e, "Failed to touch conversation");
        }
    }
}
