//! Scripted collaborators shared by the chat tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use asis_action::{
    ActionDispatcher, ActionSettings, CalendarEntry, DateParser, DeviceCalendar, EmailSender,
    Notification, NotificationScheduler, OutgoingEmail, SearchResponse, SearchResult,
    ServiceError, Services, WebSearch,
};
use asis_core::clock::FixedClock;
use asis_storage::Database;

use crate::error::ChatError;
use crate::history::Turn;
use crate::llm::LlmClient;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(now()))
}

/// One recorded LLM call.
#[derive(Debug, Clone)]
pub struct LlmCall {
    pub message: String,
    pub context: Option<String>,
    pub history: Vec<Turn>,
}

/// Replies with canned text in order; errors once the script runs out.
#[derive(Default)]
pub struct ScriptedLlm {
    pub(crate) replies: Mutex<VecDeque<Result<String, String>>>,
    pub calls: Mutex<Vec<LlmCall>>,
    pub delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(error.to_string())])),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn next(&self, call: LlmCall) -> Result<String, ChatError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(call);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(ChatError::Llm(e)),
            None => Err(ChatError::Llm("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, message: &str, history: &[Turn]) -> Result<String, ChatError> {
        self.next(LlmCall {
            message: message.to_string(),
            context: None,
            history: history.to_vec(),
        })
        .await
    }

    async fn chat_with_context(
        &self,
        message: &str,
        context: &str,
        history: &[Turn],
    ) -> Result<String, ChatError> {
        self.next(LlmCall {
            message: message.to_string(),
            context: Some(context.to_string()),
            history: history.to_vec(),
        })
        .await
    }
}

#[derive(Default)]
pub struct StaticSearch {
    pub fail: bool,
    pub queries: Mutex<Vec<String>>,
}

#[async_trait]
impl WebSearch for StaticSearch {
    async fn search(&self, query: &str) -> SearchResponse {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return SearchResponse::failed(query, "offline");
        }
        SearchResponse {
            success: true,
            query: query.to_string(),
            direct_answer: Some("22°C".to_string()),
            results: vec![SearchResult {
                title: "Meteo".to_string(),
                snippet: "Însorit".to_string(),
                link: "https://meteo.example".to_string(),
            }],
            error: None,
        }
    }
}

#[derive(Default)]
pub struct NullEmail {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl EmailSender for NullEmail {
    async fn send_email(&self, email: &OutgoingEmail) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct NullCalendar;

#[async_trait]
impl DeviceCalendar for NullCalendar {
    async fn add_event(&self, _entry: &CalendarEntry) -> Result<Option<String>, ServiceError> {
        Ok(None)
    }

    async fn remove_event(&self, _external_id: &str) -> Result<bool, ServiceError> {
        Ok(false)
    }
}

pub struct NullNotifications;

#[async_trait]
impl NotificationScheduler for NullNotifications {
    async fn schedule_at(&self, _notification: Notification) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn cancel(&self, _id: &str) -> Result<bool, ServiceError> {
        Ok(false)
    }
}

/// A dispatcher over `db` whose external services all succeed quietly.
pub fn dispatcher(db: Arc<Database>, search: Arc<StaticSearch>) -> Arc<ActionDispatcher> {
    let services = Services {
        email: Arc::new(NullEmail::default()),
        search,
        calendar: Arc::new(NullCalendar),
        notifications: Arc::new(NullNotifications),
    };
    let settings = ActionSettings {
        utc_offset: DateParser::utc().offset(),
        ..ActionSettings::default()
    };
    Arc::new(ActionDispatcher::new(db, services, clock(), settings))
}
