//! Contracts for external collaborators and their concrete clients.
//!
//! Handlers only see the traits; `asis-app` wires in the real clients and
//! tests wire in fakes.

pub mod duckduckgo;
pub mod ics;
pub mod notifications;
pub mod smtp;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

pub use duckduckgo::DuckDuckGoSearch;
pub use ics::IcsCalendar;
pub use notifications::LocalNotificationScheduler;
pub use smtp::SmtpEmailSender;

// =============================================================================
// Email
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, email: &OutgoingEmail) -> Result<(), ServiceError>;
}

/// Syntactic check applied before any delivery attempt.
pub fn validate_email(address: &str) -> bool {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(address.trim()))
}

// =============================================================================
// Web search
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

/// Search outcome. Failures are carried here rather than returned as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const CONTEXT_RESULTS: usize = 5;
const SNIPPET_CHARS: usize = 200;

impl SearchResponse {
    pub fn failed(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            query: query.into(),
            direct_answer: None,
            results: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Context block handed to the LLM for a search-augmented answer.
    pub fn format_for_prompt(&self) -> String {
        if !self.success {
            return format!(
                "Nu am putut căuta informații: {}",
                self.error.as_deref().unwrap_or("eroare necunoscută")
            );
        }

        let mut out = format!("Rezultate căutare pentru '{}':\n\n", self.query);
        if let Some(ref answer) = self.direct_answer {
            out.push_str(&format!("Răspuns direct: {}\n\n", answer));
        }
        for (i, result) in self.results.iter().take(CONTEXT_RESULTS).enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, result.title));
            if !result.snippet.is_empty() {
                out.push_str(&format!("   {}\n", truncate_chars(&result.snippet, SNIPPET_CHARS)));
            }
            if !result.link.is_empty() {
                out.push_str(&format!("   Sursa: {}\n", result.link));
            }
            out.push('\n');
        }
        if self.direct_answer.is_none() && self.results.is_empty() {
            out.push_str("Nu am găsit rezultate relevante.\n");
        }
        out
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> SearchResponse;
}

// =============================================================================
// Device calendar
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEntry {
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub reminder_minutes: i64,
}

#[async_trait]
pub trait DeviceCalendar: Send + Sync {
    /// Insert an entry; returns the calendar's own identifier when it has one.
    async fn add_event(&self, entry: &CalendarEntry) -> Result<Option<String>, ServiceError>;

    /// Remove a previously inserted entry.
    async fn remove_event(&self, external_id: &str) -> Result<bool, ServiceError>;
}

// =============================================================================
// Local notifications
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    async fn schedule_at(&self, notification: Notification) -> Result<(), ServiceError>;

    /// Cancel by id. Returns false when nothing was pending under that id.
    async fn cancel(&self, id: &str) -> Result<bool, ServiceError>;
}

/// The collaborator set handed to the dispatcher.
#[derive(Clone)]
pub struct Services {
    pub email: Arc<dyn EmailSender>,
    pub search: Arc<dyn WebSearch>,
    pub calendar: Arc<dyn DeviceCalendar>,
    pub notifications: Arc<dyn NotificationScheduler>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ana.pop@example.ro"));
        assert!(validate_email(" ion+asis@mail.co.uk "));
        assert!(!validate_email("ana@"));
        assert!(!validate_email("not an email"));
        assert!(!validate_email("ana@example.c"));
        assert!(!validate_email(""));
    }

    #[test]
    fn test_format_for_prompt_with_answer_and_results() {
        let response = SearchResponse {
            success: true,
            query: "vremea Cluj".to_string(),
            direct_answer: Some("18°C, însorit".to_string()),
            results: vec![SearchResult {
                title: "Prognoza meteo".to_string(),
                snippet: "x".repeat(250),
                link: "https://meteo.example/cluj".to_string(),
            }],
            error: None,
        };
        let text = response.format_for_prompt();
        assert!(text.starts_with("Rezultate căutare pentru 'vremea Cluj':"));
        assert!(text.contains("Răspuns direct: 18°C, însorit"));
        assert!(text.contains("1. Prognoza meteo"));
        assert!(text.contains(&format!("{}...", "x".repeat(200))));
        assert!(!text.contains(&"x".repeat(201)));
    }

    #[test]
    fn test_format_for_prompt_caps_results() {
        let response = SearchResponse {
            success: true,
            query: "q".to_string(),
            direct_answer: None,
            results: (0..8)
                .map(|i| SearchResult {
                    title: format!("rezultat {}", i),
                    snippet: String::new(),
                    link: String::new(),
                })
                .collect(),
            error: None,
        };
        let text = response.format_for_prompt();
        assert!(text.contains("5. rezultat 4"));
        assert!(!text.contains("6. rezultat 5"));
    }

    #[test]
    fn test_format_for_failed_search() {
        let text = SearchResponse::failed("q", "timeout").format_for_prompt();
        assert!(text.contains("timeout"));
    }
}
