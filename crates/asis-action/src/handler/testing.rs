//! Recording fakes for the external collaborators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use asis_core::clock::{Clock, FixedClock};

use crate::error::ServiceError;
use crate::services::{
    CalendarEntry, DeviceCalendar, EmailSender, Notification, NotificationScheduler,
    OutgoingEmail, SearchResponse, SearchResult, Services, WebSearch,
};

/// 2024-05-01 12:00 UTC.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(now()))
}

#[derive(Default)]
pub struct FakeEmail {
    pub fail: bool,
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl FakeEmail {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for FakeEmail {
    async fn send_email(&self, email: &OutgoingEmail) -> Result<(), ServiceError> {
        if self.fail {
            return Err(ServiceError::Network("smtp unreachable".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSearch {
    pub fail: bool,
    pub queries: Mutex<Vec<String>>,
}

#[async_trait]
impl WebSearch for FakeSearch {
    async fn search(&self, query: &str) -> SearchResponse {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return SearchResponse::failed(query, "offline");
        }
        SearchResponse {
            success: true,
            query: query.to_string(),
            direct_answer: None,
            results: vec![SearchResult {
                title: format!("Despre {}", query),
                snippet: "Un rezultat de test.".to_string(),
                link: "https://example.com".to_string(),
            }],
            error: None,
        }
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    pub fail: bool,
    pub added: Mutex<Vec<CalendarEntry>>,
    pub removed: Mutex<Vec<String>>,
}

#[async_trait]
impl DeviceCalendar for FakeCalendar {
    async fn add_event(&self, entry: &CalendarEntry) -> Result<Option<String>, ServiceError> {
        if self.fail {
            return Err(ServiceError::Rejected("calendar locked".to_string()));
        }
        let mut added = self.added.lock().unwrap();
        added.push(entry.clone());
        Ok(Some(format!("ext-{}", added.len())))
    }

    async fn remove_event(&self, external_id: &str) -> Result<bool, ServiceError> {
        self.removed.lock().unwrap().push(external_id.to_string());
        Ok(true)
    }
}

#[derive(Default)]
pub struct FakeNotifications {
    pub scheduled: Mutex<Vec<Notification>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl FakeNotifications {
    pub fn ids(&self) -> Vec<String> {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.id.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationScheduler for FakeNotifications {
    async fn schedule_at(&self, notification: Notification) -> Result<(), ServiceError> {
        self.scheduled.lock().unwrap().push(notification);
        Ok(())
    }

    async fn cancel(&self, id: &str) -> Result<bool, ServiceError> {
        self.cancelled.lock().unwrap().push(id.to_string());
        Ok(true)
    }
}

/// One of each fake, kept so tests can inspect what happened.
#[derive(Default)]
pub struct Fakes {
    pub email: Arc<FakeEmail>,
    pub search: Arc<FakeSearch>,
    pub calendar: Arc<FakeCalendar>,
    pub notifications: Arc<FakeNotifications>,
}

impl Fakes {
    pub fn with_failing_email() -> Self {
        Self {
            email: Arc::new(FakeEmail {
                fail: true,
                ..FakeEmail::default()
            }),
            ..Self::default()
        }
    }

    pub fn services(&self) -> Services {
        Services {
            email: self.email.clone(),
            search: self.search.clone(),
            calendar: self.calendar.clone(),
            notifications: self.notifications.clone(),
        }
    }
}
