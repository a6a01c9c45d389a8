//! Device calendar backed by an iCalendar (RFC 5545) file.
//!
//! Any desktop calendar can subscribe to or import the file. Every change
//! rewrites it whole; entries are addressed by their `UID`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{CalendarEntry, DeviceCalendar};
use crate::error::ServiceError;

const PRODID: &str = "-//ASIS//Asistent personal//RO";

pub struct IcsCalendar {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl IcsCalendar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_events(&self) -> Result<Vec<String>, ServiceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(split_events(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_events(&self, events: &[String]) -> Result<(), ServiceError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = String::new();
        out.push_str("BEGIN:VCALENDAR\r\n");
        out.push_str("VERSION:2.0\r\n");
        out.push_str(&format!("PRODID:{}\r\n", PRODID));
        out.push_str("CALSCALE:GREGORIAN\r\n");
        for event in events {
            out.push_str(event);
        }
        out.push_str("END:VCALENDAR\r\n");
        tokio::fs::write(&self.path, out).await?;
        Ok(())
    }
}

#[async_trait]
impl DeviceCalendar for IcsCalendar {
    async fn add_event(&self, entry: &CalendarEntry) -> Result<Option<String>, ServiceError> {
        if entry.end < entry.start {
            return Err(ServiceError::InvalidInput(
                "event ends before it starts".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let uid = format!("{}@asis", Uuid::new_v4());
        let mut events = self.read_events().await?;
        events.push(render_event(&uid, entry, Utc::now()));
        self.write_events(&events).await?;

        info!(uid = %uid, title = %entry.title, path = %self.path.display(), "Calendar entry written");
        Ok(Some(uid))
    }

    async fn remove_event(&self, external_id: &str) -> Result<bool, ServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut events = self.read_events().await?;
        let before = events.len();
        let uid_line = format!("UID:{}\r\n", external_id);
        events.retain(|event| !event.contains(&uid_line));

        if events.len() == before {
            debug!(uid = external_id, "Calendar entry not found");
            return Ok(false);
        }
        self.write_events(&events).await?;
        info!(uid = external_id, "Calendar entry removed");
        Ok(true)
    }
}

/// Cut an iCalendar document into its `VEVENT` blocks, CRLF-terminated.
fn split_events(content: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line == "BEGIN:VEVENT" {
            current = Some(String::new());
        }
        if let Some(ref mut block) = current {
            block.push_str(line);
            block.push_str("\r\n");
        }
        if line == "END:VEVENT" {
            if let Some(block) = current.take() {
                events.push(block);
            }
        }
    }
    events
}

fn render_event(uid: &str, entry: &CalendarEntry, stamp: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VEVENT\r\n");
    out.push_str(&format!("UID:{}\r\n", uid));
    out.push_str(&format!("DTSTAMP:{}\r\n", ics_time(stamp)));
    out.push_str(&format!("DTSTART:{}\r\n", ics_time(entry.start)));
    out.push_str(&format!("DTEND:{}\r\n", ics_time(entry.end)));
    out.push_str(&format!("SUMMARY:{}\r\n", escape_text(&entry.title)));
    if let Some(ref description) = entry.description {
        out.push_str(&format!("DESCRIPTION:{}\r\n", escape_text(description)));
    }
    if let Some(ref location) = entry.location {
        out.push_str(&format!("LOCATION:{}\r\n", escape_text(location)));
    }
    if entry.reminder_minutes > 0 {
        out.push_str("BEGIN:VALARM\r\n");
        out.push_str("ACTION:DISPLAY\r\n");
        out.push_str(&format!("DESCRIPTION:{}\r\n", escape_text(&entry.title)));
        out.push_str(&format!("TRIGGER:-PT{}M\r\n", entry.reminder_minutes));
        out.push_str("END:VALARM\r\n");
    }
    out.push_str("END:VEVENT\r\n");
    out
}

fn ics_time(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}
