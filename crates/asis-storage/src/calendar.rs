//! Calendar event persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use asis_core::error::AsisError;
use asis_core::types::{CalendarEvent, EventStatus};

use crate::db::{
    col, contains_ci, opt_time_col, sql_limit, storage_err, time_col, uuid_col, Database,
};

const EVENT_COLUMNS: &str = "id, external_id, title, description, start_time, end_time, \
                             meet_link, attendee_email, attendee_name, reminder_enabled, \
                             reminder_time, status, created_at, updated_at";

/// Filters for [`CalendarRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct CalendarFilter {
    pub status: Option<EventStatus>,
    /// Inclusive lower bound on `start_time`.
    pub starts_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `start_time`.
    pub starts_before: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl CalendarFilter {
    /// Scheduled events starting at or after `now`, soonest first.
    pub fn upcoming(now: DateTime<Utc>, limit: u64) -> Self {
        Self {
            status: Some(EventStatus::Scheduled),
            starts_from: Some(now),
            starts_before: None,
            limit: Some(limit),
        }
    }
}

/// Repository for calendar events.
pub struct CalendarRepository {
    db: Arc<Database>,
}

impl CalendarRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new event.
    pub fn create(&self, event: &CalendarEvent) -> Result<(), AsisError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO calendar_events ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    EVENT_COLUMNS
                ),
                rusqlite::params![
                    event.id.to_string(),
                    event.external_id,
                    event.title,
                    event.description,
                    event.start_time.timestamp(),
                    event.end_time.timestamp(),
                    event.meet_link,
                    event.attendee_email,
                    event.attendee_name,
                    event.reminder_enabled as i32,
                    event.reminder_time.map(|t| t.timestamp()),
                    event.status.as_str(),
                    event.created_at.timestamp(),
                    event.updated_at.timestamp(),
                ],
            )
            .map_err(|e| AsisError::Storage(format!("Failed to save calendar event: {}", e)))?;
            Ok(())
        })
    }

    /// Find an event by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<CalendarEvent>, AsisError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    &format!("SELECT {} FROM calendar_events WHERE id = ?1", EVENT_COLUMNS),
                    rusqlite::params![id.to_string()],
                    |row| Ok(row_to_event(row)),
                )
                .optional()
                .map_err(storage_err)?;
            result.transpose()
        })
    }

    /// List events matching the filter ordered by start time.
    pub fn list(&self, filter: &CalendarFilter) -> Result<Vec<CalendarEvent>, AsisError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(from) = filter.starts_from {
            clauses.push("start_time >= ?");
            params.push(Box::new(from.timestamp()));
        }
        if let Some(before) = filter.starts_before {
            clauses.push("start_time < ?");
            params.push(Box::new(before.timestamp()));
        }

        let mut sql = format!("SELECT {} FROM calendar_events", EVENT_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY start_time ASC, rowid ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(sql_limit(limit)));
        }

        self.db.with_conn(|conn| {
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| AsisError::Storage(format!("Calendar query prepare: {}", e)))?;
            let rows = stmt
                .query_map(param_refs.as_slice(), |row| Ok(row_to_event(row)))
                .map_err(|e| AsisError::Storage(format!("Calendar query: {}", e)))?;

            let mut events = Vec::new();
            for row in rows {
                events.push(row.map_err(storage_err)??);
            }
            Ok(events)
        })
    }

    /// First event (by start time) whose title contains `text`, ignoring case.
    pub fn find_by_title(
        &self,
        text: &str,
        filter: &CalendarFilter,
    ) -> Result<Option<CalendarEvent>, AsisError> {
        Ok(self
            .list(filter)?
            .into_iter()
            .find(|e| contains_ci(&e.title, text)))
    }

    /// Change the status of an event.
    pub fn set_status(&self, id: Uuid, status: EventStatus) -> Result<Option<CalendarEvent>, AsisError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE calendar_events SET status = ?2, updated_at = MAX(created_at, ?3)
                 WHERE id = ?1",
                rusqlite::params![id.to_string(), status.as_str(), Utc::now().timestamp()],
            )
            .map_err(storage_err)
        })?;
        if changed == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    /// Record the identifier assigned by the device calendar.
    pub fn set_external_id(&self, id: Uuid, external_id: &str) -> Result<bool, AsisError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE calendar_events SET external_id = ?2, updated_at = MAX(created_at, ?3)
                     WHERE id = ?1",
                    rusqlite::params![id.to_string(), external_id, Utc::now().timestamp()],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }

    /// Hard-delete an event.
    pub fn delete(&self, id: Uuid) -> Result<bool, AsisError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM calendar_events WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<CalendarEvent, AsisError> {
    let reminder_enabled: i32 = col(row, 9)?;
    let status: String = col(row, 11)?;
    Ok(CalendarEvent {
        id: uuid_col(row, 0)?,
        external_id: col(row, 1)?,
        title: col(row, 2)?,
        description: col(row, 3)?,
        start_time: time_col(row, 4)?,
        end_time: time_col(row, 5)?,
        meet_link: col(row, 6)?,
        attendee_email: col(row, 7)?,
        attendee_name: col(row, 8)?,
        reminder_enabled: reminder_enabled != 0,
        reminder_time: opt_time_col(row, 10)?,
        status: status.parse()?,
        created_at: time_col(row, 12)?,
        updated_at: time_col(row, 13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_repo() -> CalendarRepository {
        CalendarRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_create_and_get_round_trip_fields() {
        let repo = make_repo();
        let mut event = CalendarEvent::new("Ședință", at(10), at(11));
        event.attendee_email = Some("ana@example.com".to_string());
        event.meet_link = Some("https://meet.google.com/abc-defg-hij".to_string());
        repo.create(&event).unwrap();

        let loaded = repo.get(event.id).unwrap().unwrap();
        assert_eq!(loaded.start_time, at(10));
        assert_eq!(loaded.status, EventStatus::Scheduled);
        assert_eq!(loaded.attendee_email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_upcoming_excludes_past_and_cancelled() {
        let repo = make_repo();
        let past = CalendarEvent::new("trecut", at(8), at(9));
        let soon = CalendarEvent::new("curând", at(12), at(13));
        let later = CalendarEvent::new("mai târziu", at(15), at(16));
        let cancelled = CalendarEvent::new("anulat", at(14), at(15));
        for e in [&later, &past, &soon, &cancelled] {
            repo.create(e).unwrap();
        }
        repo.set_status(cancelled.id, EventStatus::Cancelled).unwrap();

        let upcoming = repo.list(&CalendarFilter::upcoming(at(10), 10)).unwrap();
        let titles: Vec<&str> = upcoming.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["curând", "mai târziu"]);

        let limited = repo.list(&CalendarFilter::upcoming(at(10), 1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_cancel_and_external_id() {
        let repo = make_repo();
        let event = CalendarEvent::new("Dentist", at(9), at(9) + Duration::minutes(30));
        repo.create(&event).unwrap();

        assert!(repo.set_external_id(event.id, "ics-1").unwrap());
        let cancelled = repo
            .set_status(event.id, EventStatus::Cancelled)
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.status, EventStatus::Cancelled);
        assert_eq!(cancelled.external_id.as_deref(), Some("ics-1"));
        assert!(cancelled.updated_at >= cancelled.created_at);
        assert!(repo
            .set_status(Uuid::new_v4(), EventStatus::Cancelled)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_by_title() {
        let repo = make_repo();
        repo.create(&CalendarEvent::new("Întâlnire cu Ana", at(10), at(11)))
            .unwrap();
        let found = repo
            .find_by_title("ana", &CalendarFilter::default())
            .unwrap();
        assert!(found.is_some());
        assert!(repo.delete(found.unwrap().id).unwrap());
    }
}
