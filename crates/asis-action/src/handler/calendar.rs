//! Calendar intents.
//!
//! `schedule_meeting` is one authoritative write (the stored event) followed
//! by independent side effects: invitation email, confirmation copy, two
//! local notifications and a device calendar entry. Each side effect is
//! attempted on its own and reported in `data.side_effects`; none of them
//! can fail the action once the event is stored.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use asis_core::clock::Clock;
use asis_core::types::{CalendarEvent, EventStatus};
use asis_storage::{CalendarFilter, CalendarRepository, Database};

use crate::date_parser::DateParser;
use crate::dispatcher::ActionSettings;
use crate::error::ActionError;
use crate::handler::AuditLog;
use crate::payload::{self, lenient_bool, lenient_i64, lenient_string, Target};
use crate::services::{validate_email, CalendarEntry, Notification, Services};
use crate::templates;
use crate::types::{ActionOutcome, SideEffect, SideEffectReport};

const DEFAULT_MEETING_TITLE: &str = "Întâlnire";
const DEFAULT_EVENT_TITLE: &str = "Eveniment";
const DEFAULT_DURATION_MINUTES: i64 = 60;
/// One week.
const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;
const UPCOMING_LIMIT: u64 = 10;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MeetingFields {
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    start_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    date: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    end_time: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    duration_minutes: Option<i64>,
    #[serde(deserialize_with = "lenient_string")]
    attendee_email: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    attendee_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    location: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    reminder: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListFields {
    #[serde(deserialize_with = "lenient_bool")]
    include_past: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LookupFields {
    #[serde(deserialize_with = "lenient_string")]
    event_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    event_title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
}

pub struct CalendarHandler {
    repo: CalendarRepository,
    services: Services,
    audit: Arc<AuditLog>,
    dates: DateParser,
    clock: Arc<dyn Clock>,
    settings: ActionSettings,
}

impl CalendarHandler {
    pub fn new(
        db: Arc<Database>,
        services: Services,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        settings: ActionSettings,
    ) -> Self {
        Self {
            repo: CalendarRepository::new(db),
            services,
            audit,
            dates: DateParser::new(settings.utc_offset),
            clock,
            settings,
        }
    }

    /// `schedule_meeting`.
    pub async fn schedule_meeting(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: MeetingFields = payload::parse(data)?;
        let now = self.clock.now();

        let start = self.start_time(&fields, now, None)?.ok_or(ActionError::MissingDate)?;
        if start <= now {
            return Err(ActionError::DateInPast);
        }
        let end = self.end_time(&fields, start, now)?;
        if let Some(ref email) = fields.attendee_email {
            if !validate_email(email) {
                return Err(ActionError::InvalidEmail(email.clone()));
            }
        }

        let mut event = CalendarEvent::new(
            fields.title.unwrap_or_else(|| DEFAULT_MEETING_TITLE.to_string()),
            start,
            end,
        );
        event.created_at = now;
        event.updated_at = now;
        event.description = fields.description;
        event.attendee_email = fields.attendee_email;
        event.attendee_name = fields.attendee_name;
        event.meet_link = Some(templates::meet_link());
        event.reminder_time = minutes_before(start, self.settings.lead_minutes);

        // Authoritative write: only this can fail the action.
        self.repo.create(&event)?;
        let action_id = self.audit.begin(
            "schedule_meeting",
            event.attendee_email.as_deref(),
            Some(data.to_string()),
        );
        self.audit.finish(action_id, None);
        info!(event_id = %event.id, title = %event.title, start = %event.start_time, "Meeting scheduled");

        let mut reports = Vec::with_capacity(5);
        reports.push(self.send_invitation(&event).await);
        reports.push(self.send_confirmation(&event).await);
        reports.extend(self.schedule_notifications(&event, now).await);
        reports.push(self.insert_device_entry(&mut event, fields.location).await);

        let when = self.dates.display(event.start_time);
        let mut message = format!("Întâlnirea '{}' a fost programată pe {}.", event.title, when);
        if reports[0].is_done() {
            if let Some(ref email) = event.attendee_email {
                message.push_str(&format!(" Invitația a fost trimisă către {}.", email));
            }
        }

        Ok(ActionOutcome::ok(message).with_data(json!({
            "event": event,
            "meet_link": event.meet_link,
            "side_effects": reports,
        })))
    }

    /// `add_calendar_event`: store, then a best-effort device calendar entry.
    pub async fn add_event(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: MeetingFields = payload::parse(data)?;
        let now = self.clock.now();

        let default_time = NaiveTime::from_hms_opt(9, 0, 0);
        let start = self
            .start_time(&fields, now, default_time)?
            .ok_or(ActionError::MissingDate)?;
        let end = self.end_time(&fields, start, now)?;

        let mut event = CalendarEvent::new(
            fields.title.unwrap_or_else(|| DEFAULT_EVENT_TITLE.to_string()),
            start,
            end,
        );
        event.created_at = now;
        event.updated_at = now;
        event.description = fields.description;
        event.reminder_enabled = fields.reminder.unwrap_or(true);
        if event.reminder_enabled {
            event.reminder_time = minutes_before(start, self.settings.reminder_minutes);
        }

        self.repo.create(&event)?;
        info!(event_id = %event.id, title = %event.title, "Calendar event added");

        let report = self.insert_device_entry(&mut event, fields.location).await;
        Ok(ActionOutcome::ok(format!(
            "Evenimentul '{}' a fost adăugat în calendar.",
            event.title
        ))
        .with_data(json!({ "event": event, "side_effects": [report] })))
    }

    /// `list_calendar_events`: upcoming scheduled events, soonest first.
    pub fn list_events(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: ListFields = payload::parse(data)?;
        let filter = if fields.include_past == Some(true) {
            CalendarFilter {
                status: Some(EventStatus::Scheduled),
                ..CalendarFilter::default()
            }
        } else {
            CalendarFilter::upcoming(self.clock.now(), UPCOMING_LIMIT)
        };

        let events = self.repo.list(&filter)?;
        let message = if events.is_empty() {
            "Nu ai evenimente programate.".to_string()
        } else {
            format!("Ai {} evenimente programate.", events.len())
        };
        Ok(ActionOutcome::ok(message).with_data(json!({ "events": events, "count": events.len() })))
    }

    /// `cancel_calendar_event`: status becomes cancelled, pending
    /// notifications and the device entry are withdrawn.
    pub async fn cancel_event(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: LookupFields = payload::parse(data)?;
        let target = Target::resolve(
            fields.event_id.as_deref(),
            fields.event_title.as_deref().or(fields.title.as_deref()),
        )
        .ok_or(ActionError::MissingField("titlul evenimentului"))?;

        let event = match target {
            Target::Id(id) => self.repo.get(id)?,
            Target::Text(ref text) => {
                let scheduled = CalendarFilter {
                    status: Some(EventStatus::Scheduled),
                    ..CalendarFilter::default()
                };
                match self.repo.find_by_title(text, &scheduled)? {
                    Some(event) => Some(event),
                    None => self.repo.find_by_title(text, &CalendarFilter::default())?,
                }
            }
        }
        .ok_or(ActionError::EventNotFound)?;

        let event = self
            .repo
            .set_status(event.id, EventStatus::Cancelled)?
            .ok_or(ActionError::EventNotFound)?;
        self.withdraw(&event).await;

        info!(event_id = %event.id, "Calendar event cancelled");
        Ok(ActionOutcome::ok(format!("Evenimentul '{}' a fost anulat.", event.title))
            .with_data(json!({ "event": event })))
    }

    /// Cancel notifications and remove the device entry. Failures are logged.
    pub async fn withdraw(&self, event: &CalendarEvent) {
        for suffix in ["early", "start"] {
            let id = format!("{}-{}", event.id, suffix);
            if let Err(e) = self.services.notifications.cancel(&id).await {
                warn!(notification = %id, error = %e, "Failed to cancel notification");
            }
        }
        if let Some(ref external_id) = event.external_id {
            if let Err(e) = self.services.calendar.remove_event(external_id).await {
                warn!(external_id = %external_id, error = %e, "Failed to remove device calendar entry");
            }
        }
    }

    /// Start instant from `start_time`, or `date` plus `time`.
    ///
    /// `default_time` applies when only a day was given.
    fn start_time(
        &self,
        fields: &MeetingFields,
        now: DateTime<Utc>,
        default_time: Option<NaiveTime>,
    ) -> Result<Option<DateTime<Utc>>, ActionError> {
        let Some(raw) = fields.start_time.as_deref().or(fields.date.as_deref()) else {
            return Ok(None);
        };

        let time = fields.time.as_deref();
        let start = self
            .dates
            .combine(raw, time, now)
            .ok_or_else(|| ActionError::UnparseableDate(raw.to_string()))?;

        match default_time {
            Some(default) if time.is_none() && self.is_local_midnight(start) => {
                let day = start.with_timezone(&self.dates.offset()).date_naive();
                let text = day.and_time(default).format("%Y-%m-%d %H:%M").to_string();
                Ok(self.dates.parse(&text, now).or(Some(start)))
            }
            _ => Ok(Some(start)),
        }
    }

    fn end_time(
        &self,
        fields: &MeetingFields,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ActionError> {
        let fallback = || {
            let minutes = fields
                .duration_minutes
                .filter(|m| *m > 0)
                .unwrap_or(DEFAULT_DURATION_MINUTES)
                .min(MAX_DURATION_MINUTES);
            Duration::try_minutes(minutes)
                .and_then(|length| start.checked_add_signed(length))
                .ok_or_else(|| ActionError::UnparseableDate(start.to_rfc3339()))
        };

        match fields.end_time.as_deref() {
            Some(raw) => {
                let end = self
                    .dates
                    .combine(raw, None, now)
                    .ok_or_else(|| ActionError::UnparseableDate(raw.to_string()))?;
                if end > start {
                    Ok(end)
                } else {
                    fallback()
                }
            }
            None => fallback(),
        }
    }

    fn is_local_midnight(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.dates.offset());
        local.hour() == 0 && local.minute() == 0 && local.second() == 0
    }

    async fn send_invitation(&self, event: &CalendarEvent) -> SideEffectReport {
        let Some(ref to) = event.attendee_email else {
            return SideEffectReport::skipped(SideEffect::InvitationEmail, "no attendee");
        };
        let email = templates::invitation_email(event, to, self.settings.utc_offset);
        match self.services.email.send_email(&email).await {
            Ok(()) => SideEffectReport::done(SideEffect::InvitationEmail),
            Err(e) => {
                warn!(event_id = %event.id, to = %to, error = %e, "Invitation email failed");
                SideEffectReport::failed(SideEffect::InvitationEmail, e.to_string())
            }
        }
    }

    async fn send_confirmation(&self, event: &CalendarEvent) -> SideEffectReport {
        let Some(ref to) = self.settings.self_address else {
            return SideEffectReport::skipped(SideEffect::ConfirmationEmail, "no self address");
        };
        let email = templates::confirmation_email(event, to, self.settings.utc_offset);
        match self.services.email.send_email(&email).await {
            Ok(()) => SideEffectReport::done(SideEffect::ConfirmationEmail),
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Confirmation email failed");
                SideEffectReport::failed(SideEffect::ConfirmationEmail, e.to_string())
            }
        }
    }

    async fn schedule_notifications(
        &self,
        event: &CalendarEvent,
        now: DateTime<Utc>,
    ) -> Vec<SideEffectReport> {
        let lead = self.settings.lead_minutes;
        let start_text = event
            .start_time
            .with_timezone(&self.settings.utc_offset)
            .format("%H:%M")
            .to_string();

        let plan = [
            (
                SideEffect::EarlyNotification,
                minutes_before(event.start_time, lead).map(|at| Notification {
                    id: format!("{}-early", event.id),
                    title: format!("Întâlnire în {} minute", lead),
                    body: format!("{} începe la {}", event.title, start_text),
                    at,
                    payload: Some(event.id.to_string()),
                }),
            ),
            (
                SideEffect::StartNotification,
                Some(Notification {
                    id: format!("{}-start", event.id),
                    title: "Întâlnirea începe acum".to_string(),
                    body: event.title.clone(),
                    at: event.start_time,
                    payload: Some(event.id.to_string()),
                }),
            ),
        ];

        let mut reports = Vec::with_capacity(plan.len());
        for (effect, notification) in plan {
            let Some(notification) = notification else {
                reports.push(SideEffectReport::skipped(effect, "invalid lead time"));
                continue;
            };
            if notification.at <= now {
                reports.push(SideEffectReport::skipped(effect, "time already passed"));
                continue;
            }
            let id = notification.id.clone();
            match self.services.notifications.schedule_at(notification).await {
                Ok(()) => reports.push(SideEffectReport::done(effect)),
                Err(e) => {
                    warn!(notification = %id, error = %e, "Failed to schedule notification");
                    reports.push(SideEffectReport::failed(effect, e.to_string()));
                }
            }
        }
        reports
    }

    async fn insert_device_entry(
        &self,
        event: &mut CalendarEvent,
        location: Option<String>,
    ) -> SideEffectReport {
        let mut description = event.description.clone().unwrap_or_default();
        if let Some(ref link) = event.meet_link {
            if !description.is_empty() {
                description.push('\n');
            }
            description.push_str(link);
        }

        let entry = CalendarEntry {
            title: event.title.clone(),
            description: (!description.is_empty()).then_some(description),
            start: event.start_time,
            end: event.end_time,
            location,
            reminder_minutes: if event.reminder_enabled {
                self.settings.reminder_minutes
            } else {
                0
            },
        };

        match self.services.calendar.add_event(&entry).await {
            Ok(Some(external_id)) => {
                if let Err(e) = self.repo.set_external_id(event.id, &external_id) {
                    warn!(event_id = %event.id, error = %e, "Failed to store device calendar id");
                }
                event.external_id = Some(external_id);
                SideEffectReport::done(SideEffect::DeviceCalendar)
            }
            Ok(None) => SideEffectReport::done(SideEffect::DeviceCalendar),
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Device calendar insert failed");
                SideEffectReport::failed(SideEffect::DeviceCalendar, e.to_string())
            }
        }
    }
}

/// `at` minus `minutes`, or `None` when the offset is out of range.
fn minutes_before(at: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    Duration::try_minutes(minutes).and_then(|lead| at.checked_sub_signed(lead))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::{self, Fakes};
    use crate::types::EffectStatus;
    use chrono::TimeZone;

    fn settings() -> ActionSettings {
        ActionSettings {
            self_address: Some("eu@example.com".to_string()),
            ..ActionSettings::default()
        }
    }

    fn setup(fakes: &Fakes, settings: ActionSettings) -> (CalendarHandler, CalendarRepository) {
        let db = Arc::new(Database::in_memory().unwrap());
        let audit = Arc::new(AuditLog::new(Arc::clone(&db), testing::clock()));
        let handler = CalendarHandler::new(
            Arc::clone(&db),
            fakes.services(),
            audit,
            testing::clock(),
            settings,
        );
        (handler, CalendarRepository::new(db))
    }

    fn utc_settings() -> ActionSettings {
        ActionSettings {
            utc_offset: DateParser::utc().offset(),
            ..settings()
        }
    }

    fn statuses(outcome: &ActionOutcome) -> Vec<(String, String)> {
        outcome.data.as_ref().unwrap()["side_effects"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| {
                (
                    r["effect"].as_str().unwrap().to_string(),
                    r["status"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_schedule_meeting_runs_every_side_effect() {
        let fakes = Fakes::default();
        let (handler, repo) = setup(&fakes, utc_settings());

        let outcome = handler
            .schedule_meeting(&json!({
                "title": "Sincronizare",
                "date": "2024-05-03",
                "time": "10:00",
                "attendee_email": "ana@example.com",
                "attendee_name": "Ana"
            }))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Întâlnirea 'Sincronizare' a fost programată pe 03.05.2024 10:00. Invitația a fost trimisă către ana@example.com.")
        );

        let events = repo.list(&CalendarFilter::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Scheduled);
        assert_eq!(events[0].end_time - events[0].start_time, Duration::minutes(60));
        assert_eq!(events[0].external_id.as_deref(), Some("ext-1"));
        assert!(events[0].meet_link.as_deref().unwrap().starts_with("https://meet.google.com/"));

        let sent = fakes.email.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "ana@example.com");
        assert_eq!(sent[1].to, "eu@example.com");

        let ids = fakes.notifications.ids();
        assert_eq!(ids.len(), 2);
        assert!(ids[0].ends_with("-early"));
        assert!(ids[1].ends_with("-start"));

        assert!(statuses(&outcome).iter().all(|(_, status)| status == "done"));
    }

    #[tokio::test]
    async fn test_email_failure_keeps_event() {
        let fakes = Fakes::with_failing_email();
        let (handler, repo) = setup(&fakes, utc_settings());

        let outcome = handler
            .schedule_meeting(&json!({
                "start_time": "2024-05-03T10:00:00Z",
                "attendee_email": "ana@example.com"
            }))
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(!outcome.message.as_deref().unwrap().contains("Invitația"));

        let events = repo.list(&CalendarFilter::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, DEFAULT_MEETING_TITLE);

        let reports = statuses(&outcome);
        assert_eq!(reports[0], ("invitation_email".to_string(), "failed".to_string()));
        assert_eq!(reports[1], ("confirmation_email".to_string(), "failed".to_string()));
        assert_eq!(reports[4], ("device_calendar".to_string(), "done".to_string()));
    }

    #[tokio::test]
    async fn test_skipped_effects_without_attendee_or_self_address() {
        let fakes = Fakes::default();
        let (handler, _) = setup(
            &fakes,
            ActionSettings {
                self_address: None,
                ..utc_settings()
            },
        );

        // Starts in 10 minutes: the early reminder time has already passed.
        let outcome = handler
            .schedule_meeting(&json!({"start_time": "2024-05-01T12:10:00Z"}))
            .await
            .unwrap();
        let reports: Vec<SideEffectReport> =
            serde_json::from_value(outcome.data.unwrap()["side_effects"].clone()).unwrap();
        assert_eq!(reports[0].status, EffectStatus::Skipped);
        assert_eq!(reports[1].status, EffectStatus::Skipped);
        assert_eq!(reports[2].status, EffectStatus::Skipped);
        assert_eq!(reports[3].status, EffectStatus::Done);
        assert!(fakes.email.sent().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_meeting_validation() {
        let fakes = Fakes::default();
        let (handler, repo) = setup(&fakes, utc_settings());

        let past = handler
            .schedule_meeting(&json!({"start_time": "2024-04-30T10:00:00Z"}))
            .await;
        assert!(matches!(past, Err(ActionError::DateInPast)));

        let missing = handler.schedule_meeting(&json!({"title": "x"})).await;
        assert!(matches!(missing, Err(ActionError::MissingDate)));

        let garbled = handler
            .schedule_meeting(&json!({"date": "la anul"}))
            .await;
        assert!(matches!(garbled, Err(ActionError::UnparseableDate(ref d)) if d == "la anul"));

        let bad_email = handler
            .schedule_meeting(&json!({"date": "mâine", "time": "10:00", "attendee_email": "nu"}))
            .await;
        assert!(matches!(bad_email, Err(ActionError::InvalidEmail(_))));

        assert!(repo.list(&CalendarFilter::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_end_and_duration() {
        let fakes = Fakes::default();
        let (handler, repo) = setup(&fakes, utc_settings());

        handler
            .schedule_meeting(&json!({
                "start_time": "2024-05-02T09:00:00Z",
                "end_time": "2024-05-02T09:30:00Z"
            }))
            .await
            .unwrap();
        handler
            .schedule_meeting(&json!({"start_time": "2024-05-02T11:00:00Z", "duration_minutes": "90"}))
            .await
            .unwrap();

        let events = repo.list(&CalendarFilter::default()).unwrap();
        assert_eq!(events[0].end_time - events[0].start_time, Duration::minutes(30));
        assert_eq!(events[1].end_time - events[1].start_time, Duration::minutes(90));
    }

    #[tokio::test]
    async fn test_out_of_range_durations_are_bounded() {
        let fakes = Fakes::default();
        let (handler, repo) = setup(&fakes, utc_settings());

        handler
            .schedule_meeting(&json!({"start_time": "2024-05-02T09:00:00Z", "duration_minutes": 1e12}))
            .await
            .unwrap();
        handler
            .schedule_meeting(&json!({"start_time": "2024-05-02T11:00:00Z", "duration_minutes": "inf"}))
            .await
            .unwrap();

        let events = repo.list(&CalendarFilter::default()).unwrap();
        assert_eq!(events[0].end_time - events[0].start_time, Duration::days(7));
        assert_eq!(events[1].end_time - events[1].start_time, Duration::minutes(60));
    }

    #[tokio::test]
    async fn test_unrepresentable_lead_time_skips_early_notification() {
        let fakes = Fakes::default();
        let (handler, repo) = setup(
            &fakes,
            ActionSettings {
                lead_minutes: i64::MAX,
                ..utc_settings()
            },
        );

        let outcome = handler
            .schedule_meeting(&json!({"start_time": "2024-05-02T09:00:00Z"}))
            .await
            .unwrap();
        assert!(outcome.success);
        let reports = statuses(&outcome);
        assert_eq!(reports[2], ("early_notification".to_string(), "skipped".to_string()));
        assert_eq!(reports[3], ("start_notification".to_string(), "done".to_string()));

        let events = repo.list(&CalendarFilter::default()).unwrap();
        assert!(events[0].reminder_time.is_none());
    }

    #[tokio::test]
    async fn test_add_event_defaults_to_nine() {
        let fakes = Fakes::default();
        let (handler, repo) = setup(&fakes, utc_settings());

        let outcome = handler
            .add_event(&json!({"title": "Ziua Mariei", "date": "2024-05-10"}))
            .await
            .unwrap();
        assert_eq!(
            outcome.message.as_deref(),
            Some("Evenimentul 'Ziua Mariei' a fost adăugat în calendar.")
        );

        let events = repo.list(&CalendarFilter::default()).unwrap();
        assert_eq!(
            events[0].start_time,
            Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
        );
        assert_eq!(fakes.calendar.added.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_event_survives_device_calendar_failure() {
        let fakes = Fakes {
            calendar: Arc::new(crate::handler::testing::FakeCalendar {
                fail: true,
                ..Default::default()
            }),
            ..Fakes::default()
        };
        let (handler, repo) = setup(&fakes, utc_settings());

        let outcome = handler
            .add_event(&json!({"date": "2024-05-10", "time": "18:00"}))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(statuses(&outcome)[0].1, "failed");
        let events = repo.list(&CalendarFilter::default()).unwrap();
        assert!(events[0].external_id.is_none());
    }

    #[tokio::test]
    async fn test_list_and_cancel() {
        let fakes = Fakes::default();
        let (handler, _) = setup(&fakes, utc_settings());

        handler
            .schedule_meeting(&json!({"title": "Dentist", "start_time": "2024-05-02T08:00:00Z"}))
            .await
            .unwrap();
        handler
            .add_event(&json!({"title": "Trecut", "date": "2024-04-01"}))
            .await
            .unwrap();

        let listed = handler.list_events(&json!({})).unwrap();
        assert_eq!(listed.message.as_deref(), Some("Ai 1 evenimente programate."));
        let all = handler.list_events(&json!({"include_past": true})).unwrap();
        assert_eq!(all.data.unwrap()["count"], 2);

        let cancelled = handler.cancel_event(&json!({"title": "dentist"})).await.unwrap();
        assert_eq!(
            cancelled.message.as_deref(),
            Some("Evenimentul 'Dentist' a fost anulat.")
        );
        assert_eq!(fakes.notifications.cancelled.lock().unwrap().len(), 2);
        assert_eq!(*fakes.calendar.removed.lock().unwrap(), vec!["ext-1"]);

        let empty = handler.list_events(&json!({})).unwrap();
        assert_eq!(empty.message.as_deref(), Some("Nu ai evenimente programate."));
    }

    #[tokio::test]
    async fn test_cancel_unknown_event() {
        let fakes = Fakes::default();
        let (handler, _) = setup(&fakes, utc_settings());
        let err = handler
            .cancel_event(&json!({"title": "nimic"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::EventNotFound));
    }
}
