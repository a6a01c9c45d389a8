//! Date heuristic for LLM-supplied date strings.
//!
//! Accepts RFC 3339 instants, a handful of naive date/time layouts (read in
//! the user's UTC offset) and the Romanian relative words `azi`/`astăzi`,
//! `mâine` and `poimâine`, optionally followed by `[la] HH:MM`. Everything
//! else yields `None`; the caller decides whether that is an error.

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%d.%m.%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];

const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S", "%H.%M"];

/// Parses dates relative to an injected `now`, in a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct DateParser {
    offset: FixedOffset,
}

impl DateParser {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// A parser that treats naive values as UTC.
    pub fn utc() -> Self {
        Self::new(FixedOffset::east_opt(0).unwrap_or_else(|| Utc.fix()))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Parse `input` relative to `now`.
    pub fn parse(&self, input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let text = input.trim();
        if text.is_empty() {
            return None;
        }

        if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
            return Some(instant.with_timezone(&Utc));
        }

        if let Some(relative) = self.parse_relative(&text.to_lowercase(), now) {
            return Some(relative);
        }

        for fmt in DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
                return self.from_local(naive);
            }
        }

        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
                return self.from_local(date.and_time(NaiveTime::MIN));
            }
        }

        None
    }

    /// Parse a date and override its time of day with `time`, when given.
    pub fn combine(
        &self,
        date: &str,
        time: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let base = self.parse(date, now)?;
        match time.map(str::trim).filter(|t| !t.is_empty()) {
            None => Some(base),
            Some(t) => {
                let time = parse_time(t)?;
                let day = base.with_timezone(&self.offset).date_naive();
                self.from_local(day.and_time(time))
            }
        }
    }

    /// Start of the user's current day and start of the next one.
    pub fn today_bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let today = now.with_timezone(&self.offset).date_naive();
        let start = self.from_local(today.and_time(NaiveTime::MIN))?;
        Some((start, start + Duration::days(1)))
    }

    /// Render an instant the way the assistant speaks it: `dd.mm.yyyy HH:MM`.
    pub fn display(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.offset)
            .format("%d.%m.%Y %H:%M")
            .to_string()
    }

    fn parse_relative(&self, lower: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut words = lower.split_whitespace();
        let days = relative_days(words.next()?)?;

        let rest: Vec<&str> = words.filter(|w| *w != "la" && *w != "ora").collect();
        let time = match rest.as_slice() {
            [] => NaiveTime::MIN,
            [t] => parse_time(t)?,
            _ => return None,
        };

        let today = now.with_timezone(&self.offset).date_naive();
        let day = today.checked_add_signed(Duration::days(days))?;
        self.from_local(day.and_time(time))
    }

    fn from_local(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Parse `HH:MM`, `HH:MM:SS`, `HH.MM` or a bare hour.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    let text = text.strip_prefix("ora").unwrap_or(text).trim();

    for fmt in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(text, fmt) {
            return Some(time);
        }
    }
    text.parse::<u32>()
        .ok()
        .and_then(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
}

fn relative_days(word: &str) -> Option<i64> {
    match fold_diacritics(word).as_str() {
        "azi" | "astazi" => Some(0),
        "maine" => Some(1),
        "poimaine" => Some(2),
        _ => None,
    }
}

fn fold_diacritics(word: &str) -> String {
    word.chars()
        .map(|c| match c {
            'ă' | 'â' => 'a',
            'î' => 'i',
            'ș' | 'ş' => 's',
            'ț' | 'ţ' => 't',
            other => other,
        })
        .collect()
}
