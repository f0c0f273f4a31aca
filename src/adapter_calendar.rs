//! Calendar adapter.
//!
//! Lists upcoming events from the local calendar application within a
//! look-ahead window. Like Mail there is no token: authentication probes
//! the application, retrying while an access prompt may be open.
//!
//! The adapter also exports todos with a due date as one-hour events
//! ([`CalendarAdapter::export_todos`]). Exported events carry a
//! `Priority: <level>` line in their notes; on the way back in that level
//! is passed to the classifier as the declared priority.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

use crate::classify::DECLARED_PRIORITY_FIELD;
use crate::config::CalendarConfig;
use crate::credentials::CredentialStore;
use crate::error::{AuthError, FetchError};
use crate::models::{NormalizedRecord, Priority, RecordKind, SourceType, TodoRecord};
use crate::osascript;
use crate::traits::{Adapter, AdapterCore, AdapterState, AuthState};

pub const SLOT: &str = "calendar_enabled";

/// One event as listed by a [`CalendarBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub calendar: String,
    pub notes: String,
}

/// An event to be written to the calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub notes: String,
}

#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Succeeds only if calendar access has been granted.
    async fn probe(&self) -> Result<(), AuthError>;

    /// Events starting between now and the end of the look-ahead window.
    async fn upcoming_events(&self) -> Result<Vec<UpcomingEvent>, FetchError>;

    /// True if an event titled `title` starts on `day` (UTC).
    async fn event_exists(&self, title: &str, day: NaiveDate) -> anyhow::Result<bool>;

    /// Add `event` to the default writable calendar.
    async fn create_event(&self, event: &NewEvent) -> anyhow::Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// AppleScript backend
// ═══════════════════════════════════════════════════════════════════════

pub struct AppleScriptCalendar {
    lookahead_days: i64,
}

impl AppleScriptCalendar {
    pub fn new(lookahead_days: i64) -> Self {
        Self { lookahead_days }
    }

    fn listing_script(&self) -> String {
        format!(
            r#"{separators}set nowDate to current date
set horizon to nowDate + ({days} * days)
set output to ""
tell application "Calendar"
    repeat with aCalendar in calendars
        try
            set upcoming to (every event of aCalendar whose start date is greater than or equal to nowDate and start date is less than horizon)
            repeat with anEvent in upcoming
                try
                    set offsetSecs to ((start date of anEvent) - nowDate) as integer
                    set eventNotes to description of anEvent
                    if eventNotes is missing value then set eventNotes to ""
                    set output to output & (uid of anEvent) & fs & (summary of anEvent) & fs & offsetSecs & fs & (name of aCalendar) & fs & eventNotes & rs
                end try
            end repeat
        end try
    end repeat
end tell
return output"#,
            separators = osascript::SEPARATORS,
            days = self.lookahead_days
        )
    }
}

/// AppleScript string literal.
fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// AppleScript expression for `at`, relative to the script's `current date`.
fn relative_date(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!("((current date) + ({}))", (at - now).num_seconds())
}

#[async_trait]
impl CalendarBackend for AppleScriptCalendar {
    async fn probe(&self) -> Result<(), AuthError> {
        osascript::run(r#"tell application "Calendar" to get name of calendars"#)
            .await
            .map(|_| ())
            .map_err(|e| AuthError::Unavailable(e.into_message()))
    }

    async fn upcoming_events(&self) -> Result<Vec<UpcomingEvent>, FetchError> {
        let output = osascript::run(&self.listing_script())
            .await
            .map_err(|e| FetchError::Service(e.into_message()))?;
        let (events, bad) = parse_listing(&output, Utc::now());
        if bad > 0 {
            tracing::warn!(records = bad, "skipping unreadable calendar records");
        }
        Ok(events)
    }

    async fn event_exists(&self, title: &str, day: NaiveDate) -> anyhow::Result<bool> {
        let day_start = day.and_time(NaiveTime::MIN).and_utc();
        let script = format!(
            r#"set dayStart to {start}
set dayEnd to dayStart + (1 * days)
set found to 0
tell application "Calendar"
    repeat with aCalendar in calendars
        try
            set found to found + (count of (every event of aCalendar whose summary is {title} and start date is greater than or equal to dayStart and start date is less than dayEnd))
        end try
    end repeat
end tell
return found"#,
            start = relative_date(day_start, Utc::now()),
            title = quoted(title),
        );
        let output = osascript::run(&script)
            .await
            .map_err(|e| anyhow::anyhow!(e.into_message()))?;
        let found: u64 = output
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("unexpected calendar output: {}", output.trim()))?;
        Ok(found > 0)
    }

    async fn create_event(&self, event: &NewEvent) -> anyhow::Result<()> {
        let now = Utc::now();
        let script = format!(
            r#"tell application "Calendar"
    tell (first calendar whose writable is true)
        make new event at end with properties {{summary:{title}, start date:{start}, end date:{end}, description:{notes}}}
    end tell
end tell"#,
            title = quoted(&event.title),
            start = relative_date(event.start, now),
            end = relative_date(event.end, now),
            notes = quoted(&event.notes),
        );
        osascript::run(&script)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!(e.into_message()))
    }
}

/// Parse the script output: fields uid, summary, seconds from now to the
/// start, calendar name, notes.
pub fn parse_listing(output: &str, now: DateTime<Utc>) -> (Vec<UpcomingEvent>, usize) {
    let (records, mut bad) = osascript::split_records(output, 5);
    let mut events = Vec::new();
    for fields in records {
        let [id, title, offset, calendar, notes] = fields[..] else {
            bad += 1;
            continue;
        };
        match offset.trim().parse::<i64>() {
            Ok(secs) => events.push(UpcomingEvent {
                id: id.trim().to_string(),
                title: title.trim().to_string(),
                start: now + Duration::seconds(secs),
                calendar: calendar.to_string(),
                notes: notes.trim().to_string(),
            }),
            Err(_) => bad += 1,
        }
    }
    (events, bad)
}

/// `high` or `low` from a `Priority: <level>` line in event notes.
fn declared_priority(notes: &str) -> Option<&'static str> {
    let lower = notes.to_lowercase();
    if lower.contains("priority: high") {
        Some("high")
    } else if lower.contains("priority: low") {
        Some("low")
    } else {
        None
    }
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "Low",
        Priority::Medium => "Medium",
        Priority::High => "High",
    }
}

/// The event a todo exports to, or `None` when it has no due date.
///
/// A due date at midnight means "no time given" and starts at 09:00.
/// Events last one hour.
pub fn event_for_todo(todo: &TodoRecord) -> Option<NewEvent> {
    let due = todo.due_date?;
    let start = if due.hour() == 0 && due.minute() == 0 {
        due.date_naive()
            .and_hms_opt(9, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(due)
    } else {
        due
    };

    let mut notes = todo.notes.clone();
    if !notes.is_empty() {
        notes.push_str("\n\n");
    }
    notes.push_str("Priority: ");
    notes.push_str(priority_label(todo.priority));

    Some(NewEvent {
        title: todo.title.clone(),
        start,
        end: start + Duration::hours(1),
        notes,
    })
}

/// Result of [`CalendarAdapter::export_todos`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub created: usize,
    /// Todos whose event was already on the calendar.
    pub existing: usize,
}

fn to_record(event: UpcomingEvent) -> NormalizedRecord {
    let url = format!("ical://ekevent/{}?method=show&options=more", event.id);
    let title = if event.title.is_empty() {
        "Untitled Event".to_string()
    } else {
        event.title
    };
    let declared = declared_priority(&event.notes);

    let mut record = NormalizedRecord::new(RecordKind::CalendarEvent, event.id, event.start)
        .with_title(title)
        .with_body(event.notes)
        .with_url(url)
        .with_field("calendar", event.calendar);
    if let Some(level) = declared {
        record = record.with_field(DECLARED_PRIORITY_FIELD, level);
    }
    record
}

// ═══════════════════════════════════════════════════════════════════════
// Adapter
// ═══════════════════════════════════════════════════════════════════════

pub struct CalendarAdapter {
    config: CalendarConfig,
    backend: Arc<dyn CalendarBackend>,
    core: AdapterCore<()>,
}

impl CalendarAdapter {
    pub fn new(
        config: CalendarConfig,
        backend: Arc<dyn CalendarBackend>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config,
            backend,
            core: AdapterCore::new(SLOT, credentials),
        }
    }

    /// Write an event for every open todo with a due date, skipping todos
    /// whose title already has an event that day.
    pub async fn export_todos(&self, todos: &[TodoRecord]) -> anyhow::Result<ExportSummary> {
        if self.core.session().await.is_none() {
            anyhow::bail!("Calendar is not connected. Run `td auth calendar` first.");
        }

        let mut summary = ExportSummary::default();
        for todo in todos.iter().filter(|t| !t.is_completed) {
            let Some(event) = event_for_todo(todo) else {
                continue;
            };
            if self
                .backend
                .event_exists(&event.title, event.start.date_naive())
                .await?
            {
                summary.existing += 1;
                continue;
            }
            self.backend.create_event(&event).await?;
            tracing::debug!(todo = %todo.id, "calendar event created");
            summary.created += 1;
        }

        self.core
            .set_status(&format!(
                "Exported {} todos to calendar",
                summary.created + summary.existing
            ))
            .await;
        Ok(summary)
    }
}

#[async_trait]
impl Adapter for CalendarAdapter {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Upcoming calendar events that carry work"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Calendar
    }

    fn credential_slot(&self) -> &str {
        self.core.slot()
    }

    fn record_kind(&self) -> RecordKind {
        RecordKind::CalendarEvent
    }

    fn needs_credential(&self) -> bool {
        false
    }

    async fn authenticate(&self, _credential: &str) -> Result<AuthState, AuthError> {
        self.core.connecting("Checking calendar access...").await;
        let probed = osascript::probe_with_retries(
            "calendar",
            self.config.probe_attempts,
            self.config.probe_delay_ms,
            || self.backend.probe(),
        )
        .await;
        match probed {
            Ok(()) => {
                self.core
                    .establish((), "true", "Calendar access granted")
                    .await?;
                tracing::info!("calendar connected");
                Ok(AuthState::default())
            }
            Err(e) => {
                self.core.auth_failed(&e).await;
                Err(e)
            }
        }
    }

    async fn restore(&self) -> Result<Option<AuthState>, AuthError> {
        match self.core.stored_credential()? {
            Some(marker) => self.authenticate(&marker).await.map(Some),
            None => Ok(None),
        }
    }

    async fn logout(&self) -> anyhow::Result<()> {
        self.core.clear().await
    }

    async fn fetch(&self) -> Result<Vec<NormalizedRecord>, FetchError> {
        self.core.session().await.ok_or(FetchError::NotAuthenticated)?;
        self.core.set_status("Loading events...").await;

        match self.backend.upcoming_events().await {
            Ok(events) => {
                let records: Vec<NormalizedRecord> = events.into_iter().map(to_record).collect();
                self.core.fetch_succeeded(records.len(), 0).await;
                Ok(records)
            }
            Err(e) => {
                self.core.fetch_failed(&e).await;
                Err(e)
            }
        }
    }

    async fn state(&self) -> AdapterState {
        self.core.state().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osascript::{FIELD_SEP, RECORD_SEP};
    use chrono::TimeZone;

    #[test]
    fn listing_resolves_start_offsets() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap();
        let output = format!(
            "EV-1{f}Launch review{f}7200{f}Work{f}Priority: high{r}EV-2{f}Lunch{f}soon{f}Home{f}{r}",
            f = FIELD_SEP,
            r = RECORD_SEP
        );
        let (events, bad) = parse_listing(&output, now);
        assert_eq!(bad, 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, now + Duration::hours(2));
        assert_eq!(events[0].calendar, "Work");
    }

    #[test]
    fn notes_priority_becomes_declared_field() {
        let event = UpcomingEvent {
            id: "EV-1".into(),
            title: String::new(),
            start: Utc::now(),
            calendar: "Work".into(),
            notes: "Agenda attached\n\nPriority: Low".into(),
        };
        let record = to_record(event);
        assert_eq!(record.title, "Untitled Event");
        assert_eq!(record.field(DECLARED_PRIORITY_FIELD), Some("low"));
        assert_eq!(record.url, "ical://ekevent/EV-1?method=show&options=more");
        assert_eq!(declared_priority("no marker"), None);
    }

    #[test]
    fn todo_exports_to_one_hour_event() {
        let created = Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap();
        let mut todo = TodoRecord::new("Send contract", created);
        assert!(event_for_todo(&todo).is_none());

        todo.due_date = Some(Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap());
        todo.priority = Priority::High;
        let event = event_for_todo(&todo).unwrap();
        assert_eq!(event.start, Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap());
        assert_eq!(event.end - event.start, Duration::hours(1));
        assert_eq!(event.notes, "Priority: High");

        todo.due_date = Some(Utc.with_ymd_and_hms(2026, 10, 16, 14, 30, 0).unwrap());
        todo.notes = "Legal has the draft".to_string();
        let event = event_for_todo(&todo).unwrap();
        assert_eq!(event.start.hour(), 14);
        assert_eq!(event.notes, "Legal has the draft\n\nPriority: High");
        assert_eq!(declared_priority(&event.notes), Some("high"));
    }

    #[test]
    fn applescript_strings_are_escaped() {
        assert_eq!(quoted(r#"say "hi" \ bye"#), r#""say \"hi\" \\ bye""#);
    }
}
