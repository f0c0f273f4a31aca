//! Core data models used throughout the harness.
//!
//! These types represent the records, candidates, and todos that flow
//! through the sync pipeline: adapters produce [`NormalizedRecord`]s, the
//! classifier turns them into [`IntegratedItem`]s, and the materializer
//! persists the ones the user keeps as [`TodoRecord`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which classification rules apply to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A Quip document.
    Document,
    /// A Slack channel message.
    Message,
    /// A Mail.app message.
    Email,
    /// A Chorus meeting whose insights could not be loaded.
    Meeting,
    /// An action item from Chorus meeting insights.
    MeetingAction,
    /// A follow-up from Chorus meeting insights.
    MeetingFollowUp,
    /// An upcoming Calendar.app event.
    CalendarEvent,
}

/// Item produced by an adapter before classification.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// Identifier, unique within the producing adapter.
    pub id: String,
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// Deep link back to the item in its service.
    pub url: String,
    pub kind: RecordKind,
    pub source_specific: BTreeMap<String, String>,
}

impl NormalizedRecord {
    pub fn new(kind: RecordKind, id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            body: String::new(),
            timestamp,
            url: String::new(),
            kind,
            source_specific: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.source_specific.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.source_specific.get(key).map(String::as_str)
    }
}

/// Priority inferred for an [`IntegratedItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemPriority {
    Low,
    Medium,
    High,
}

/// An actionable candidate surfaced to the user for review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegratedItem {
    /// Globally unique id, namespaced by source (`"slack:C01:1700000000.0001"`).
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: ItemPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub url: String,
    /// Human-readable source label (`"Slack Message"`).
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Todo priority as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl From<ItemPriority> for Priority {
    fn from(p: ItemPriority) -> Self {
        match p {
            ItemPriority::High => Priority::High,
            ItemPriority::Medium => Priority::Medium,
            ItemPriority::Low => Priority::Low,
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => bail!("Unknown priority: '{}'. Must be low, medium, or high.", other),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a todo came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Quip,
    Slack,
    Chorus,
    Mail,
    Calendar,
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Quip => "quip",
            SourceType::Slack => "slack",
            SourceType::Chorus => "chorus",
            SourceType::Mail => "mail",
            SourceType::Calendar => "calendar",
            SourceType::Manual => "manual",
        }
    }
}

impl FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "quip" => Ok(SourceType::Quip),
            "slack" => Ok(SourceType::Slack),
            "chorus" => Ok(SourceType::Chorus),
            "mail" => Ok(SourceType::Mail),
            "calendar" => Ok(SourceType::Calendar),
            "manual" => Ok(SourceType::Manual),
            other => bail!("Unknown source type: '{}'", other),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted todo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: Uuid,
    pub title: String,
    pub is_completed: bool,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_type: Option<SourceType>,
    pub source_url: Option<String>,
    pub source_id: Option<String>,
}

impl TodoRecord {
    /// A fresh manual todo stamped with `now`.
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            is_completed: false,
            priority: Priority::Medium,
            due_date: None,
            notes: String::new(),
            created_at: now,
            updated_at: now,
            source_type: Some(SourceType::Manual),
            source_url: None,
            source_id: None,
        }
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) {
        self.is_completed = !self.is_completed;
        self.updated_at = now;
    }

    pub fn set_title(&mut self, title: impl Into<String>, now: DateTime<Utc>) {
        self.title = title.into();
        self.updated_at = now;
    }

    pub fn set_priority(&mut self, priority: Priority, now: DateTime<Utc>) {
        self.priority = priority;
        self.updated_at = now;
    }

    pub fn set_due_date(&mut self, due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.due_date = due_date;
        self.updated_at = now;
    }

    pub fn set_notes(&mut self, notes: impl Into<String>, now: DateTime<Utc>) {
        self.notes = notes.into();
        self.updated_at = now;
    }

    /// True if this todo was materialized from the given source item.
    pub fn is_from(&self, source_type: SourceType, source_id: &str) -> bool {
        self.source_type == Some(source_type) && self.source_id.as_deref() == Some(source_id)
    }
}
