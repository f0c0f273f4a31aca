//! Actionability classification.
//!
//! [`classify`] maps a [`NormalizedRecord`] to an [`IntegratedItem`] or
//! drops it. The function is pure given its `now` argument: the same record,
//! profile, and reference time always give the same result.
//!
//! Rules differ per record kind (keyword sets, title prefixes, fallback due
//! offsets) and live in [`SourceRules`].

use chrono::{DateTime, Duration, Utc};

use crate::due_date::extract_due_date;
use crate::models::{IntegratedItem, ItemPriority, NormalizedRecord, RecordKind};
use crate::profile::{MentionStyle, UserProfile};

/// Words that make an item urgent. Urgent items are always actionable.
pub const URGENCY_KEYWORDS: &[&str] = &["urgent", "asap", "immediately", "today", "tomorrow"];

const DOCUMENT_KEYWORDS: &[&str] = &["todo", "action", "task", "review", "deadline"];

const CHAT_KEYWORDS: &[&str] = &[
    "todo",
    "task",
    "action",
    "follow up",
    "follow-up",
    "reminder",
    "@channel",
    "deadline",
];

const MAIL_KEYWORDS: &[&str] = &[
    "action item",
    "todo",
    "task",
    "please",
    "can you",
    "need you to",
    "follow up",
    "follow-up",
    "reminder",
    "deadline",
    "due by",
    "complete by",
    "review",
    "check",
    "verify",
    "update",
    "finish",
    "deliver",
];

const MEETING_KEYWORDS: &[&str] = &[
    "action",
    "follow up",
    "follow-up",
    "todo",
    "next steps",
    "review",
    "deadline",
];

/// Events written by the todo-to-calendar export carry `Priority: …` in
/// their notes, so that marker alone makes an event actionable.
const CALENDAR_KEYWORDS: &[&str] = &[
    "priority:",
    "todo",
    "action",
    "task",
    "deadline",
    "due",
    "prepare",
    "review",
    "follow up",
    "follow-up",
    "reminder",
];

/// How a kind builds the candidate description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionStyle {
    Body,
    /// Body cut to this many characters, with `...` appended when cut.
    Truncated(usize),
    Fixed(&'static str),
}

/// Where the fallback due offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueAnchor {
    Now,
    RecordTimestamp,
}

/// Classification rules for one record kind.
#[derive(Debug, Clone, Copy)]
pub struct SourceRules {
    /// Id namespace, also the prefix of [`IntegratedItem::id`].
    pub namespace: &'static str,
    /// Human-readable source label carried on the item.
    pub label: &'static str,
    pub action_keywords: &'static [&'static str],
    pub mention: MentionStyle,
    pub mention_prefix: &'static str,
    pub action_prefix: &'static str,
    pub mention_due_days: i64,
    pub action_due_days: i64,
    pub due_anchor: DueAnchor,
    pub description: DescriptionStyle,
    /// Whether a declared `low` priority lowers a plain actionable item.
    pub declared_low: bool,
}

impl SourceRules {
    pub fn for_kind(kind: RecordKind) -> &'static SourceRules {
        match kind {
            RecordKind::Document => &DOCUMENT_RULES,
            RecordKind::Message => &CHAT_RULES,
            RecordKind::Email => &MAIL_RULES,
            RecordKind::Meeting => &MEETING_RULES,
            RecordKind::MeetingAction => &MEETING_ACTION_RULES,
            RecordKind::MeetingFollowUp => &MEETING_FOLLOW_UP_RULES,
            RecordKind::CalendarEvent => &CALENDAR_RULES,
        }
    }
}

static DOCUMENT_RULES: SourceRules = SourceRules {
    namespace: "quip",
    label: "Quip Document",
    action_keywords: DOCUMENT_KEYWORDS,
    mention: MentionStyle::None,
    mention_prefix: "Quip",
    action_prefix: "Quip",
    mention_due_days: 7,
    action_due_days: 7,
    due_anchor: DueAnchor::Now,
    description: DescriptionStyle::Fixed("Review document and complete actions"),
    declared_low: false,
};

static CHAT_RULES: SourceRules = SourceRules {
    namespace: "slack",
    label: "Slack Message",
    action_keywords: CHAT_KEYWORDS,
    mention: MentionStyle::Chat,
    mention_prefix: "💬 You were mentioned",
    action_prefix: "Slack Action",
    mention_due_days: 1,
    action_due_days: 2,
    due_anchor: DueAnchor::Now,
    description: DescriptionStyle::Body,
    declared_low: false,
};

static MAIL_RULES: SourceRules = SourceRules {
    namespace: "mail",
    label: "Mail Message",
    action_keywords: MAIL_KEYWORDS,
    mention: MentionStyle::Mail,
    mention_prefix: "📧 You were mentioned",
    action_prefix: "Mail Action",
    mention_due_days: 2,
    action_due_days: 3,
    due_anchor: DueAnchor::Now,
    description: DescriptionStyle::Truncated(200),
    declared_low: false,
};

static MEETING_RULES: SourceRules = SourceRules {
    namespace: "chorus",
    label: "Chorus Meeting",
    action_keywords: MEETING_KEYWORDS,
    mention: MentionStyle::None,
    mention_prefix: "Chorus",
    action_prefix: "Chorus",
    mention_due_days: 3,
    action_due_days: 3,
    due_anchor: DueAnchor::RecordTimestamp,
    description: DescriptionStyle::Body,
    declared_low: false,
};

static MEETING_ACTION_RULES: SourceRules = SourceRules {
    namespace: "chorus",
    label: "Chorus Meeting",
    action_keywords: MEETING_KEYWORDS,
    mention: MentionStyle::None,
    mention_prefix: "Chorus",
    action_prefix: "Chorus",
    mention_due_days: 3,
    action_due_days: 3,
    due_anchor: DueAnchor::RecordTimestamp,
    description: DescriptionStyle::Body,
    declared_low: false,
};

static MEETING_FOLLOW_UP_RULES: SourceRules = SourceRules {
    namespace: "chorus",
    label: "Chorus Follow-up",
    action_keywords: MEETING_KEYWORDS,
    mention: MentionStyle::None,
    mention_prefix: "Chorus",
    action_prefix: "Chorus",
    mention_due_days: 7,
    action_due_days: 7,
    due_anchor: DueAnchor::RecordTimestamp,
    description: DescriptionStyle::Body,
    declared_low: false,
};

static CALENDAR_RULES: SourceRules = SourceRules {
    namespace: "calendar",
    label: "Calendar Event",
    action_keywords: CALENDAR_KEYWORDS,
    mention: MentionStyle::None,
    mention_prefix: "Calendar",
    action_prefix: "Calendar",
    mention_due_days: 0,
    action_due_days: 0,
    due_anchor: DueAnchor::RecordTimestamp,
    description: DescriptionStyle::Body,
    declared_low: true,
};

/// Source-specific key carrying a priority declared by the service itself.
pub const DECLARED_PRIORITY_FIELD: &str = "priority";

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|k| haystack.contains(k))
}

/// Decide whether `record` is actionable and, if so, build the candidate.
pub fn classify(
    record: &NormalizedRecord,
    profile: &UserProfile,
    now: DateTime<Utc>,
) -> Option<IntegratedItem> {
    let rules = SourceRules::for_kind(record.kind);
    let text = format!("{} {}", record.title, record.body);
    let lower = text.to_lowercase();

    let has_urgency = contains_any(&lower, URGENCY_KEYWORDS);
    let has_actionable_content = has_urgency || contains_any(&lower, rules.action_keywords);
    let is_mentioned = rules.mention.matches(&text, profile);

    if !has_actionable_content && !is_mentioned {
        return None;
    }

    let declared = record.field(DECLARED_PRIORITY_FIELD);
    let declared_high = declared.is_some_and(|p| p.eq_ignore_ascii_case("high"));
    let declared_low =
        rules.declared_low && declared.is_some_and(|p| p.eq_ignore_ascii_case("low"));

    let priority = if has_urgency || is_mentioned || declared_high {
        ItemPriority::High
    } else if declared_low {
        ItemPriority::Low
    } else if has_actionable_content {
        ItemPriority::Medium
    } else {
        ItemPriority::Low
    };

    let due_date = extract_due_date(&record.body, now).or_else(|| {
        let anchor = match rules.due_anchor {
            DueAnchor::Now => now,
            DueAnchor::RecordTimestamp => record.timestamp,
        };
        let days = if is_mentioned {
            rules.mention_due_days
        } else {
            rules.action_due_days
        };
        anchor.checked_add_signed(Duration::days(days))
    });

    let prefix = if is_mentioned {
        rules.mention_prefix
    } else {
        rules.action_prefix
    };

    Some(IntegratedItem {
        id: format!("{}:{}", rules.namespace, record.id),
        title: format!("{}: {}", prefix, record.title),
        description: describe(rules.description, &record.body),
        priority,
        due_date,
        url: record.url.clone(),
        source: rules.label.to_string(),
        created_at: record.timestamp,
    })
}

/// Classify a batch, keeping input order and dropping non-actionable records.
pub fn classify_all(
    records: &[NormalizedRecord],
    profile: &UserProfile,
    now: DateTime<Utc>,
) -> Vec<IntegratedItem> {
    records
        .iter()
        .filter_map(|r| classify(r, profile, now))
        .collect()
}

fn describe(style: DescriptionStyle, body: &str) -> String {
    match style {
        DescriptionStyle::Body => body.to_string(),
        DescriptionStyle::Fixed(text) => text.to_string(),
        DescriptionStyle::Truncated(limit) => {
            if body.chars().count() > limit {
                let cut: String = body.chars().take(limit).collect();
                format!("{}...", cut)
            } else {
                body.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Weekday};

    // Wednesday
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 15, 30, 0).unwrap()
    }

    fn profile() -> UserProfile {
        UserProfile {
            user_name: "jdoe".to_string(),
            display_name: "Jane Doe".to_string(),
            email_addresses: vec!["jane@company.com".to_string()],
            platform_user_id: "U024BE7LH".to_string(),
        }
    }

    fn mail(title: &str, body: &str) -> NormalizedRecord {
        NormalizedRecord::new(RecordKind::Email, "msg-1", now() - Duration::hours(1))
            .with_title(title)
            .with_body(body)
            .with_url("message://msg-1")
    }

    fn slack(text: &str) -> NormalizedRecord {
        NormalizedRecord::new(RecordKind::Message, "C01:1700000000.000100", now())
            .with_title("#general")
            .with_body(text)
            .with_url("slack://channel?id=C01&message=1700000000.000100")
            .with_field("channel", "general")
    }

    #[test]
    fn nothing_actionable_is_dropped() {
        assert!(classify(&slack("lunch is here"), &profile(), now()).is_none());
        assert!(classify(&mail("Newsletter", "Our monthly digest"), &profile(), now()).is_none());
    }

    #[test]
    fn urgency_always_means_high() {
        for word in URGENCY_KEYWORDS {
            let record = slack(&format!("deploy {} please", word));
            let item = classify(&record, &UserProfile::default(), now()).unwrap();
            assert_eq!(item.priority, ItemPriority::High, "keyword {}", word);
        }
    }

    #[test]
    fn follow_up_mail_with_weekday_is_medium_and_dated() {
        let record = mail(
            "Meeting Follow-up",
            "please complete the analysis by Tuesday",
        );
        let item = classify(&record, &UserProfile::default(), now()).unwrap();
        assert_eq!(item.priority, ItemPriority::Medium);
        let due = item.due_date.unwrap();
        assert_eq!(due.weekday(), Weekday::Tue);
        assert_eq!(due.date_naive().to_string(), "2026-10-20");
        assert_eq!(item.title, "Mail Action: Meeting Follow-up");
        assert_eq!(item.source, "Mail Message");
        assert_eq!(item.id, "mail:msg-1");
    }

    #[test]
    fn display_name_mention_without_keywords_is_high() {
        let record = slack("Jane Doe, lunch at noon?");
        let item = classify(&record, &profile(), now()).unwrap();
        assert_eq!(item.priority, ItemPriority::High);
        assert_eq!(item.title, "💬 You were mentioned: #general");
        assert_eq!(item.due_date, Some(now() + Duration::days(1)));
    }

    #[test]
    fn fallback_offsets_depend_on_mention() {
        let item = classify(&slack("todo: rotate keys"), &profile(), now()).unwrap();
        assert_eq!(item.due_date, Some(now() + Duration::days(2)));
        assert_eq!(item.title, "Slack Action: #general");

        let item = classify(&mail("Status", "please check the logs"), &profile(), now()).unwrap();
        assert_eq!(item.due_date, Some(now() + Duration::days(3)));

        let item = classify(&mail("Status", "jane@company.com ping"), &profile(), now()).unwrap();
        assert_eq!(item.due_date, Some(now() + Duration::days(2)));
        assert!(item.title.starts_with("📧 You were mentioned"));
    }

    #[test]
    fn mail_description_is_truncated() {
        let body = format!("please review {}", "x".repeat(300));
        let item = classify(&mail("Long", &body), &profile(), now()).unwrap();
        assert_eq!(item.description.chars().count(), 203);
        assert!(item.description.ends_with("..."));
    }

    #[test]
    fn meeting_items_anchor_on_meeting_start() {
        let start = now() - Duration::days(10);
        let record = NormalizedRecord::new(RecordKind::MeetingAction, "m1_a1", start)
            .with_title("Send pricing deck")
            .with_body("Action from meeting: QBR\nAssigned to: Jane")
            .with_field(DECLARED_PRIORITY_FIELD, "high");
        let item = classify(&record, &profile(), now()).unwrap();
        assert_eq!(item.priority, ItemPriority::High);
        assert_eq!(item.due_date, Some(start + Duration::days(3)));
        assert_eq!(item.id, "chorus:m1_a1");
        assert_eq!(item.source, "Chorus Meeting");

        let record = NormalizedRecord::new(RecordKind::MeetingFollowUp, "m1_followup_f1", start)
            .with_title("Follow up - Legal review")
            .with_body("Follow up from meeting: QBR\nconfirm terms");
        let item = classify(&record, &profile(), now()).unwrap();
        assert_eq!(item.priority, ItemPriority::Medium);
        assert_eq!(item.due_date, Some(start + Duration::days(7)));
        assert_eq!(item.source, "Chorus Follow-up");
    }

    #[test]
    fn documents_use_fixed_description() {
        let record = NormalizedRecord::new(RecordKind::Document, "AbCdEf", now())
            .with_title("Q3 launch TODO list")
            .with_url("https://quip.com/AbCdEf");
        let item = classify(&record, &profile(), now()).unwrap();
        assert_eq!(item.title, "Quip: Q3 launch TODO list");
        assert_eq!(item.description, "Review document and complete actions");
        assert_eq!(item.priority, ItemPriority::Medium);
    }

    #[test]
    fn calendar_events_fall_due_at_start() {
        let start = now() + Duration::days(2);
        let record = NormalizedRecord::new(RecordKind::CalendarEvent, "EV-1", start)
            .with_title("Launch review")
            .with_body("Priority: low")
            .with_field(DECLARED_PRIORITY_FIELD, "low");
        let item = classify(&record, &profile(), now()).unwrap();
        assert_eq!(item.id, "calendar:EV-1");
        assert_eq!(item.title, "Calendar: Launch review");
        assert_eq!(item.source, "Calendar Event");
        assert_eq!(item.priority, ItemPriority::Low);
        assert_eq!(item.due_date, Some(start));

        let lunch = NormalizedRecord::new(RecordKind::CalendarEvent, "EV-2", start)
            .with_title("Lunch with Jane Doe");
        assert!(classify(&lunch, &profile(), now()).is_none());
    }

    #[test]
    fn declared_low_is_ignored_for_meetings() {
        let record = NormalizedRecord::new(RecordKind::MeetingAction, "m1_a2", now())
            .with_title("Update CRM")
            .with_body("Action from meeting: QBR\nAssigned to: Jane")
            .with_field(DECLARED_PRIORITY_FIELD, "low");
        let item = classify(&record, &profile(), now()).unwrap();
        assert_eq!(item.priority, ItemPriority::Medium);
    }

    #[test]
    fn classification_is_deterministic() {
        let record = slack("<@U024BE7LH> todo by Friday");
        let a = classify(&record, &profile(), now());
        let b = classify(&record, &profile(), now());
        assert_eq!(a, b);
    }
}
