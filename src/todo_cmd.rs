//! Todo list commands: `list`, `add`, `edit`, `toggle`, `rm`,
//! `clear-completed`, `complete-all`, `calendar-export`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::adapter_calendar::{AppleScriptCalendar, CalendarAdapter};
use crate::config::Config;
use crate::credentials::FileCredentialStore;
use crate::models::{Priority, TodoRecord};
use crate::store::{counts, filter_todos, SqliteTodoStore, TodoFilter, TodoStore};
use crate::traits::Adapter;

/// Resolve a full UUID or a unique prefix of one.
async fn resolve_id(store: &SqliteTodoStore, id: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }
    let matches: Vec<Uuid> = store
        .all()
        .await?
        .into_iter()
        .map(|t| t.id)
        .filter(|u| u.to_string().starts_with(id))
        .collect();
    match matches.as_slice() {
        [one] => Ok(*one),
        [] => bail!("No todo matches '{}'", id),
        _ => bail!("'{}' is ambiguous ({} todos match)", id, matches.len()),
    }
}

/// `YYYY-MM-DD` at midnight UTC. `none` clears the date.
fn parse_due(value: &str) -> Result<Option<DateTime<Utc>>> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid due date '{}', expected YYYY-MM-DD", value))?;
    Ok(date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()))
}

fn print_todo(todo: &TodoRecord) {
    let check = if todo.is_completed { "x" } else { " " };
    let short = todo.id.to_string();
    let due = todo
        .due_date
        .map(|d| format!("  due {}", d.format("%Y-%m-%d")))
        .unwrap_or_default();
    let source = todo
        .source_type
        .map(|s| format!("  [{}]", s))
        .unwrap_or_default();
    println!(
        "[{}] {}  {:<6} {}{}{}",
        check,
        &short[..8],
        todo.priority.as_str(),
        todo.title,
        due,
        source
    );
}

pub async fn run_list(config: &Config, filter: &str, json: bool) -> Result<()> {
    let filter: TodoFilter = filter.parse()?;
    let store = SqliteTodoStore::open(config).await?;
    let all = store.all().await?;
    store.close().await;

    let (active, completed) = counts(&all);
    let todos = filter_todos(all, filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&todos)?);
        return Ok(());
    }
    for todo in &todos {
        print_todo(todo);
    }
    println!();
    println!("{} active, {} completed", active, completed);
    Ok(())
}

pub async fn run_add(
    config: &Config,
    title: &str,
    priority: Option<String>,
    due: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("Title must not be empty");
    }
    let now = Utc::now();
    let mut todo = TodoRecord::new(title.trim(), now);
    if let Some(p) = priority {
        todo.priority = p.parse::<Priority>()?;
    }
    if let Some(d) = due {
        todo.due_date = parse_due(&d)?;
    }
    if let Some(n) = notes {
        todo.notes = n;
    }

    let store = SqliteTodoStore::open(config).await?;
    store.add(&todo).await?;
    store.close().await;
    print_todo(&todo);
    Ok(())
}

/// Field changes for `td edit`. `None` leaves a field as it is.
#[derive(Debug, Default, Clone)]
pub struct TodoEdit {
    pub title: Option<String>,
    pub priority: Option<String>,
    pub due: Option<String>,
    pub notes: Option<String>,
}

impl TodoEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.priority.is_none()
            && self.due.is_none()
            && self.notes.is_none()
    }
}

/// Apply `edit` to the stored todo in place. Completion and source
/// linkage are kept.
pub async fn edit_todo(
    store: &dyn TodoStore,
    id: Uuid,
    edit: &TodoEdit,
    now: DateTime<Utc>,
) -> Result<TodoRecord> {
    let mut todo = store
        .get(id)
        .await?
        .with_context(|| format!("No todo with id {}", id))?;

    if let Some(title) = &edit.title {
        if title.trim().is_empty() {
            bail!("Title must not be empty");
        }
        todo.set_title(title.trim(), now);
    }
    if let Some(p) = &edit.priority {
        todo.set_priority(p.parse()?, now);
    }
    if let Some(d) = &edit.due {
        todo.set_due_date(parse_due(d)?, now);
    }
    if let Some(n) = &edit.notes {
        todo.set_notes(n.as_str(), now);
    }

    if !store.update(&todo).await? {
        bail!("No todo with id {}", id);
    }
    Ok(todo)
}

pub async fn run_edit(config: &Config, id: &str, edit: TodoEdit) -> Result<()> {
    if edit.is_empty() {
        bail!("Nothing to change. Pass --title, --priority, --due, or --notes.");
    }
    let store = SqliteTodoStore::open(config).await?;
    let uuid = resolve_id(&store, id).await?;
    let result = edit_todo(&store, uuid, &edit, Utc::now()).await;
    store.close().await;
    print_todo(&result?);
    Ok(())
}

pub async fn run_toggle(config: &Config, id: &str) -> Result<()> {
    let store = SqliteTodoStore::open(config).await?;
    let uuid = resolve_id(&store, id).await?;
    let toggled = store.toggle(uuid, Utc::now()).await?;
    store.close().await;
    match toggled {
        Some(todo) => print_todo(&todo),
        None => bail!("No todo with id {}", uuid),
    }
    Ok(())
}

pub async fn run_remove(config: &Config, id: &str) -> Result<()> {
    let store = SqliteTodoStore::open(config).await?;
    let uuid = resolve_id(&store, id).await?;
    let removed = store.delete(uuid).await?;
    store.close().await;
    if !removed {
        bail!("No todo with id {}", uuid);
    }
    println!("removed {}", uuid);
    Ok(())
}

pub async fn run_clear_completed(config: &Config) -> Result<()> {
    let store = SqliteTodoStore::open(config).await?;
    let n = store.clear_completed().await?;
    store.close().await;
    println!("removed {} completed todos", n);
    Ok(())
}

pub async fn run_complete_all(config: &Config) -> Result<()> {
    let store = SqliteTodoStore::open(config).await?;
    let n = store.mark_all_complete(Utc::now()).await?;
    store.close().await;
    println!("completed {} todos", n);
    Ok(())
}

/// Add an event for every open todo with a due date.
pub async fn run_calendar_export(config: &Config) -> Result<()> {
    let credentials = Arc::new(FileCredentialStore::open(&config.credentials.path)?);
    let calendar = CalendarAdapter::new(
        config.adapters.calendar.clone(),
        Arc::new(AppleScriptCalendar::new(config.adapters.calendar.lookahead_days)),
        credentials,
    );
    if calendar.restore().await?.is_none() {
        bail!("Calendar is not connected. Run `td auth calendar` first.");
    }

    let store = SqliteTodoStore::open(config).await?;
    let todos = store.all().await;
    store.close().await;

    let summary = calendar.export_todos(&todos?).await?;
    println!("calendar export");
    println!("  created: {}", summary.created);
    println!("  already present: {}", summary.existing);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use crate::store::MemoryTodoStore;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn edit_changes_only_given_fields() {
        let store = MemoryTodoStore::new();
        let created = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        let mut todo = TodoRecord::new("Review deck", created);
        todo.source_type = Some(SourceType::Slack);
        todo.source_id = Some("slack:C01:1.0".to_string());
        todo.toggle(created);
        store.add(&todo).await.unwrap();

        let later = created + Duration::hours(3);
        let edit = TodoEdit {
            title: Some("  Review final deck ".to_string()),
            priority: Some("high".to_string()),
            due: Some("2026-10-20".to_string()),
            notes: None,
        };
        let edited = edit_todo(&store, todo.id, &edit, later).await.unwrap();

        assert_eq!(edited.title, "Review final deck");
        assert_eq!(edited.priority, Priority::High);
        assert_eq!(
            edited.due_date,
            Some(Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap())
        );
        assert_eq!(edited.updated_at, later);
        assert_eq!(edited.created_at, created);
        assert!(edited.is_completed);
        assert!(edited.is_from(SourceType::Slack, "slack:C01:1.0"));

        let stored = store.get(todo.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Review final deck");

        let cleared = TodoEdit {
            due: Some("none".to_string()),
            ..Default::default()
        };
        let edited = edit_todo(&store, todo.id, &cleared, later).await.unwrap();
        assert_eq!(edited.due_date, None);
        assert_eq!(edited.title, "Review final deck");
    }

    #[tokio::test]
    async fn edit_rejects_bad_input() {
        let store = MemoryTodoStore::new();
        let todo = TodoRecord::new("a", Utc::now());
        store.add(&todo).await.unwrap();

        let blank = TodoEdit {
            title: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(edit_todo(&store, todo.id, &blank, Utc::now()).await.is_err());
        let bad_due = TodoEdit {
            due: Some("next week".to_string()),
            ..Default::default()
        };
        assert!(edit_todo(&store, todo.id, &bad_due, Utc::now()).await.is_err());
        assert!(edit_todo(&store, Uuid::new_v4(), &TodoEdit::default(), Utc::now())
            .await
            .is_err());
        assert_eq!(store.get(todo.id).await.unwrap().unwrap().title, "a");
    }
}
