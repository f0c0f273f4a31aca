//! Turning reviewed candidates into persisted todos.
//!
//! Materialization is a lookup-or-create keyed by `(source_type, source_id)`:
//! committing the same candidate twice updates the todo created the first
//! time instead of adding a second one.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{IntegratedItem, Priority, SourceType, TodoRecord};
use crate::store::TodoStore;

/// Outcome of committing one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Committed {
    Created(TodoRecord),
    Updated(TodoRecord),
}

impl Committed {
    pub fn record(&self) -> &TodoRecord {
        match self {
            Committed::Created(r) | Committed::Updated(r) => r,
        }
    }

    pub fn into_record(self) -> TodoRecord {
        match self {
            Committed::Created(r) | Committed::Updated(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Committed::Created(_))
    }
}

/// Map a source label to its todo source type. Unknown labels are manual.
pub fn source_type_for_label(label: &str) -> SourceType {
    match label {
        "Quip Document" => SourceType::Quip,
        "Slack Message" => SourceType::Slack,
        "Chorus Meeting" | "Chorus Follow-up" => SourceType::Chorus,
        "Mail Message" => SourceType::Mail,
        "Calendar Event" => SourceType::Calendar,
        _ => SourceType::Manual,
    }
}

pub fn notes_for(item: &IntegratedItem) -> String {
    format!("{}: {}\n\nLink: {}", item.source, item.description, item.url)
}

/// Apply `item` on top of the todo it previously produced, if any.
///
/// An existing todo keeps its id, completion state, and creation time; the
/// candidate's fields overwrite the rest.
pub fn apply(item: &IntegratedItem, existing: Option<TodoRecord>, now: DateTime<Utc>) -> Committed {
    let source_type = source_type_for_label(&item.source);
    let priority = Priority::from(item.priority);
    let notes = notes_for(item);

    match existing {
        Some(mut todo) => {
            todo.title = item.title.clone();
            todo.priority = priority;
            todo.due_date = item.due_date;
            todo.notes = notes;
            todo.source_type = Some(source_type);
            todo.source_url = Some(item.url.clone());
            todo.source_id = Some(item.id.clone());
            todo.updated_at = now;
            Committed::Updated(todo)
        }
        None => {
            let mut todo = TodoRecord::new(item.title.clone(), now);
            todo.priority = priority;
            todo.due_date = item.due_date;
            todo.notes = notes;
            todo.source_type = Some(source_type);
            todo.source_url = Some(item.url.clone());
            todo.source_id = Some(item.id.clone());
            Committed::Created(todo)
        }
    }
}

/// Commit `item` into an in-memory todo list.
pub fn commit(item: &IntegratedItem, existing: &mut Vec<TodoRecord>, now: DateTime<Utc>) -> Committed {
    let source_type = source_type_for_label(&item.source);
    match existing.iter().position(|t| t.is_from(source_type, &item.id)) {
        Some(index) => {
            let committed = apply(item, Some(existing[index].clone()), now);
            existing[index] = committed.record().clone();
            committed
        }
        None => {
            let committed = apply(item, None, now);
            existing.push(committed.record().clone());
            committed
        }
    }
}

/// Commit `item` through a persistence collaborator in one transaction.
pub async fn commit_to_store(store: &dyn TodoStore, item: &IntegratedItem) -> Result<Committed> {
    store.upsert_from_source(item, Utc::now()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemPriority;
    use chrono::Duration;

    fn item(id: &str, source: &str) -> IntegratedItem {
        IntegratedItem {
            id: id.to_string(),
            title: "Slack Action: #eng".to_string(),
            description: "todo: rotate the staging keys".to_string(),
            priority: ItemPriority::High,
            due_date: Some(Utc::now() + Duration::days(2)),
            url: "slack://channel?id=C01&message=1.2".to_string(),
            source: source.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn label_table() {
        assert_eq!(source_type_for_label("Slack Message"), SourceType::Slack);
        assert_eq!(source_type_for_label("Quip Document"), SourceType::Quip);
        assert_eq!(source_type_for_label("Chorus Follow-up"), SourceType::Chorus);
        assert_eq!(source_type_for_label("Mail Message"), SourceType::Mail);
        assert_eq!(source_type_for_label("Calendar Event"), SourceType::Calendar);
        assert_eq!(source_type_for_label("Foo Bar"), SourceType::Manual);
        assert_eq!(source_type_for_label("slack message"), SourceType::Manual);
    }

    #[test]
    fn created_todo_carries_provenance() {
        let mut todos = Vec::new();
        let it = item("slack:C01:1.2", "Slack Message");
        let committed = commit(&it, &mut todos, Utc::now());
        assert!(committed.is_created());

        let todo = committed.record();
        assert_eq!(todo.source_type, Some(SourceType::Slack));
        assert_eq!(todo.source_id.as_deref(), Some("slack:C01:1.2"));
        assert_eq!(todo.source_url.as_deref(), Some(it.url.as_str()));
        assert_eq!(todo.priority, Priority::High);
        assert_eq!(todo.due_date, it.due_date);
        assert_eq!(
            todo.notes,
            "Slack Message: todo: rotate the staging keys\n\nLink: slack://channel?id=C01&message=1.2"
        );
    }

    #[test]
    fn committing_twice_yields_one_todo() {
        let mut todos = Vec::new();
        let it = item("slack:C01:1.2", "Slack Message");
        let first = commit(&it, &mut todos, Utc::now()).into_record();

        todos[0].toggle(Utc::now());
        let mut changed = it.clone();
        changed.priority = ItemPriority::Low;
        let second = commit(&changed, &mut todos, Utc::now());

        assert!(!second.is_created());
        assert_eq!(todos.len(), 1);
        let todo = second.record();
        assert_eq!(todo.id, first.id);
        assert!(todo.is_completed, "completion survives re-commit");
        assert_eq!(todo.priority, Priority::Low);
    }

    #[test]
    fn same_title_different_source_is_a_new_todo() {
        let mut todos = vec![TodoRecord::new("Slack Action: #eng", Utc::now())];
        let committed = commit(&item("slack:C01:9.9", "Slack Message"), &mut todos, Utc::now());
        assert!(committed.is_created());
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0].source_id, None);
    }

    #[test]
    fn unknown_label_becomes_manual() {
        let mut todos = Vec::new();
        let committed = commit(&item("foo:1", "Foo Bar"), &mut todos, Utc::now());
        assert_eq!(committed.record().source_type, Some(SourceType::Manual));
    }
}
