//! Todo persistence.
//!
//! The [`TodoStore`] trait is the single source of truth for todos and for
//! duplicate detection during materialization. Two backends ship with the
//! crate:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteTodoStore`] | the CLI's on-disk store (sqlx, WAL mode) |
//! | [`MemoryTodoStore`] | tests and embedding in other hosts |

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::materialize::{self, Committed};
use crate::migrate;
use crate::models::{IntegratedItem, SourceType, TodoRecord};

/// Abstract todo collection.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn add(&self, todo: &TodoRecord) -> Result<()>;

    /// Replace the stored todo with the same id. Returns false if absent.
    async fn update(&self, todo: &TodoRecord) -> Result<bool>;

    /// Returns false if no todo had this id.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn get(&self, id: Uuid) -> Result<Option<TodoRecord>>;

    async fn all(&self) -> Result<Vec<TodoRecord>>;

    async fn find_by_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<TodoRecord>>;

    /// Lookup-or-create for a candidate, atomically.
    async fn upsert_from_source(&self, item: &IntegratedItem, now: DateTime<Utc>)
        -> Result<Committed>;

    /// Flip completion. Returns the updated todo, or `None` if absent.
    async fn toggle(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<TodoRecord>>;

    /// Remove completed todos, returning how many were removed.
    async fn clear_completed(&self) -> Result<u64>;

    /// Mark every todo complete, returning how many changed.
    async fn mark_all_complete(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TodoFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl std::str::FromStr for TodoFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(TodoFilter::All),
            "active" => Ok(TodoFilter::Active),
            "completed" => Ok(TodoFilter::Completed),
            other => anyhow::bail!(
                "Unknown filter: '{}'. Must be all, active, or completed.",
                other
            ),
        }
    }
}

/// Apply `filter` and order newest first.
pub fn filter_todos(mut todos: Vec<TodoRecord>, filter: TodoFilter) -> Vec<TodoRecord> {
    todos.retain(|t| match filter {
        TodoFilter::All => true,
        TodoFilter::Active => !t.is_completed,
        TodoFilter::Completed => t.is_completed,
    });
    todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    todos
}

/// `(active, completed)` counts.
pub fn counts(todos: &[TodoRecord]) -> (usize, usize) {
    let completed = todos.iter().filter(|t| t.is_completed).count();
    (todos.len() - completed, completed)
}

// ═══════════════════════════════════════════════════════════════════════
// In-memory backend
// ═══════════════════════════════════════════════════════════════════════

/// In-memory store; insertion order is preserved.
#[derive(Default)]
pub struct MemoryTodoStore {
    todos: RwLock<Vec<TodoRecord>>,
}

impl MemoryTodoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TodoStore for MemoryTodoStore {
    async fn add(&self, todo: &TodoRecord) -> Result<()> {
        let mut todos = self.todos.write().await;
        if let (Some(st), Some(sid)) = (todo.source_type, todo.source_id.as_deref()) {
            if todos.iter().any(|t| t.is_from(st, sid)) {
                anyhow::bail!("A todo for {}:{} already exists", st, sid);
            }
        }
        todos.push(todo.clone());
        Ok(())
    }

    async fn update(&self, todo: &TodoRecord) -> Result<bool> {
        let mut todos = self.todos.write().await;
        match todos.iter_mut().find(|t| t.id == todo.id) {
            Some(slot) => {
                *slot = todo.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut todos = self.todos.write().await;
        let before = todos.len();
        todos.retain(|t| t.id != id);
        Ok(todos.len() != before)
    }

    async fn get(&self, id: Uuid) -> Result<Option<TodoRecord>> {
        Ok(self.todos.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn all(&self) -> Result<Vec<TodoRecord>> {
        Ok(self.todos.read().await.clone())
    }

    async fn find_by_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<TodoRecord>> {
        Ok(self
            .todos
            .read()
            .await
            .iter()
            .find(|t| t.is_from(source_type, source_id))
            .cloned())
    }

    async fn upsert_from_source(
        &self,
        item: &IntegratedItem,
        now: DateTime<Utc>,
    ) -> Result<Committed> {
        let mut todos = self.todos.write().await;
        Ok(materialize::commit(item, &mut todos, now))
    }

    async fn toggle(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<TodoRecord>> {
        let mut todos = self.todos.write().await;
        Ok(todos.iter_mut().find(|t| t.id == id).map(|t| {
            t.toggle(now);
            t.clone()
        }))
    }

    async fn clear_completed(&self) -> Result<u64> {
        let mut todos = self.todos.write().await;
        let before = todos.len();
        todos.retain(|t| !t.is_completed);
        Ok((before - todos.len()) as u64)
    }

    async fn mark_all_complete(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut todos = self.todos.write().await;
        let mut changed = 0;
        for todo in todos.iter_mut().filter(|t| !t.is_completed) {
            todo.is_completed = true;
            todo.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SQLite backend
// ═══════════════════════════════════════════════════════════════════════

const SELECT_TODO: &str = "SELECT id, title, is_completed, priority, due_date, notes, created_at, \
     updated_at, source_type, source_url, source_id FROM todos";

/// SQLite-backed store. Timestamps are stored as Unix milliseconds.
pub struct SqliteTodoStore {
    pool: SqlitePool,
}

impl SqliteTodoStore {
    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Read-then-write transactions take the write lock up front. A deferred
    /// transaction would fail with `SQLITE_BUSY` when its read snapshot goes
    /// stale under WAL.
    async fn begin_immediate(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("Invalid timestamp: {}", ms))
}

fn row_to_todo(row: &SqliteRow) -> Result<TodoRecord> {
    let id: String = row.try_get("id")?;
    let priority: String = row.try_get("priority")?;
    let due_date: Option<i64> = row.try_get("due_date")?;
    let source_type: Option<String> = row.try_get("source_type")?;

    Ok(TodoRecord {
        id: Uuid::parse_str(&id).with_context(|| format!("Invalid todo id: {}", id))?,
        title: row.try_get("title")?,
        is_completed: row.try_get("is_completed")?,
        priority: priority.parse()?,
        due_date: due_date.map(from_millis).transpose()?,
        notes: row.try_get("notes")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        source_type: source_type.map(|s| s.parse()).transpose()?,
        source_url: row.try_get("source_url")?,
        source_id: row.try_get("source_id")?,
    })
}

async fn insert_todo<'e, E>(executor: E, todo: &TodoRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO todos (id, title, is_completed, priority, due_date, notes, created_at, updated_at, source_type, source_url, source_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(todo.id.to_string())
    .bind(&todo.title)
    .bind(todo.is_completed)
    .bind(todo.priority.as_str())
    .bind(todo.due_date.map(to_millis))
    .bind(&todo.notes)
    .bind(to_millis(todo.created_at))
    .bind(to_millis(todo.updated_at))
    .bind(todo.source_type.map(|s| s.as_str()))
    .bind(&todo.source_url)
    .bind(&todo.source_id)
    .execute(executor)
    .await?;
    Ok(())
}

async fn update_todo<'e, E>(executor: E, todo: &TodoRecord) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE todos SET
            title = ?, is_completed = ?, priority = ?, due_date = ?, notes = ?,
            updated_at = ?, source_type = ?, source_url = ?, source_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&todo.title)
    .bind(todo.is_completed)
    .bind(todo.priority.as_str())
    .bind(todo.due_date.map(to_millis))
    .bind(&todo.notes)
    .bind(to_millis(todo.updated_at))
    .bind(todo.source_type.map(|s| s.as_str()))
    .bind(&todo.source_url)
    .bind(&todo.source_id)
    .bind(todo.id.to_string())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn upsert_in(
    conn: &mut SqliteConnection,
    item: &IntegratedItem,
    now: DateTime<Utc>,
) -> Result<Committed> {
    let source_type = materialize::source_type_for_label(&item.source);
    let existing = sqlx::query(&format!(
        "{} WHERE source_type = ? AND source_id = ?",
        SELECT_TODO
    ))
    .bind(source_type.as_str())
    .bind(&item.id)
    .fetch_optional(&mut *conn)
    .await?;
    let existing = existing.as_ref().map(row_to_todo).transpose()?;

    let committed = materialize::apply(item, existing, now);
    match &committed {
        Committed::Created(todo) => insert_todo(&mut *conn, todo).await?,
        Committed::Updated(todo) => {
            update_todo(&mut *conn, todo).await?;
        }
    }
    Ok(committed)
}

async fn toggle_in(
    conn: &mut SqliteConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<TodoRecord>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_TODO))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(mut todo) = row.as_ref().map(row_to_todo).transpose()? else {
        return Ok(None);
    };
    todo.toggle(now);
    update_todo(&mut *conn, &todo).await?;
    Ok(Some(todo))
}

#[async_trait]
impl TodoStore for SqliteTodoStore {
    async fn add(&self, todo: &TodoRecord) -> Result<()> {
        insert_todo(&self.pool, todo).await
    }

    async fn update(&self, todo: &TodoRecord) -> Result<bool> {
        update_todo(&self.pool, todo).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: Uuid) -> Result<Option<TodoRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_TODO))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_todo).transpose()
    }

    async fn all(&self) -> Result<Vec<TodoRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY created_at ASC", SELECT_TODO))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_todo).collect()
    }

    async fn find_by_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<TodoRecord>> {
        let row = sqlx::query(&format!(
            "{} WHERE source_type = ? AND source_id = ?",
            SELECT_TODO
        ))
        .bind(source_type.as_str())
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_todo).transpose()
    }

    async fn upsert_from_source(
        &self,
        item: &IntegratedItem,
        now: DateTime<Utc>,
    ) -> Result<Committed> {
        let mut tx = self.begin_immediate().await?;
        let committed = upsert_in(&mut *tx, item, now).await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn toggle(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<TodoRecord>> {
        let mut tx = self.begin_immediate().await?;
        let todo = toggle_in(&mut *tx, id, now).await?;
        tx.commit().await?;
        Ok(todo)
    }

    async fn clear_completed(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM todos WHERE is_completed = 1")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn mark_all_complete(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("UPDATE todos SET is_completed = 1, updated_at = ? WHERE is_completed = 0")
                .bind(to_millis(now))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemPriority, Priority};
    use chrono::Duration;

    fn item(id: &str) -> IntegratedItem {
        IntegratedItem {
            id: id.to_string(),
            title: "Mail Action: Quarterly report".to_string(),
            description: "please review the report by Friday".to_string(),
            priority: ItemPriority::Medium,
            due_date: None,
            url: format!("message://{}", id),
            source: "Mail Message".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_upsert_is_idempotent_per_source() {
        let store = MemoryTodoStore::new();
        let first = store.upsert_from_source(&item("mail:1"), Utc::now()).await.unwrap();
        let second = store.upsert_from_source(&item("mail:1"), Utc::now()).await.unwrap();
        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(store.all().await.unwrap().len(), 1);
        assert!(store
            .find_by_source(SourceType::Mail, "mail:1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn memory_add_rejects_duplicate_source() {
        let store = MemoryTodoStore::new();
        let committed = store.upsert_from_source(&item("mail:1"), Utc::now()).await.unwrap();
        let mut copy = committed.into_record();
        copy.id = Uuid::new_v4();
        assert!(store.add(&copy).await.is_err());
    }

    #[tokio::test]
    async fn memory_bulk_operations() {
        let store = MemoryTodoStore::new();
        let now = Utc::now();
        let a = TodoRecord::new("a", now);
        let b = TodoRecord::new("b", now + Duration::seconds(1));
        store.add(&a).await.unwrap();
        store.add(&b).await.unwrap();

        let toggled = store.toggle(a.id, now).await.unwrap().unwrap();
        assert!(toggled.is_completed);
        assert_eq!(counts(&store.all().await.unwrap()), (1, 1));

        assert_eq!(store.clear_completed().await.unwrap(), 1);
        assert_eq!(store.mark_all_complete(now).await.unwrap(), 1);
        assert_eq!(store.mark_all_complete(now).await.unwrap(), 0);
        assert!(store.delete(b.id).await.unwrap());
        assert!(!store.delete(b.id).await.unwrap());
    }

    #[test]
    fn filter_orders_newest_first() {
        let now = Utc::now();
        let old = TodoRecord::new("old", now - Duration::hours(1));
        let mut new = TodoRecord::new("new", now);
        new.toggle(now);
        let all = filter_todos(vec![old.clone(), new.clone()], TodoFilter::All);
        assert_eq!(all[0].title, "new");
        let active = filter_todos(vec![old, new], TodoFilter::Active);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "old");
    }

    #[tokio::test]
    async fn sqlite_round_trip_and_upsert() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.store.path = tmp.path().join("todos.sqlite");
        let store = SqliteTodoStore::open(&config).await.unwrap();

        let mut manual = TodoRecord::new("Buy milk", Utc::now());
        manual.priority = Priority::Low;
        store.add(&manual).await.unwrap();

        let first = store.upsert_from_source(&item("mail:7"), Utc::now()).await.unwrap();
        let mut changed = item("mail:7");
        changed.priority = ItemPriority::High;
        let second = store.upsert_from_source(&changed, Utc::now()).await.unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.record().id, second.record().id);

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        let from_mail = store
            .find_by_source(SourceType::Mail, "mail:7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from_mail.priority, Priority::High);
        assert_eq!(from_mail.source_url.as_deref(), Some("message://mail:7"));

        let loaded = store.get(manual.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Buy milk");
        assert_eq!(loaded.priority, Priority::Low);
        assert_eq!(loaded.source_type, Some(SourceType::Manual));

        store.close().await;
    }

    #[tokio::test]
    async fn sqlite_concurrent_commits_do_not_lock_out() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.store.path = tmp.path().join("todos.sqlite");
        let store = std::sync::Arc::new(SqliteTodoStore::open(&config).await.unwrap());

        for round in 0..10 {
            let mut handles = Vec::new();
            for n in 0..5 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    let distinct = item(&format!("mail:{}-{}", round, n));
                    store.upsert_from_source(&distinct, Utc::now()).await?;
                    store.upsert_from_source(&item("mail:shared"), Utc::now()).await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        }

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 51);
        let shared = store
            .find_by_source(SourceType::Mail, "mail:shared")
            .await
            .unwrap()
            .unwrap();
        assert!(store.toggle(shared.id, Utc::now()).await.unwrap().unwrap().is_completed);

        store.close().await;
    }
}
