//! SQLite-backed task and user store.
//!
//! Thread-safe via an internal `Mutex<Connection>`. Async trait methods hop
//! onto the blocking pool so SQLite I/O never stalls the runtime. The dedup
//! write runs in an `IMMEDIATE` transaction, which also serializes writers in
//! other processes sharing the same database file.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::schema::{apply_schema, read_schema_version};
use super::{StoreError, TaskStore, UpdateOutcome, UserStore, can_advance};
use crate::model::{Channel, ContactInfo, SentRecord, Task, TaskStatus};

const TASK_COLUMNS: &str = "id, user_id, title, status, reminder_deadline, \
                            last_push_sent_at, last_whatsapp_sent_at";

/// SQLite-backed task and user store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("cannot create db dir: {e}")))?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store worker failed: {e}")))?
    }

    /// Insert a new task with its send history. An existing id is rejected,
    /// so seeding can never rewind a task's dedup state.
    pub fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists = tx
            .query_row("SELECT 1 FROM tasks WHERE id = ?1", params![task.id], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            return Err(StoreError::AlreadyExists(task.id.clone()));
        }
        tx.execute(
            &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                task.id,
                task.user_id,
                task.title,
                task.status.as_str(),
                task.reminder_deadline.map(|t| t.timestamp_millis()),
                task.last_push_sent_at.map(|t| t.timestamp_millis()),
                task.last_whatsapp_sent_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        for record in &task.sent_history {
            tx.execute(
                "INSERT INTO task_sends (task_id, channel, sent_at) VALUES (?1, ?2, ?3)",
                params![task.id, record.channel.as_str(), record.at.timestamp_millis()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch a task by id.
    pub fn task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                TaskRow::from_row,
            )
            .optional()?;
        match row {
            Some(row) => {
                let history = load_history(&conn, &row.id)?;
                Ok(Some(row.into_task(history)?))
            }
            None => Ok(None),
        }
    }

    /// Mark a task pending or done.
    pub fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![status.as_str(), task_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(task_id.to_owned()));
        }
        Ok(())
    }

    /// Delete a task and its send history.
    pub fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        Ok(rows > 0)
    }

    /// Insert or update a user's name and phone.
    pub fn upsert_user(
        &self,
        user_id: &str,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, name, phone) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, phone = excluded.phone",
            params![user_id, name, phone],
        )?;
        Ok(())
    }

    /// Register a push token. A token already registered (to anyone) is kept as is.
    pub fn register_push_token(&self, user_id: &str, token: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO push_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn find_due_candidates(
        &self,
        _channel: Channel,
        now: DateTime<Utc>,
        lead_time: Duration,
    ) -> Result<Vec<Task>, StoreError> {
        let horizon = now
            .checked_add_signed(lead_time)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .timestamp_millis();
        self.with_conn(move |conn| {
            let rows = {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE status = 'pending' \
                       AND reminder_deadline IS NOT NULL \
                       AND reminder_deadline <= ?1 \
                     ORDER BY reminder_deadline"
                ))?;
                let mapped = stmt.query_map(params![horizon], TaskRow::from_row)?;
                let mut rows = Vec::new();
                for row in mapped {
                    rows.push(row?);
                }
                rows
            };

            let mut tasks = Vec::with_capacity(rows.len());
            for row in rows {
                let history = load_history(conn, &row.id)?;
                tasks.push(row.into_task(history)?);
            }
            Ok(tasks)
        })
        .await
    }

    async fn update_reminder_state(
        &self,
        task_id: &str,
        channel: Channel,
        expected: Option<DateTime<Utc>>,
        sent_at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError> {
        let task_id = task_id.to_owned();
        self.with_conn(move |conn| {
            let column = last_sent_column(channel);
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let row: Option<(String, Option<i64>)> = tx
                .query_row(
                    &format!("SELECT status, {column} FROM tasks WHERE id = ?1"),
                    params![task_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((status, current_ms)) = row else {
                return Ok(UpdateOutcome::Conflict);
            };
            if status != TaskStatus::Pending.as_str() {
                return Ok(UpdateOutcome::Conflict);
            }

            // Compare at the stored (millisecond) precision.
            let current = current_ms.map(from_millis).transpose()?;
            let expected = expected.map(|t| from_millis(t.timestamp_millis())).transpose()?;
            let sent_ms = sent_at.timestamp_millis();
            if !can_advance(current, expected, from_millis(sent_ms)?) {
                return Ok(UpdateOutcome::Conflict);
            }

            tx.execute(
                &format!("UPDATE tasks SET {column} = ?1 WHERE id = ?2"),
                params![sent_ms, task_id],
            )?;
            tx.execute(
                "INSERT INTO task_sends (task_id, channel, sent_at) VALUES (?1, ?2, ?3)",
                params![task_id, channel.as_str(), sent_ms],
            )?;
            tx.commit()?;
            Ok(UpdateOutcome::Applied)
        })
        .await
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn contact_info(&self, user_id: &str) -> Result<Option<ContactInfo>, StoreError> {
        let user_id = user_id.to_owned();
        self.with_conn(move |conn| {
            let user: Option<(Option<String>, Option<String>)> = conn
                .query_row(
                    "SELECT name, phone FROM users WHERE id = ?1",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let mut stmt =
                conn.prepare("SELECT token FROM push_tokens WHERE user_id = ?1 ORDER BY token")?;
            let mut push_tokens = std::collections::BTreeSet::new();
            for token in stmt.query_map(params![user_id], |row| row.get::<_, String>(0))? {
                push_tokens.insert(token?);
            }

            match user {
                Some((name, phone)) => Ok(Some(ContactInfo {
                    name,
                    push_tokens,
                    phone,
                })),
                None if !push_tokens.is_empty() => Ok(Some(ContactInfo {
                    name: None,
                    push_tokens,
                    phone: None,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn remove_push_token(&self, user_id: &str, token: &str) -> Result<bool, StoreError> {
        let user_id = user_id.to_owned();
        let token = token.to_owned();
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "DELETE FROM push_tokens WHERE token = ?1 AND user_id = ?2",
                params![token, user_id],
            )?;
            Ok(rows > 0)
        })
        .await
    }
}

fn last_sent_column(channel: Channel) -> &'static str {
    match channel {
        Channel::Push => "last_push_sent_at",
        Channel::WhatsApp => "last_whatsapp_sent_at",
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Encoding(format!("timestamp out of range: {ms}")))
}

fn load_history(conn: &Connection, task_id: &str) -> Result<Vec<SentRecord>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT channel, sent_at FROM task_sends WHERE task_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![task_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut history = Vec::new();
    for row in rows {
        let (channel, at) = row?;
        history.push(SentRecord {
            channel: channel.parse().map_err(StoreError::Encoding)?,
            at: from_millis(at)?,
        });
    }
    Ok(history)
}

struct TaskRow {
    id: String,
    user_id: String,
    title: String,
    status: String,
    reminder_deadline: Option<i64>,
    last_push_sent_at: Option<i64>,
    last_whatsapp_sent_at: Option<i64>,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            status: row.get(3)?,
            reminder_deadline: row.get(4)?,
            last_push_sent_at: row.get(5)?,
            last_whatsapp_sent_at: row.get(6)?,
        })
    }

    fn into_task(self, sent_history: Vec<SentRecord>) -> Result<Task, StoreError> {
        Ok(Task {
            id: self.id,
            title: self.title,
            status: self.status.parse().map_err(StoreError::Encoding)?,
            reminder_deadline: self.reminder_deadline.map(from_millis).transpose()?,
            last_push_sent_at: self.last_push_sent_at.map(from_millis).transpose()?,
            last_whatsapp_sent_at: self.last_whatsapp_sent_at.map(from_millis).transpose()?,
            sent_history,
            user_id: self.user_id,
        })
    }
}
