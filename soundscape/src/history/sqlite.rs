//! SQLite-backed history store.
//!
//! A single connection guarded by a mutex; every query runs on the blocking
//! pool so the async caller never stalls the runtime.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::{HistoryId, HistoryRecord, HistoryStore, NewHistoryRecord};
use crate::error::{HistoryError, HistoryResult};
use crate::request::{ModelKind, UserId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS prompts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         TEXT    NOT NULL,
    prompt          TEXT    NOT NULL,
    audio_file_path TEXT,
    model           TEXT    NOT NULL,
    timestamp       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_prompts_user ON prompts (user_id, id);
";

/// Raw row as read from SQLite, before type conversion.
type RawRow = (i64, String, String, Option<String>, String, i64);

/// Durable history storage in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (or create) a database file.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> HistoryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| HistoryError::storage("sqlite", e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened history database");
        Self::init(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the schema cannot be created.
    pub fn open_in_memory() -> HistoryResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> HistoryResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> HistoryResult<T>
    where
        F: FnOnce(&Connection) -> HistoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| HistoryError::Lock(e.to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| HistoryError::Task(e.to_string()))?
    }
}

fn to_record(row: RawRow) -> HistoryResult<HistoryRecord> {
    let (id, user_id, prompt, audio_url, model, timestamp) = row;
    let model_kind = model
        .parse::<ModelKind>()
        .map_err(|e| HistoryError::storage("sqlite", e.to_string()))?;
    Ok(HistoryRecord {
        id: u64::try_from(id).map_err(|e| HistoryError::storage("sqlite", e.to_string()))?,
        user_id: UserId::new(user_id),
        prompt,
        model_kind,
        audio_url,
        timestamp: u64::try_from(timestamp).unwrap_or_default(),
    })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn sql_id(id: HistoryId) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn append(&self, record: NewHistoryRecord) -> HistoryResult<HistoryRecord> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO prompts (user_id, prompt, audio_file_path, model, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.user_id.as_str(),
                    record.prompt,
                    record.audio_url,
                    record.model_kind.as_str(),
                    i64::try_from(record.timestamp).unwrap_or(i64::MAX),
                ],
            )?;
            let id = u64::try_from(conn.last_insert_rowid())
                .map_err(|e| HistoryError::storage("sqlite", e.to_string()))?;
            Ok(record.with_id(id))
        })
        .await
    }

    async fn list(&self, user_id: &UserId) -> HistoryResult<Vec<HistoryRecord>> {
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, prompt, audio_file_path, model, timestamp
                 FROM prompts WHERE user_id = ?1 ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map(params![user_id.as_str()], read_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(to_record).collect()
        })
        .await
    }

    async fn get(&self, user_id: &UserId, id: HistoryId) -> HistoryResult<Option<HistoryRecord>> {
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, prompt, audio_file_path, model, timestamp
                     FROM prompts WHERE user_id = ?1 AND id = ?2",
                    params![user_id.as_str(), sql_id(id)],
                    read_row,
                )
                .optional()?;
            row.map(to_record).transpose()
        })
        .await
    }

    async fn delete(&self, user_id: &UserId, id: HistoryId) -> HistoryResult<()> {
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM prompts WHERE user_id = ?1 AND id = ?2",
                params![user_id.as_str(), sql_id(id)],
            )?;
            if removed == 0 {
                return Err(HistoryError::NotFound { user_id, id });
            }
            Ok(())
        })
        .await
    }
}
