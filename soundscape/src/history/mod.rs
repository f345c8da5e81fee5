//! Per-user generation history.
//!
//! Records are append-only: regeneration writes a new record and the only
//! removal path is an explicit [`HistoryStore::delete`]. Every operation is
//! scoped by [`UserId`], so concurrent users never observe each other.
//!
//! - [`MemoryHistoryStore`] - In-process store, for tests and dry runs
//! - [`SqliteHistoryStore`] - Durable store (feature `sqlite`)

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryHistoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHistoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HistoryResult;
use crate::request::{ModelKind, UserId};

/// History record identifier. Assigned by the store, strictly increasing.
pub type HistoryId = u64;

/// A record about to be appended; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryRecord {
    /// Owner of the record.
    pub user_id: UserId,
    /// Trimmed prompt as the user typed it.
    pub prompt: String,
    /// Resolved kind (`Predefined` for table hits).
    pub model_kind: ModelKind,
    /// URL of the audio asset.
    pub audio_url: Option<String>,
    /// Creation time in Unix milliseconds.
    pub timestamp: u64,
}

impl NewHistoryRecord {
    /// Attach an id, producing the stored record.
    #[must_use]
    pub fn with_id(self, id: HistoryId) -> HistoryRecord {
        HistoryRecord {
            id,
            user_id: self.user_id,
            prompt: self.prompt,
            model_kind: self.model_kind,
            audio_url: self.audio_url,
            timestamp: self.timestamp,
        }
    }
}

/// A stored generation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Store-assigned id.
    pub id: HistoryId,
    /// Owner of the record.
    pub user_id: UserId,
    /// Trimmed prompt as the user typed it.
    pub prompt: String,
    /// Resolved kind.
    #[serde(rename = "model")]
    pub model_kind: ModelKind,
    /// URL of the audio asset.
    #[serde(rename = "audio_file_path")]
    pub audio_url: Option<String>,
    /// Creation time in Unix milliseconds.
    pub timestamp: u64,
}

/// Trait for history storage backends.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Append a record and return it with its assigned id.
    async fn append(&self, record: NewHistoryRecord) -> HistoryResult<HistoryRecord>;

    /// All records for `user_id`, most recent first.
    async fn list(&self, user_id: &UserId) -> HistoryResult<Vec<HistoryRecord>>;

    /// Fetch one record owned by `user_id`.
    async fn get(&self, user_id: &UserId, id: HistoryId) -> HistoryResult<Option<HistoryRecord>>;

    /// Delete one record owned by `user_id`.
    ///
    /// Returns [`HistoryError::NotFound`](crate::error::HistoryError::NotFound)
    /// when no such record exists, including on a second delete.
    async fn delete(&self, user_id: &UserId, id: HistoryId) -> HistoryResult<()>;
}

/// A shared, type-erased history store.
pub type SharedHistoryStore = Arc<dyn HistoryStore>;
