//! In-memory history store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{HistoryId, HistoryRecord, HistoryStore, NewHistoryRecord};
use crate::error::{HistoryError, HistoryResult};
use crate::request::UserId;

/// In-memory history storage.
///
/// Fast but not persistent across restarts.
#[derive(Debug)]
pub struct MemoryHistoryStore {
    next_id: AtomicU64,
    records: RwLock<HashMap<UserId, Vec<HistoryRecord>>>,
}

impl MemoryHistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all users.
    pub async fn total(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            records: RwLock::default(),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, record: NewHistoryRecord) -> HistoryResult<HistoryRecord> {
        let mut records = self.records.write().await;
        // Ids are taken under the write lock so each user's vector stays sorted.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stored = record.with_id(id);
        records
            .entry(stored.user_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, user_id: &UserId) -> HistoryResult<Vec<HistoryRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(user_id)
            .map(|v| v.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, user_id: &UserId, id: HistoryId) -> HistoryResult<Option<HistoryRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(user_id)
            .and_then(|v| v.iter().find(|r| r.id == id).cloned()))
    }

    async fn delete(&self, user_id: &UserId, id: HistoryId) -> HistoryResult<()> {
        let mut records = self.records.write().await;
        let not_found = || HistoryError::NotFound {
            user_id: user_id.clone(),
            id,
        };
        let user_records = records.get_mut(user_id).ok_or_else(not_found)?;
        let pos = user_records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(not_found)?;
        user_records.remove(pos);
        Ok(())
    }
}
