//! In-memory asset store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AssetKey, AssetStore, public_url};
use crate::error::{StoreError, StoreResult};

/// An object held by [`MemoryAssetStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// Object body.
    pub bytes: Vec<u8>,
    /// Declared content type.
    pub content_type: String,
}

/// In-memory asset storage.
///
/// Fast but not persistent across restarts.
#[derive(Debug)]
pub struct MemoryAssetStore {
    base_url: String,
    objects: RwLock<HashMap<String, StoredAsset>>,
}

impl MemoryAssetStore {
    /// Create a store whose URLs start with `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::default(),
        }
    }

    /// Fetch a stored object.
    pub async fn get(&self, key: &str) -> Option<StoredAsset> {
        self.objects.read().await.get(key).cloned()
    }

    /// All stored keys.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &AssetKey, bytes: Vec<u8>, content_type: &str) -> StoreResult<String> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(key.as_str()) {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        objects.insert(
            key.to_string(),
            StoredAsset {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(public_url(&self.base_url, key))
    }
}
