//! Asset stores: durable object storage for generated audio.
//!
//! Every object lives under a key of the form `<prefix>/<uuid>.wav`. Keys
//! come from a random v4 UUID, never from the clock, so concurrent writers
//! cannot collide. Stores return a URL that is publicly resolvable.
//!
//! - [`MemoryAssetStore`] - In-process map, for tests and dry runs
//! - [`FileAssetStore`] - Local directory fronted by a static file server
//! - [`HttpObjectStore`] - `PUT` uploads to an S3-compatible endpoint

mod file;
mod http;
mod memory;

pub use file::FileAssetStore;
pub use http::HttpObjectStore;
pub use memory::{MemoryAssetStore, StoredAsset};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;

/// Default key prefix for generated audio.
pub const DEFAULT_KEY_PREFIX: &str = "generated_audio";

/// Object key inside an asset store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey(String);

impl AssetKey {
    /// Generate a fresh `<prefix>/<uuid>.wav` key.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        let token = Uuid::new_v4();
        if prefix.is_empty() {
            Self(format!("{token}.wav"))
        } else {
            Self(format!("{prefix}/{token}.wav"))
        }
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for asset storage backends.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Store `bytes` under `key` and return the object's public URL.
    ///
    /// Writing to a key that already holds an object is an error.
    async fn put(&self, key: &AssetKey, bytes: Vec<u8>, content_type: &str) -> StoreResult<String>;
}

/// A shared, type-erased asset store.
pub type SharedAssetStore = Arc<dyn AssetStore>;

/// Join a public base URL and an object key.
pub(crate) fn public_url(base: &str, key: &AssetKey) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.as_str())
}
