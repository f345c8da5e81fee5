//! File-based asset store.
//!
//! Writes objects below a root directory. A static file server mounted at
//! `public_base_url` is expected to serve that directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{AssetKey, AssetStore, public_url};
use crate::error::{StoreError, StoreResult};

/// Local directory asset storage.
#[derive(Debug, Clone)]
pub struct FileAssetStore {
    root: PathBuf,
    public_base_url: String,
}

impl FileAssetStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root, refusing keys that escape it.
    fn object_path(&self, key: &AssetKey) -> StoreResult<PathBuf> {
        let relative = Path::new(key.as_str());
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::Request(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetStore for FileAssetStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn put(
        &self,
        key: &AssetKey,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> StoreResult<String> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::KeyExists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes).await?;
        file.sync_all().await?;

        debug!(path = %path.display(), bytes = bytes.len(), "stored asset file");
        Ok(public_url(&self.public_base_url, key))
    }
}
