//! HTTP object store.
//!
//! Uploads with `PUT {upload_url}/{key}`, which works against S3-compatible
//! gateways, pre-authorized bucket endpoints and plain WebDAV servers. The
//! bucket is expected to be world-readable at `public_base_url`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{AssetKey, AssetStore, public_url};
use crate::error::{StoreError, StoreResult};
use crate::util::truncate_str;

/// Default upload timeout.
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;

/// Remote object storage reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    upload_url: String,
    public_base_url: String,
    token: Option<String>,
}

impl HttpObjectStore {
    /// Create a store that uploads to `upload_url` and serves from `public_base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Request`] if the HTTP client cannot be built.
    pub fn new(
        upload_url: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            upload_url: upload_url.into(),
            public_base_url: public_base_url.into(),
            token: None,
        })
    }

    /// Send a bearer token with every upload.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn upload_target(&self, key: &AssetKey) -> String {
        public_url(&self.upload_url, key)
    }
}

#[async_trait]
impl AssetStore for HttpObjectStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn put(&self, key: &AssetKey, bytes: Vec<u8>, content_type: &str) -> StoreResult<String> {
        let target = self.upload_target(key);
        let size = bytes.len();
        debug!(target = %target, bytes = size, "uploading asset");

        let mut request = self
            .client
            .put(&target)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            // Conditional write: fail instead of replacing an existing object.
            .header(reqwest::header::IF_NONE_MATCH, "*")
            .body(bytes);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::PRECONDITION_FAILED {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body: truncate_str(&body, 200),
            });
        }

        info!(key = %key, bytes = size, "asset uploaded");
        Ok(public_url(&self.public_base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_and_public_urls_differ() {
        let store = HttpObjectStore::new(
            "https://upload.example.com/bucket/",
            "https://bucket.example.com",
        )
        .unwrap()
        .with_token("secret");
        let key = AssetKey::generate("generated_audio");

        assert_eq!(
            store.upload_target(&key),
            format!("https://upload.example.com/bucket/{key}")
        );
        assert_eq!(store.name(), "http");
        assert_eq!(store.token.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_request_error() {
        let store = HttpObjectStore::new("http://127.0.0.1:9", "http://127.0.0.1:9").unwrap();
        let err = store
            .put(&AssetKey::generate("a"), vec![0], "audio/wav")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Request(_)));
    }
}
