//! HTTP model adapter.
//!
//! Posts `{ "prompt", "model", "duration" }` to an inference server and
//! expects raw WAV bytes back.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{AudioModel, DurationTable, wav};
use crate::error::{ModelError, ModelResult};
use crate::request::ModelKind;
use crate::util::truncate_str;

/// Default request timeout. Music generation on CPU is slow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Model adapter backed by a remote inference server.
#[derive(Debug, Clone)]
pub struct HttpAudioModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout_secs: u64,
    durations: DurationTable,
}

impl HttpAudioModel {
    /// Create an adapter for `endpoint` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> ModelResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
            timeout_secs,
            durations: DurationTable::default(),
        })
    }

    /// Send a bearer token with every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override per-kind clip durations.
    #[must_use]
    pub fn with_durations(mut self, durations: DurationTable) -> Self {
        self.durations = durations;
        self
    }

    /// The inference endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, prompt: &str, kind: ModelKind) -> serde_json::Value {
        serde_json::json!({
            "prompt": prompt,
            "model": kind.as_str(),
            "duration": self.durations.get(kind),
        })
    }

    fn map_send_error(&self, e: &reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            ModelError::Unavailable(e.to_string())
        } else {
            ModelError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl AudioModel for HttpAudioModel {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn generate(&self, prompt: &str, kind: ModelKind) -> ModelResult<Vec<u8>> {
        if !self.supports(kind) {
            return Err(ModelError::Unsupported(kind));
        }

        debug!(endpoint = %self.endpoint, model = %kind, "requesting generation");

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(prompt, kind));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ModelError::Api {
                status,
                body: truncate_str(&body, 200),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(&e))?;
        wav::verify(&bytes)?;

        info!(model = %kind, bytes = bytes.len(), "generation complete");
        Ok(bytes.to_vec())
    }
}
