//! The generation pipeline.
//!
//! One call to [`GenerationPipeline::execute`] takes an admitted request to
//! a stored asset and a history record:
//!
//! 1. Predefined prompts skip the model and reuse the table's URL.
//! 2. Otherwise the model adapter synthesizes WAV bytes.
//! 3. The bytes are uploaded under a fresh `<prefix>/<uuid>.wav` key.
//! 4. One history record is appended.
//!
//! Nothing is written when the model fails, and no history is written when
//! the upload fails. A failed history append still hands back the usable
//! audio URL through [`PipelineError::HistoryWriteFailed`].
//!
//! Cancellation is cooperative. The token is honored up to the first durable
//! write (the upload, or the history append on the predefined path). From
//! there the writes run on their own task, so they finish even if the caller
//! stops waiting.

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::asset::{AssetKey, DEFAULT_KEY_PREFIX, SharedAssetStore};
use crate::error::{PipelineError, PipelineResult};
use crate::history::{NewHistoryRecord, SharedHistoryStore};
use crate::model::{SharedAudioModel, wav};
use crate::request::{AudioSource, GenerationRequest, GenerationResult, ModelKind, UserId};
use crate::util::{timestamp_ms, truncate_str};

/// Orchestrates model, asset store and history store for one request at a time.
///
/// Holds no per-request state, so a single instance can serve any number of
/// concurrent sessions.
pub struct GenerationPipeline {
    model: SharedAudioModel,
    assets: SharedAssetStore,
    history: SharedHistoryStore,
    key_prefix: String,
}

impl std::fmt::Debug for GenerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPipeline")
            .field("model", &self.model.name())
            .field("assets", &self.assets.name())
            .field("history", &self.history.name())
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// Audio ready to be committed.
enum Audio {
    /// Freshly synthesized WAV bytes that still need an upload.
    Synthesized(Vec<u8>),
    /// An already-hosted URL.
    Hosted(String),
}

/// Everything the commit task needs, owned so it can outlive the caller.
struct Commit {
    assets: SharedAssetStore,
    history: SharedHistoryStore,
    key_prefix: String,
    user_id: UserId,
    prompt: String,
    kind: ModelKind,
    requested_at: u64,
}

impl GenerationPipeline {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        model: SharedAudioModel,
        assets: SharedAssetStore,
        history: SharedHistoryStore,
    ) -> Self {
        Self {
            model,
            assets,
            history,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Store assets under a different key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// The history store this pipeline appends to.
    #[must_use]
    pub const fn history(&self) -> &SharedHistoryStore {
        &self.history
    }

    /// Run one request to completion.
    ///
    /// Dropping the returned future after the cancel checks have passed does
    /// not abort the upload or the history append.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Cancelled`] if `cancel` fired before the first durable write
    /// - [`PipelineError::GenerationFailed`] if the model failed or returned non-audio
    /// - [`PipelineError::StorageFailed`] if the upload failed
    /// - [`PipelineError::HistoryWriteFailed`] if only the history append failed
    /// - [`PipelineError::CommitAborted`] if the commit task panicked
    pub async fn execute(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<GenerationResult> {
        let span = info_span!(
            "generation",
            user_id = %request.user_id(),
            model = %request.model_kind(),
        );

        async move {
            info!(prompt = %truncate_str(request.prompt(), 80), "generation started");
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let audio = match request.source() {
                AudioSource::Predefined { audio_url } => {
                    debug!(url = %audio_url, "predefined prompt, skipping model");
                    Audio::Hosted(audio_url.clone())
                }
                AudioSource::Model { kind } => {
                    Audio::Synthesized(self.synthesize(request, *kind, cancel).await?)
                }
            };

            if cancel.is_cancelled() {
                info!("cancelled before commit");
                return Err(PipelineError::Cancelled);
            }

            self.commit(request, audio).await
        }
        .instrument(span)
        .await
    }

    async fn synthesize(
        &self,
        request: &GenerationRequest,
        kind: ModelKind,
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<u8>> {
        let bytes = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("cancelled during synthesis");
                return Err(PipelineError::Cancelled);
            }
            generated = self.model.generate(request.prompt(), kind) => {
                generated.map_err(|e| {
                    warn!(
                        model = self.model.name(),
                        error = %e,
                        retryable = e.is_retryable(),
                        "model adapter failed"
                    );
                    PipelineError::GenerationFailed(e)
                })?
            }
        };
        let spec = wav::verify(&bytes).map_err(|e| {
            warn!(model = self.model.name(), error = %e, "model returned unusable audio");
            PipelineError::GenerationFailed(e)
        })?;
        debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bytes = bytes.len(),
            "audio verified"
        );
        Ok(bytes)
    }

    /// Hand the durable writes to a task of their own and wait for it.
    async fn commit(
        &self,
        request: &GenerationRequest,
        audio: Audio,
    ) -> PipelineResult<GenerationResult> {
        let commit = Commit {
            assets: self.assets.clone(),
            history: self.history.clone(),
            key_prefix: self.key_prefix.clone(),
            user_id: request.user_id().clone(),
            prompt: request.prompt().to_string(),
            kind: request.model_kind(),
            requested_at: request.requested_at(),
        };

        match tokio::spawn(commit.run(audio).instrument(Span::current())).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "commit task did not finish");
                Err(PipelineError::CommitAborted(e.to_string()))
            }
        }
    }
}

impl Commit {
    async fn run(self, audio: Audio) -> PipelineResult<GenerationResult> {
        let audio_url = match audio {
            Audio::Hosted(url) => url,
            Audio::Synthesized(bytes) => self.upload(bytes).await?,
        };
        self.record(audio_url).await
    }

    async fn upload(&self, bytes: Vec<u8>) -> PipelineResult<String> {
        let key = AssetKey::generate(&self.key_prefix);
        let size = bytes.len();
        let url = self
            .assets
            .put(&key, bytes, wav::WAV_CONTENT_TYPE)
            .await
            .map_err(|e| {
                warn!(store = self.assets.name(), key = %key, error = %e, "asset upload failed");
                PipelineError::StorageFailed(e)
            })?;

        info!(key = %key, bytes = size, "asset stored");
        Ok(url)
    }

    async fn record(self, audio_url: String) -> PipelineResult<GenerationResult> {
        let kind = self.kind;
        let entry = NewHistoryRecord {
            user_id: self.user_id,
            prompt: self.prompt,
            model_kind: kind,
            audio_url: Some(audio_url.clone()),
            timestamp: timestamp_ms().max(self.requested_at),
        };

        match self.history.append(entry).await {
            Ok(stored) => {
                info!(history_id = stored.id, url = %audio_url, "generation complete");
                Ok(GenerationResult::new(audio_url, kind, Some(stored.id)))
            }
            Err(source) => {
                warn!(
                    error = %source,
                    url = %audio_url,
                    "history append failed; audio still available"
                );
                Err(PipelineError::HistoryWriteFailed {
                    result: GenerationResult::new(audio_url, kind, None),
                    source,
                })
            }
        }
    }
}
