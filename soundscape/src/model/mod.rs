//! Model adapters: the boundary around the text-to-audio capability.
//!
//! The pipeline only ever sees [`AudioModel`]. Adapters own their timeouts
//! and report every failure as a [`ModelError`](crate::error::ModelError).
//!
//! - [`HttpAudioModel`] - Calls a model inference server over HTTP
//! - [`ToneModel`] - Offline synthesizer producing a deterministic tone

mod http;
mod tone;
pub mod wav;

pub use http::{DEFAULT_TIMEOUT_SECS, HttpAudioModel};
pub use tone::ToneModel;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ModelResult;
use crate::request::ModelKind;

/// Trait for text-to-audio model adapters.
///
/// Implementations return a complete WAV payload. The call may take several
/// seconds; dropping the future abandons the generation.
#[async_trait]
pub trait AudioModel: Send + Sync {
    /// Adapter name used in logs.
    fn name(&self) -> &str;

    /// Whether this adapter can serve the given kind.
    fn supports(&self, kind: ModelKind) -> bool {
        kind.is_generative()
    }

    /// Generate audio for `prompt`.
    async fn generate(&self, prompt: &str, kind: ModelKind) -> ModelResult<Vec<u8>>;
}

/// A shared, type-erased model adapter.
pub type SharedAudioModel = Arc<dyn AudioModel>;

/// Clip length per generative kind, in seconds.
///
/// A missing entry means the model decides (speech follows the text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationTable {
    durations: HashMap<ModelKind, u32>,
}

impl DurationTable {
    /// Override the duration for one kind.
    #[must_use]
    pub fn with(mut self, kind: ModelKind, secs: u32) -> Self {
        self.durations.insert(kind, secs);
        self
    }

    /// Duration to request for `kind`.
    #[must_use]
    pub fn get(&self, kind: ModelKind) -> Option<u32> {
        self.durations.get(&kind).copied()
    }
}

impl Default for DurationTable {
    fn default() -> Self {
        let durations = ModelKind::ALL
            .into_iter()
            .filter_map(|kind| kind.default_duration_secs().map(|secs| (kind, secs)))
            .collect();
        Self { durations }
    }
}
