//! Offline tone synthesizer.
//!
//! Produces a short sine tone whose pitch is derived from the prompt, so the
//! whole pipeline can run without a model server.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{AudioModel, DurationTable, wav};
use crate::error::{ModelError, ModelResult};
use crate::request::ModelKind;

const SAMPLE_RATE: u32 = 16_000;
const SPEECH_SECS_PER_WORD: f32 = 0.4;

/// Deterministic sine-tone model.
#[derive(Debug, Clone, Default)]
pub struct ToneModel {
    durations: DurationTable,
    latency: Option<Duration>,
}

impl ToneModel {
    /// Create a tone model with default durations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override per-kind clip durations.
    #[must_use]
    pub fn with_durations(mut self, durations: DurationTable) -> Self {
        self.durations = durations;
        self
    }

    /// Sleep this long before answering, to mimic a real model.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[allow(clippy::cast_precision_loss)]
    fn clip_secs(&self, prompt: &str, kind: ModelKind) -> f32 {
        match self.durations.get(kind) {
            Some(secs) => secs as f32,
            None => (prompt.split_whitespace().count() as f32 * SPEECH_SECS_PER_WORD).max(1.0),
        }
    }
}

/// FNV-1a over the prompt bytes.
fn prompt_hash(prompt: &str) -> u64 {
    prompt.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn synthesize(prompt: &str, secs: f32) -> ModelResult<Vec<u8>> {
    let frequency = 220.0 + (prompt_hash(prompt) % 440) as f32;
    let total = (SAMPLE_RATE as f32 * secs) as usize;
    let fade = (SAMPLE_RATE as usize / 50).min(total / 2).max(1);

    let samples: Vec<i16> = (0..total)
        .map(|n| {
            let t = n as f32 / SAMPLE_RATE as f32;
            let envelope = (n.min(total - n) as f32 / fade as f32).min(1.0);
            let value = (t * frequency * std::f32::consts::TAU).sin() * envelope * 0.3;
            (value * f32::from(i16::MAX)) as i16
        })
        .collect();

    wav::encode_pcm16_mono(&samples, SAMPLE_RATE)
}

#[async_trait]
impl AudioModel for ToneModel {
    fn name(&self) -> &'static str {
        "tone"
    }

    async fn generate(&self, prompt: &str, kind: ModelKind) -> ModelResult<Vec<u8>> {
        if !self.supports(kind) {
            return Err(ModelError::Unsupported(kind));
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let secs = self.clip_secs(prompt, kind);
        debug!(model = %kind, secs, "synthesizing tone");
        synthesize(prompt, secs)
    }
}
