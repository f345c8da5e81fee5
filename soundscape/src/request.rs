//! Request and result types flowing through the generation pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;
use crate::history::HistoryId;
use crate::predefined::PredefinedTable;
use crate::util::timestamp_ms;

/// The kind of audio a request asks for.
///
/// Wire names follow the model identifiers clients already send
/// (`musicgen`, `audiogen`, `text_to_speech`, `predefined`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Music generation.
    #[default]
    #[serde(rename = "musicgen", alias = "music")]
    Music,
    /// Sound effect / ambience generation.
    #[serde(rename = "audiogen", alias = "sound-effect", alias = "sound_effect")]
    SoundEffect,
    /// Text to speech.
    #[serde(rename = "text_to_speech", alias = "speech", alias = "tts")]
    Speech,
    /// A fixed prompt served from a static asset.
    #[serde(rename = "predefined")]
    Predefined,
}

impl ModelKind {
    /// Every kind, in display order.
    pub const ALL: [Self; 4] = [Self::Music, Self::SoundEffect, Self::Speech, Self::Predefined];

    /// The wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Music => "musicgen",
            Self::SoundEffect => "audiogen",
            Self::Speech => "text_to_speech",
            Self::Predefined => "predefined",
        }
    }

    /// Whether this kind requires a model invocation.
    #[must_use]
    pub const fn is_generative(self) -> bool {
        !matches!(self, Self::Predefined)
    }

    /// Default clip length handed to the model. Speech length follows the text.
    #[must_use]
    pub const fn default_duration_secs(self) -> Option<u32> {
        match self {
            Self::Music => Some(10),
            Self::SoundEffect => Some(6),
            Self::Speech | Self::Predefined => None,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "musicgen" | "music" => Ok(Self::Music),
            "audiogen" | "sound-effect" | "sound_effect" => Ok(Self::SoundEffect),
            "text_to_speech" | "speech" | "tts" => Ok(Self::Speech),
            "predefined" => Ok(Self::Predefined),
            _ => Err(ValidationError::UnknownModel(s.to_string())),
        }
    }
}

/// Opaque user identifier resolved by the external auth collaborator.
///
/// Deserializes from either a JSON string or a JSON integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for UserId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self::from(n),
        })
    }
}

/// Where the audio for an admitted request comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum AudioSource {
    /// Synthesize with the model adapter.
    Model {
        /// Requested generation kind.
        kind: ModelKind,
    },
    /// Serve a fixed asset without invoking the model.
    Predefined {
        /// Static asset URL from the predefined table.
        audio_url: String,
    },
}

/// An admitted generation request.
///
/// Only constructible through [`GenerationRequest::admit`], so the prompt is
/// always trimmed and non-empty and predefined prompts are already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    prompt: String,
    source: AudioSource,
    user_id: UserId,
    requested_at: u64,
}

impl GenerationRequest {
    /// Validate a raw prompt and resolve its audio source.
    ///
    /// A prompt found in `table` always resolves to the predefined source,
    /// whatever `requested` says.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a blank prompt or user, or when the
    /// predefined kind is requested for a prompt the table does not know.
    pub fn admit(
        prompt: &str,
        requested: ModelKind,
        user_id: UserId,
        table: &PredefinedTable,
    ) -> Result<Self, ValidationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        if user_id.is_blank() {
            return Err(ValidationError::MissingUserId);
        }

        let source = match table.lookup(prompt) {
            Some(url) => AudioSource::Predefined {
                audio_url: url.to_string(),
            },
            None if requested == ModelKind::Predefined => {
                return Err(ValidationError::NotPredefined(prompt.to_string()));
            }
            None => AudioSource::Model { kind: requested },
        };

        Ok(Self {
            prompt: prompt.to_string(),
            source,
            user_id,
            requested_at: timestamp_ms(),
        })
    }

    /// The trimmed prompt, original casing preserved.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The resolved audio source.
    #[must_use]
    pub const fn source(&self) -> &AudioSource {
        &self.source
    }

    /// The resolved kind; `Predefined` for table hits.
    #[must_use]
    pub const fn model_kind(&self) -> ModelKind {
        match self.source {
            AudioSource::Model { kind } => kind,
            AudioSource::Predefined { .. } => ModelKind::Predefined,
        }
    }

    /// The requesting user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Admission time in Unix milliseconds.
    #[must_use]
    pub const fn requested_at(&self) -> u64 {
        self.requested_at
    }
}

/// The outcome of a successful generation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// Publicly resolvable URL of the audio asset.
    pub audio_url: String,
    /// Kind that produced the asset.
    pub source_kind: ModelKind,
    /// Id of the history record written for this result, if one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_id: Option<HistoryId>,
}

impl GenerationResult {
    /// Build a result.
    pub fn new(
        audio_url: impl Into<String>,
        source_kind: ModelKind,
        history_id: Option<HistoryId>,
    ) -> Self {
        Self {
            audio_url: audio_url.into(),
            source_kind,
            history_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PredefinedTable {
        PredefinedTable::default()
    }

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("musicgen".parse::<ModelKind>(), Ok(ModelKind::Music));
        assert_eq!("AudioGen".parse::<ModelKind>(), Ok(ModelKind::SoundEffect));
        assert_eq!("sound-effect".parse::<ModelKind>(), Ok(ModelKind::SoundEffect));
        assert_eq!("text_to_speech".parse::<ModelKind>(), Ok(ModelKind::Speech));
        assert_eq!("predefined".parse::<ModelKind>(), Ok(ModelKind::Predefined));
        assert_eq!(
            "riffusion".parse::<ModelKind>(),
            Err(ValidationError::UnknownModel("riffusion".into()))
        );
    }

    #[test]
    fn test_model_kind_serde_uses_wire_names() {
        let json = serde_json::to_string(&ModelKind::SoundEffect).unwrap();
        assert_eq!(json, "\"audiogen\"");
        let kind: ModelKind = serde_json::from_str("\"speech\"").unwrap();
        assert_eq!(kind, ModelKind::Speech);
    }

    #[test]
    fn test_durations() {
        assert_eq!(ModelKind::Music.default_duration_secs(), Some(10));
        assert_eq!(ModelKind::SoundEffect.default_duration_secs(), Some(6));
        assert_eq!(ModelKind::Speech.default_duration_secs(), None);
        assert!(!ModelKind::Predefined.is_generative());
    }

    #[test]
    fn test_user_id_from_number_or_string() {
        let a: UserId = serde_json::from_str("42").unwrap();
        let b: UserId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"42\"");
    }

    #[test]
    fn test_admit_trims_and_keeps_casing() {
        let req = GenerationRequest::admit(
            "  A Thunderstorm over Mountains \n",
            ModelKind::Music,
            "7".into(),
            &table(),
        )
        .unwrap();
        assert_eq!(req.prompt(), "A Thunderstorm over Mountains");
        assert_eq!(req.model_kind(), ModelKind::Music);
        assert!(req.requested_at() > 0);
    }

    #[test]
    fn test_admit_rejects_blank_input() {
        assert_eq!(
            GenerationRequest::admit("   ", ModelKind::Music, "7".into(), &table()),
            Err(ValidationError::EmptyPrompt)
        );
        assert_eq!(
            GenerationRequest::admit("rain", ModelKind::Music, " ".into(), &table()),
            Err(ValidationError::MissingUserId)
        );
    }

    #[test]
    fn test_admit_predefined_overrides_client_kind() {
        let req =
            GenerationRequest::admit(" RAIN ", ModelKind::Speech, "7".into(), &table()).unwrap();
        assert_eq!(req.model_kind(), ModelKind::Predefined);
        assert!(matches!(req.source(), AudioSource::Predefined { .. }));
        assert_eq!(req.prompt(), "RAIN");
    }

    #[test]
    fn test_admit_predefined_kind_without_entry() {
        assert_eq!(
            GenerationRequest::admit("volcano", ModelKind::Predefined, "7".into(), &table()),
            Err(ValidationError::NotPredefined("volcano".into()))
        );
    }
}
