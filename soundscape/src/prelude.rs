//! Commonly used types, for glob import.

pub use crate::api::{ApiResponse, GenerateSoundRequest, GenerateSoundResponse, SoundscapeService};
pub use crate::asset::{AssetKey, AssetStore, FileAssetStore, HttpObjectStore, MemoryAssetStore};
pub use crate::config::{SoundscapeConfig, load_config};
pub use crate::error::{Error, PipelineError, Result, SessionError, ValidationError};
pub use crate::history::{HistoryId, HistoryRecord, HistoryStore, MemoryHistoryStore};
pub use crate::model::{AudioModel, HttpAudioModel, ToneModel};
pub use crate::pipeline::GenerationPipeline;
pub use crate::predefined::PredefinedTable;
pub use crate::request::{GenerationRequest, GenerationResult, ModelKind, UserId};
pub use crate::session::{SessionController, SessionOutcome, SessionPhase, SessionState};

#[cfg(feature = "sqlite")]
pub use crate::history::SqliteHistoryStore;
