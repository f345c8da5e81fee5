//! Unified error types for soundscape.
//!
//! Each subsystem has its own error enum and result alias. All of them
//! convert into the crate-level [`Error`] so callers that do not care about
//! the distinction can use `?` freely.

use crate::history::HistoryId;
use crate::request::{GenerationResult, ModelKind, UserId};

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type for soundscape operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request admission error.
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    /// Generation pipeline error.
    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    /// Session controller error.
    #[error("session: {0}")]
    Session(#[from] SessionError),

    /// Model adapter error.
    #[error("model: {0}")]
    Model(#[from] ModelError),

    /// Asset store error.
    #[error("asset store: {0}")]
    Store(#[from] StoreError),

    /// History store error.
    #[error("history: {0}")]
    History(#[from] HistoryError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error from a string.
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(ConfigError::Invalid(msg.into()))
    }
}

/// Result type alias for soundscape operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Validation Errors
// ============================================================================

/// A request rejected before it reaches the pipeline. Nothing is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Prompt was missing or blank after trimming.
    #[error("Prompt is required")]
    EmptyPrompt,

    /// User identifier was missing or blank.
    #[error("userId is required")]
    MissingUserId,

    /// Model name not recognized.
    #[error(
        "Invalid model '{0}'. Choose 'musicgen', 'audiogen', 'text_to_speech', or 'predefined'."
    )]
    UnknownModel(String),

    /// The predefined kind was requested for a prompt with no fixed asset.
    #[error("no predefined sound matches prompt '{0}'")]
    NotPredefined(String),
}

// ============================================================================
// Model Adapter Errors
// ============================================================================

/// Error type for model adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The adapter cannot serve this kind of request.
    #[error("model kind '{0}' is not supported by this adapter")]
    Unsupported(ModelKind),

    /// The backing model is not reachable or not loaded.
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// The request exceeded the adapter's timeout.
    #[error("generation timed out after {0}s")]
    Timeout(u64),

    /// The model server answered with a non-success status.
    #[error("model server returned HTTP {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Transport-level failure.
    #[error("request error: {0}")]
    Request(String),

    /// The model produced something that is not a WAV payload.
    #[error("model returned non-audio output: {0}")]
    InvalidOutput(String),
}

impl ModelError {
    /// Returns `true` if retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Request(_) | Self::Unavailable(_) => true,
            Self::Api { status, .. } => matches!(*status, 429 | 500 | 502 | 503 | 504),
            Self::Unsupported(_) | Self::InvalidOutput(_) => false,
        }
    }
}

/// Result type for model adapter operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

// ============================================================================
// Asset Store Errors
// ============================================================================

/// Error type for asset store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failure talking to the object store.
    #[error("request error: {0}")]
    Request(String),

    /// The object store refused the upload.
    #[error("upload rejected with HTTP {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// An object already exists under the key.
    #[error("object already exists: {0}")]
    KeyExists(String),
}

/// Result type for asset store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// History Store Errors
// ============================================================================

/// Error type for history store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HistoryError {
    /// No record with this id belongs to the user.
    #[error("history entry {id} not found for user {user_id}")]
    NotFound {
        /// Owner the lookup was scoped to.
        user_id: UserId,
        /// Requested record id.
        id: HistoryId,
    },

    /// The storage backend encountered an error.
    #[error("[{backend}] {message}")]
    Storage {
        /// Backend identifier (e.g., `"sqlite"`).
        backend: &'static str,
        /// Human-readable error description.
        message: String,
    },

    /// Failed to acquire a lock.
    #[error("lock error: {0}")]
    Lock(String),

    /// A blocking task failed to join.
    #[error("task error: {0}")]
    Task(String),
}

impl HistoryError {
    /// Creates a [`Storage`](Self::Storage) error for the given backend.
    #[must_use]
    pub fn storage(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            backend,
            message: message.into(),
        }
    }

    /// Returns `true` if this is a transient error that may succeed on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Lock(_) | Self::Task(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::storage("sqlite", e.to_string())
    }
}

/// Result type for history store operations.
pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Failure modes of a single pipeline execution.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The model adapter failed. No asset or history was written.
    #[error("Audio generation failed: {0}")]
    GenerationFailed(#[source] ModelError),

    /// The upload failed. No history was written.
    #[error("Failed to store generated audio: {0}")]
    StorageFailed(#[source] StoreError),

    /// The asset exists and `result` is usable, but the history entry was lost.
    #[error("Audio is ready but could not be saved to history: {source}")]
    HistoryWriteFailed {
        /// The still-valid generation result.
        result: GenerationResult,
        /// Underlying history failure.
        #[source]
        source: HistoryError,
    },

    /// The caller cancelled before anything was committed.
    #[error("Generation cancelled.")]
    Cancelled,

    /// The task writing the asset and history record died before finishing.
    #[error("Commit task failed: {0}")]
    CommitAborted(String),
}

impl PipelineError {
    /// The usable result carried by a non-fatal failure, if any.
    #[must_use]
    pub const fn result(&self) -> Option<&GenerationResult> {
        match self {
            Self::HistoryWriteFailed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Returns `true` for the cancellation outcome.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

// ============================================================================
// Session Errors
// ============================================================================

/// Error type for session controller operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A generation is already in flight for this session.
    #[error("a generation is already in progress; cancel it first")]
    Busy,

    /// The prompt or model was rejected at admission.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Reading or deleting history failed.
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Result type for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing required field.
    #[error("missing: {0}")]
    Missing(String),

    /// Invalid value.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a missing field error.
    #[inline]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing(field.into())
    }

    /// Create an invalid value error.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// Tests
// ============================================================================
