//! Configuration loading and component wiring.
//!
//! Configuration is a single JSON file. Missing files and missing fields
//! fall back to defaults, then environment overrides are applied:
//!
//! | Variable                | Overrides                         |
//! |-------------------------|-----------------------------------|
//! | `SOUNDSCAPE_MODEL_URL`  | `model.endpoint`                  |
//! | `SOUNDSCAPE_ASSET_DIR`  | local asset directory             |
//! | `SOUNDSCAPE_DB_PATH`    | sqlite history path               |
//! | `SOUNDSCAPE_PUBLIC_URL` | `storage.public_base_url`         |

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::asset::{DEFAULT_KEY_PREFIX, FileAssetStore, HttpObjectStore, SharedAssetStore};
use crate::error::{ConfigError, ConfigResult, Result};
use crate::history::{MemoryHistoryStore, SharedHistoryStore};
use crate::model::{DurationTable, HttpAudioModel, SharedAudioModel, ToneModel};
use crate::pipeline::GenerationPipeline;
use crate::predefined::{DEFAULT_PREDEFINED, PredefinedTable};
use crate::request::ModelKind;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SOUNDSCAPE_CONFIG";
/// Environment variable overriding the model endpoint.
pub const MODEL_URL_ENV: &str = "SOUNDSCAPE_MODEL_URL";
/// Environment variable overriding the local asset directory.
pub const ASSET_DIR_ENV: &str = "SOUNDSCAPE_ASSET_DIR";
/// Environment variable overriding the sqlite history path.
pub const DB_PATH_ENV: &str = "SOUNDSCAPE_DB_PATH";
/// Environment variable overriding the public base URL.
pub const PUBLIC_URL_ENV: &str = "SOUNDSCAPE_PUBLIC_URL";

const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:5000";

/// Directory holding the config file.
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("soundscape")
}

/// Default config file location.
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Directory for generated assets and the history database.
#[must_use]
pub fn data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("soundscape")
}

// ============================================================================
// Sections
// ============================================================================

/// Where generated audio is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetBackend {
    /// Files under a local directory, served by an external web server.
    Local {
        /// Root directory; keys are relative to it.
        dir: PathBuf,
    },
    /// An HTTP object store accepting `PUT <upload_url>/<key>`.
    Http {
        /// Upload base URL.
        upload_url: String,
        /// Optional bearer token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
}

impl Default for AssetBackend {
    fn default() -> Self {
        Self::Local {
            dir: data_dir().join("assets"),
        }
    }
}

/// Asset storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend.
    pub backend: AssetBackend,
    /// Key prefix for generated assets.
    pub key_prefix: String,
    /// Base URL clients use to fetch assets.
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: AssetBackend::default(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
        }
    }
}

/// History backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum HistoryConfig {
    /// Process-local, lost on exit.
    Memory,
    /// SQLite database file.
    Sqlite {
        /// Database path.
        path: PathBuf,
    },
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: data_dir().join("history.db"),
        }
    }
}

/// Model adapter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Inference endpoint. Without one the offline tone model is used.
    pub endpoint: Option<String>,
    /// Bearer token for the endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Music clip length in seconds.
    pub music_duration_secs: u32,
    /// Sound effect clip length in seconds.
    pub sound_effect_duration_secs: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: crate::model::DEFAULT_TIMEOUT_SECS,
            music_duration_secs: ModelKind::Music.default_duration_secs().unwrap_or(10),
            sound_effect_duration_secs: ModelKind::SoundEffect
                .default_duration_secs()
                .unwrap_or(6),
        }
    }
}

impl ModelConfig {
    /// Duration table for the adapter.
    #[must_use]
    pub fn durations(&self) -> DurationTable {
        DurationTable::default()
            .with(ModelKind::Music, self.music_duration_secs)
            .with(ModelKind::SoundEffect, self.sound_effect_duration_secs)
    }
}

// ============================================================================
// Root
// ============================================================================

/// Complete configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundscapeConfig {
    /// Asset storage.
    pub storage: StorageConfig,
    /// History storage.
    pub history: HistoryConfig,
    /// Model adapter.
    pub model: ModelConfig,
    /// Predefined prompt to URL table.
    pub predefined: BTreeMap<String, String>,
}

impl Default for SoundscapeConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            history: HistoryConfig::default(),
            model: ModelConfig::default(),
            predefined: DEFAULT_PREDEFINED
                .iter()
                .map(|(prompt, url)| ((*prompt).to_string(), (*url).to_string()))
                .collect(),
        }
    }
}

/// Severity of a [`ConfigIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    /// Usable, but probably not what was intended.
    Warning,
    /// The pipeline cannot be built from this config.
    Error,
}

/// One finding from [`SoundscapeConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    /// Severity.
    pub level: IssueLevel,
    /// Human-readable description.
    pub message: String,
}

impl ConfigIssue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            IssueLevel::Warning => write!(f, "warning: {}", self.message),
            IssueLevel::Error => write!(f, "error: {}", self.message),
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl SoundscapeConfig {
    /// Apply `SOUNDSCAPE_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(MODEL_URL_ENV) {
            debug!(endpoint = %url, "model endpoint overridden from environment");
            self.model.endpoint = Some(url);
        }
        if let Some(dir) = get(ASSET_DIR_ENV) {
            self.storage.backend = AssetBackend::Local { dir: dir.into() };
        }
        if let Some(path) = get(DB_PATH_ENV) {
            self.history = HistoryConfig::Sqlite { path: path.into() };
        }
        if let Some(url) = get(PUBLIC_URL_ENV) {
            self.storage.public_base_url = url;
        }
    }

    /// Check the config for problems. An empty list means all clear.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        let prefix = &self.storage.key_prefix;
        if prefix.trim().is_empty() {
            issues.push(ConfigIssue::error("storage.key_prefix is empty"));
        } else if prefix.split('/').any(|part| part == "..") {
            issues.push(ConfigIssue::error(format!(
                "storage.key_prefix must not contain '..': {prefix}"
            )));
        }
        if !is_http_url(&self.storage.public_base_url) {
            issues.push(ConfigIssue::error(format!(
                "storage.public_base_url is not an http(s) URL: {}",
                self.storage.public_base_url
            )));
        }
        if let AssetBackend::Http { upload_url, .. } = &self.storage.backend
            && !is_http_url(upload_url)
        {
            issues.push(ConfigIssue::error(format!(
                "storage.backend.upload_url is not an http(s) URL: {upload_url}"
            )));
        }

        match &self.history {
            HistoryConfig::Memory => {
                issues.push(ConfigIssue::warning(
                    "history backend is memory; records are lost on exit",
                ));
            }
            HistoryConfig::Sqlite { .. } if !cfg!(feature = "sqlite") => {
                issues.push(ConfigIssue::error(
                    "history backend is sqlite but the sqlite feature is disabled",
                ));
            }
            HistoryConfig::Sqlite { .. } => {}
        }

        match &self.model.endpoint {
            None => issues.push(ConfigIssue::warning(
                "model.endpoint is not set; the offline tone model will be used",
            )),
            Some(url) if !is_http_url(url) => issues.push(ConfigIssue::error(format!(
                "model.endpoint is not an http(s) URL: {url}"
            ))),
            Some(_) => {}
        }
        if self.model.timeout_secs == 0 {
            issues.push(ConfigIssue::error("model.timeout_secs must be positive"));
        }
        if self.model.music_duration_secs == 0 || self.model.sound_effect_duration_secs == 0 {
            issues.push(ConfigIssue::error("model durations must be positive"));
        }

        for (prompt, url) in &self.predefined {
            if prompt.trim().is_empty() {
                issues.push(ConfigIssue::error("predefined table has an empty prompt"));
            }
            if url.trim().is_empty() {
                issues.push(ConfigIssue::error(format!(
                    "predefined prompt '{prompt}' has no URL"
                )));
            }
        }

        issues
    }

    /// Whether [`validate`](Self::validate) reports no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate()
            .iter()
            .all(|issue| issue.level != IssueLevel::Error)
    }

    /// The predefined table this config describes.
    #[must_use]
    pub fn predefined_table(&self) -> PredefinedTable {
        self.predefined.iter().collect()
    }

    /// Build the model adapter.
    ///
    /// # Errors
    ///
    /// Returns a model error if the HTTP client cannot be built.
    pub fn build_model(&self) -> Result<SharedAudioModel> {
        let durations = self.model.durations();
        let Some(endpoint) = &self.model.endpoint else {
            info!("no model endpoint configured, using tone model");
            return Ok(Arc::new(ToneModel::new().with_durations(durations)));
        };

        let mut model =
            HttpAudioModel::new(endpoint, self.model.timeout_secs)?.with_durations(durations);
        if let Some(key) = &self.model.api_key {
            model = model.with_api_key(key);
        }
        Ok(Arc::new(model))
    }

    /// Build the asset store.
    ///
    /// # Errors
    ///
    /// Returns a store error if the HTTP client cannot be built.
    pub fn build_asset_store(&self) -> Result<SharedAssetStore> {
        let base = &self.storage.public_base_url;
        Ok(match &self.storage.backend {
            AssetBackend::Local { dir } => Arc::new(FileAssetStore::new(dir, base)),
            AssetBackend::Http { upload_url, token } => {
                let mut store = HttpObjectStore::new(upload_url, base)?;
                if let Some(token) = token {
                    store = store.with_token(token);
                }
                Arc::new(store)
            }
        })
    }

    /// Build the history store.
    ///
    /// # Errors
    ///
    /// Returns a history error if the database cannot be opened, or a config
    /// error if sqlite was requested without the `sqlite` feature.
    pub fn build_history_store(&self) -> Result<SharedHistoryStore> {
        match &self.history {
            HistoryConfig::Memory => Ok(Arc::new(MemoryHistoryStore::new())),
            #[cfg(feature = "sqlite")]
            HistoryConfig::Sqlite { path } => Ok(Arc::new(
                crate::history::SqliteHistoryStore::open(path)?,
            )),
            #[cfg(not(feature = "sqlite"))]
            HistoryConfig::Sqlite { .. } => Err(crate::Error::config(
                "sqlite history requires the `sqlite` feature",
            )),
        }
    }

    /// Build a pipeline from every section.
    ///
    /// # Errors
    ///
    /// Returns the first component that fails to build.
    pub fn build_pipeline(&self) -> Result<GenerationPipeline> {
        let pipeline = GenerationPipeline::new(
            self.build_model()?,
            self.build_asset_store()?,
            self.build_history_store()?,
        )
        .with_key_prefix(&self.storage.key_prefix);
        debug!(pipeline = ?pipeline, "pipeline built from config");
        Ok(pipeline)
    }
}

// ============================================================================
// Files
// ============================================================================

/// Load the config from `path` (or the default location) and apply env overrides.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_config(path: Option<&Path>) -> ConfigResult<SoundscapeConfig> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let mut config = match tokio::fs::read_to_string(&path).await {
        Ok(content) => serde_json::from_str(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            SoundscapeConfig::default()
        }
        Err(e) => return Err(e.into()),
    };
    config.apply_env();
    Ok(config)
}

/// Write `config` as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn save_config(config: &SoundscapeConfig, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content).await?;
    info!(path = %path.display(), "config saved");
    Ok(())
}

/// Write a default config file unless one exists (or `force` is set).
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the file exists and `force` is false.
pub async fn init_config(path: &Path, force: bool) -> ConfigResult<SoundscapeConfig> {
    if !force && tokio::fs::try_exists(path).await? {
        return Err(ConfigError::invalid(format!(
            "{} already exists",
            path.display()
        )));
    }
    let config = SoundscapeConfig::default();
    save_config(&config, path).await?;
    Ok(config)
}
