#![cfg_attr(docsrs, feature(doc_cfg))]
//! SoundScape turns natural-language prompts into generated audio assets.
//!
//! # Architecture
//!
//! The crate is organized around a single generation pipeline and the
//! collaborators it drives:
//!
//! - **Model Adapter** ([`model`]) - Opaque text-to-audio capability
//! - **Asset Store** ([`asset`]) - Durable object storage for generated WAV files
//! - **History Store** ([`history`]) - Per-user record of past generations
//! - **Pipeline** ([`pipeline`]) - Predefined fast path, synthesis, upload, bookkeeping
//! - **Session** ([`session`]) - One in-flight generation per user, with cancellation
//! - **API** ([`api`]) - HTTP-shaped request/response boundary
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use soundscape::prelude::*;
//!
//! let pipeline = Arc::new(GenerationPipeline::new(
//!     Arc::new(ToneModel::new()),
//!     Arc::new(MemoryAssetStore::new("https://cdn.example.com")),
//!     Arc::new(MemoryHistoryStore::new()),
//! ));
//! let session = SessionController::new("42", pipeline, Arc::new(PredefinedTable::default()));
//! let outcome = session.start("rain on a tin roof", ModelKind::SoundEffect).await?;
//! ```
//!
//! # Features
//!
//! - `sqlite` - Durable history store backed by `rusqlite` (enabled by default)

pub mod api;
pub mod asset;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod pipeline;
pub mod predefined;
pub mod prelude;
pub mod request;
pub mod session;
pub mod util;

pub use error::{Error, Result};
