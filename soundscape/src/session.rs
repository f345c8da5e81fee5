//! Session controller: one in-flight generation per user session.
//!
//! The controller is the only place a [`SessionState`] changes. Its phases
//! follow a small state machine:
//!
//! ```text
//! Idle --start--> Generating --success--> Succeeded --> Idle
//!                            --cancel---> Cancelled --> Idle
//!                            --failure--> Failed    --> Idle
//! ```
//!
//! Terminal phases are published on the [`subscribe`](SessionController::subscribe)
//! feed and immediately fall back to `Idle`, so the session always accepts
//! the next `start`. A `start` while `Generating` is rejected with
//! [`SessionError::Busy`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, SessionError, SessionResult};
use crate::history::{HistoryId, HistoryRecord};
use crate::pipeline::GenerationPipeline;
use crate::predefined::PredefinedTable;
use crate::request::{GenerationRequest, GenerationResult, ModelKind, UserId};

const EVENT_CAPACITY: usize = 16;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Ready for a new generation.
    #[default]
    Idle,
    /// A generation is in flight.
    Generating,
    /// The last generation finished and its record is visible.
    Succeeded,
    /// The last generation was cancelled by the caller.
    Cancelled,
    /// The last generation failed.
    Failed(String),
}

impl SessionPhase {
    /// Whether a generation is in flight.
    #[must_use]
    pub const fn is_generating(&self) -> bool {
        matches!(self, Self::Generating)
    }

    /// Whether this is one of the short-lived outcome phases.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Cancelled | Self::Failed(_))
    }
}

/// Snapshot of a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    /// Current phase.
    #[serde(flatten)]
    pub phase: SessionPhase,
    /// The in-flight request while `Generating`.
    pub current_request: Option<GenerationRequest>,
    /// The asset currently loaded for playback.
    pub audio_url: Option<String>,
    /// Non-fatal warning from the last generation.
    pub warning: Option<String>,
}

/// What a finished [`SessionController::start`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// `Succeeded`, `Cancelled` or `Failed`.
    pub phase: SessionPhase,
    /// The generation result, present whenever an asset was committed.
    ///
    /// A generation cancelled after its upload still carries its result.
    pub result: Option<GenerationResult>,
    /// Non-fatal warning, e.g. a lost history entry.
    pub warning: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    cancel: Option<CancellationToken>,
    history: Vec<HistoryRecord>,
    /// Number of history reads started.
    refresh_seq: u64,
    /// Sequence number of the read `history` came from.
    applied_seq: u64,
}

/// Client-facing controller for a single user's session.
pub struct SessionController {
    user_id: UserId,
    pipeline: Arc<GenerationPipeline>,
    predefined: Arc<PredefinedTable>,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionPhase>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("user_id", &self.user_id)
            .field("phase", &self.lock().state.phase)
            .finish_non_exhaustive()
    }
}

/// Settles the session as cancelled if a `start` future is dropped mid-flight.
struct InFlight<'a> {
    session: &'a SessionController,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(user_id = %self.session.user_id, "generation abandoned by caller");
            self.session.settle(SessionPhase::Cancelled, None, None);
        }
    }
}

impl SessionController {
    /// Create an idle session for `user_id`.
    pub fn new(
        user_id: impl Into<UserId>,
        pipeline: Arc<GenerationPipeline>,
        predefined: Arc<PredefinedTable>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            user_id: user_id.into(),
            pipeline,
            predefined,
            inner: Mutex::default(),
            events,
        }
    }

    /// The user this session belongs to.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Current state snapshot.
    #[must_use]
    pub fn observe(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// Whether a generation is in flight.
    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.lock().state.phase.is_generating()
    }

    /// Feed of every phase transition, including the short-lived outcomes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionPhase> {
        self.events.subscribe()
    }

    /// The history list as of the last refresh, most recent first.
    #[must_use]
    pub fn visible_history(&self) -> Vec<HistoryRecord> {
        self.lock().history.clone()
    }

    /// Run one generation and wait for its outcome.
    ///
    /// On success the visible history is refreshed before `Succeeded` is
    /// published, so the new record is already listed by then.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Invalid`] if the prompt or kind fails admission (state unchanged)
    /// - [`SessionError::Busy`] if a generation is already in flight
    ///
    /// Pipeline failures are not errors here; they come back as a
    /// `Failed` or `Cancelled` outcome.
    pub async fn start(&self, prompt: &str, kind: ModelKind) -> SessionResult<SessionOutcome> {
        let request =
            GenerationRequest::admit(prompt, kind, self.user_id.clone(), &self.predefined)?;
        let token = self.begin(&request)?;
        let mut in_flight = InFlight {
            session: self,
            settled: false,
        };

        let executed = self.pipeline.execute(&request, &token).await;
        let cancelled = token.is_cancelled();

        let (phase, result, warning) = match executed {
            Ok(result) => {
                self.refresh_after_commit().await;
                (Self::committed_phase(cancelled), Some(result), None)
            }
            Err(PipelineError::HistoryWriteFailed { result, source }) => {
                self.refresh_after_commit().await;
                (
                    Self::committed_phase(cancelled),
                    Some(result),
                    Some(format!("Audio is ready but was not saved to history: {source}")),
                )
            }
            Err(PipelineError::Cancelled) => (SessionPhase::Cancelled, None, None),
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "generation failed");
                (SessionPhase::Failed(e.to_string()), None, None)
            }
        };

        let audio_url = match phase {
            SessionPhase::Succeeded => result.as_ref().map(|r| r.audio_url.clone()),
            _ => None,
        };
        in_flight.settled = true;
        self.settle(phase.clone(), audio_url, warning.clone());

        Ok(SessionOutcome {
            phase,
            result,
            warning,
        })
    }

    /// Generate again from an existing record. Always creates a new record.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn regenerate(&self, record: &HistoryRecord) -> SessionResult<SessionOutcome> {
        info!(user_id = %self.user_id, history_id = record.id, "regenerating");
        self.start(&record.prompt, record.model_kind).await
    }

    /// Request cancellation of the in-flight generation.
    ///
    /// Returns `false` when nothing is in flight. Cancellation is advisory:
    /// an asset that is already being stored is kept, only the visible
    /// outcome becomes `Cancelled`.
    pub fn cancel(&self) -> bool {
        let inner = self.lock();
        match (&inner.state.phase, &inner.cancel) {
            (SessionPhase::Generating, Some(token)) => {
                info!(user_id = %self.user_id, "cancellation requested");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Reload the visible history from the store.
    ///
    /// Concurrent refreshes may finish out of order; the visible list only
    /// moves to a read that started after the one it currently shows.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::History`] if the store cannot be read.
    pub async fn refresh_history(&self) -> SessionResult<Vec<HistoryRecord>> {
        let seq = {
            let mut inner = self.lock();
            inner.refresh_seq += 1;
            inner.refresh_seq
        };
        let records = self.pipeline.history().list(&self.user_id).await?;

        let mut inner = self.lock();
        if seq > inner.applied_seq {
            inner.applied_seq = seq;
            inner.history.clone_from(&records);
        } else {
            debug!(user_id = %self.user_id, seq, "discarding stale history refresh");
        }
        Ok(records)
    }

    /// Look up one of this user's records.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::History`] if the store cannot be read.
    pub async fn record(&self, id: HistoryId) -> SessionResult<Option<HistoryRecord>> {
        Ok(self.pipeline.history().get(&self.user_id, id).await?)
    }

    /// Delete one of this user's records and refresh the visible history.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::History`] wrapping `NotFound` for unknown ids.
    pub async fn delete(&self, id: HistoryId) -> SessionResult<()> {
        self.pipeline.history().delete(&self.user_id, id).await?;
        info!(user_id = %self.user_id, history_id = id, "history entry deleted");
        self.refresh_history().await?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    const fn committed_phase(cancelled: bool) -> SessionPhase {
        if cancelled {
            SessionPhase::Cancelled
        } else {
            SessionPhase::Succeeded
        }
    }

    fn begin(&self, request: &GenerationRequest) -> SessionResult<CancellationToken> {
        let mut inner = self.lock();
        if inner.state.phase.is_generating() {
            debug!(user_id = %self.user_id, "start rejected, generation in flight");
            return Err(SessionError::Busy);
        }

        let token = CancellationToken::new();
        inner.state.phase = SessionPhase::Generating;
        inner.state.current_request = Some(request.clone());
        inner.state.warning = None;
        inner.cancel = Some(token.clone());
        let _ = self.events.send(SessionPhase::Generating);
        Ok(token)
    }

    async fn refresh_after_commit(&self) {
        if let Err(e) = self.refresh_history().await {
            warn!(user_id = %self.user_id, error = %e, "history refresh failed");
        }
    }

    fn settle(&self, phase: SessionPhase, audio_url: Option<String>, warning: Option<String>) {
        let mut inner = self.lock();
        if audio_url.is_some() {
            inner.state.audio_url = audio_url;
        }
        inner.state.warning = warning;
        inner.state.phase = phase.clone();
        let _ = self.events.send(phase);

        inner.state.phase = SessionPhase::Idle;
        inner.state.current_request = None;
        inner.cancel = None;
        let _ = self.events.send(SessionPhase::Idle);
    }
}
