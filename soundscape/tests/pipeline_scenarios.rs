//! End-to-end scenarios over the pipeline and session controller, driven by
//! recording fakes that count every side effect.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use soundscape::asset::{AssetKey, AssetStore};
use soundscape::error::{
    HistoryError, HistoryResult, ModelError, ModelResult, PipelineError, SessionError,
    StoreError, StoreResult,
};
use soundscape::history::{
    HistoryId, HistoryRecord, HistoryStore, MemoryHistoryStore, NewHistoryRecord,
};
use soundscape::model::{AudioModel, wav};
use soundscape::pipeline::GenerationPipeline;
use soundscape::predefined::PredefinedTable;
use soundscape::request::{GenerationRequest, ModelKind, UserId};
use soundscape::session::{SessionController, SessionPhase};

// ============================================================================
// Fakes
// ============================================================================

/// Pauses a fake until the test releases it.
#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct RecordingModel {
    calls: AtomicUsize,
    fail: bool,
    gate: Option<Arc<Gate>>,
    raw: Option<Vec<u8>>,
}

impl RecordingModel {
    fn returning(bytes: &[u8]) -> Self {
        Self {
            raw: Some(bytes.to_vec()),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn gated(gate: &Arc<Gate>) -> Self {
        Self {
            gate: Some(Arc::clone(gate)),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioModel for RecordingModel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn generate(&self, _prompt: &str, _kind: ModelKind) -> ModelResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if self.fail {
            return Err(ModelError::Unavailable("model is not loaded".into()));
        }
        if let Some(raw) = &self.raw {
            return Ok(raw.clone());
        }
        wav::encode_pcm16_mono(&[0, 1200, -1200, 0], 16_000)
    }
}

#[derive(Default)]
struct RecordingAssets {
    puts: Mutex<Vec<(String, String)>>,
    fail: bool,
    gate: Option<Arc<Gate>>,
}

impl RecordingAssets {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn gated(gate: &Arc<Gate>) -> Self {
        Self {
            gate: Some(Arc::clone(gate)),
            ..Self::default()
        }
    }

    fn puts(&self) -> Vec<(String, String)> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for RecordingAssets {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn put(&self, key: &AssetKey, bytes: Vec<u8>, content_type: &str) -> StoreResult<String> {
        assert!(wav::is_wav(&bytes));
        self.puts
            .lock()
            .unwrap()
            .push((key.to_string(), content_type.to_string()));
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if self.fail {
            return Err(StoreError::Rejected {
                status: 503,
                body: "bucket unavailable".into(),
            });
        }
        Ok(format!("https://cdn.test/{key}"))
    }
}

#[derive(Default)]
struct RecordingHistory {
    inner: MemoryHistoryStore,
    appends: AtomicUsize,
    lists: AtomicUsize,
    fail: bool,
    first_list_gate: Option<Arc<Gate>>,
}

impl RecordingHistory {
    /// The first `list` reads the store, then holds its answer until released.
    fn slow_first_list(gate: &Arc<Gate>) -> Self {
        Self {
            first_list_gate: Some(Arc::clone(gate)),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryStore for RecordingHistory {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn append(&self, record: NewHistoryRecord) -> HistoryResult<HistoryRecord> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(HistoryError::storage("recording", "disk full"));
        }
        self.inner.append(record).await
    }

    async fn list(&self, user_id: &UserId) -> HistoryResult<Vec<HistoryRecord>> {
        let records = self.inner.list(user_id).await;
        if self.lists.fetch_add(1, Ordering::SeqCst) == 0
            && let Some(gate) = &self.first_list_gate
        {
            gate.pass().await;
        }
        records
    }

    async fn get(&self, user_id: &UserId, id: HistoryId) -> HistoryResult<Option<HistoryRecord>> {
        self.inner.get(user_id, id).await
    }

    async fn delete(&self, user_id: &UserId, id: HistoryId) -> HistoryResult<()> {
        self.inner.delete(user_id, id).await
    }
}

struct Harness {
    model: Arc<RecordingModel>,
    assets: Arc<RecordingAssets>,
    history: Arc<RecordingHistory>,
    pipeline: Arc<GenerationPipeline>,
    session: Arc<SessionController>,
}

fn harness(model: RecordingModel, assets: RecordingAssets, history: RecordingHistory) -> Harness {
    let model = Arc::new(model);
    let assets = Arc::new(assets);
    let history = Arc::new(history);
    let pipeline = Arc::new(GenerationPipeline::new(
        model.clone(),
        assets.clone(),
        history.clone(),
    ));
    let session = Arc::new(SessionController::new(
        "1",
        Arc::clone(&pipeline),
        Arc::new(PredefinedTable::default()),
    ));
    Harness {
        model,
        assets,
        history,
        pipeline,
        session,
    }
}

fn default_harness() -> Harness {
    harness(
        RecordingModel::default(),
        RecordingAssets::default(),
        RecordingHistory::default(),
    )
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn rain_uses_predefined_asset_without_model() {
    let h = default_harness();

    let outcome = h.session.start("Rain", ModelKind::Music).await.unwrap();

    assert_eq!(outcome.phase, SessionPhase::Succeeded);
    let result = outcome.result.unwrap();
    assert_eq!(
        result.audio_url,
        "https://assets.mixkit.co/music/preview/mixkit-rain-and-thunder-1255.mp3"
    );
    assert_eq!(result.source_kind, ModelKind::Predefined);
    assert_eq!(h.model.calls(), 0);
    assert!(h.assets.puts().is_empty());

    let records = h.session.visible_history();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].model_kind, ModelKind::Predefined);
    assert_eq!(records[0].prompt, "Rain");
}

#[tokio::test]
async fn model_generation_puts_once_and_records() {
    let h = default_harness();
    let request = GenerationRequest::admit(
        "a thunderstorm over mountains",
        "musicgen".parse().unwrap(),
        "1".into(),
        &PredefinedTable::default(),
    )
    .unwrap();

    let result = h
        .pipeline
        .execute(&request, &CancellationToken::new())
        .await
        .unwrap();

    let puts = h.assets.puts();
    assert_eq!(puts.len(), 1);
    let (key, content_type) = &puts[0];
    assert_eq!(content_type, "audio/wav");
    assert!(key.starts_with("generated_audio/"));
    assert!(key.ends_with(".wav"));
    assert_eq!(result.audio_url, format!("https://cdn.test/{key}"));

    let records = h.history.list(&"1".into()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].prompt, "a thunderstorm over mountains");
    assert_eq!(records[0].model_kind, ModelKind::Music);
    assert!(records[0].timestamp >= request.requested_at());
    assert_eq!(h.history.appends(), 1);
}

#[tokio::test]
async fn concurrent_generations_use_distinct_keys() {
    let h = default_harness();
    let other = SessionController::new(
        "2",
        Arc::clone(&h.pipeline),
        Arc::new(PredefinedTable::default()),
    );

    let (a, b) = tokio::join!(
        h.session.start("waves", ModelKind::SoundEffect),
        other.start("waves", ModelKind::SoundEffect),
    );
    let a = a.unwrap().result.unwrap();
    let b = b.unwrap().result.unwrap();

    assert_ne!(a.audio_url, b.audio_url);
    assert_eq!(h.assets.puts().len(), 2);
    assert_eq!(h.session.visible_history().len(), 1);
    assert_eq!(other.visible_history().len(), 1);
}

#[tokio::test]
async fn adapter_failure_writes_nothing() {
    let h = harness(
        RecordingModel::failing(),
        RecordingAssets::default(),
        RecordingHistory::default(),
    );
    let mut events = h.session.subscribe();

    let outcome = h.session.start("engine hum", ModelKind::Music).await.unwrap();

    assert!(matches!(
        outcome.phase,
        SessionPhase::Failed(ref reason) if reason.contains("not loaded")
    ));
    assert!(outcome.result.is_none());
    assert_eq!(h.model.calls(), 1);
    assert!(h.assets.puts().is_empty());
    assert_eq!(h.history.appends(), 0);

    assert_eq!(events.recv().await.unwrap(), SessionPhase::Generating);
    assert!(matches!(events.recv().await.unwrap(), SessionPhase::Failed(_)));
    assert_eq!(events.recv().await.unwrap(), SessionPhase::Idle);
    assert_eq!(h.session.observe().phase, SessionPhase::Idle);
}

#[tokio::test]
async fn header_only_audio_is_rejected_before_upload() {
    let h = harness(
        RecordingModel::returning(b"RIFF\0\0\0\0WAVE"),
        RecordingAssets::default(),
        RecordingHistory::default(),
    );
    let request = GenerationRequest::admit(
        "engine hum",
        ModelKind::Music,
        "1".into(),
        &PredefinedTable::default(),
    )
    .unwrap();

    let err = h
        .pipeline
        .execute(&request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::GenerationFailed(ModelError::InvalidOutput(_))
    ));
    assert!(h.assets.puts().is_empty());
    assert_eq!(h.history.appends(), 0);
}

#[tokio::test]
async fn storage_failure_skips_history() {
    let h = harness(
        RecordingModel::default(),
        RecordingAssets::failing(),
        RecordingHistory::default(),
    );

    let outcome = h.session.start("engine hum", ModelKind::Music).await.unwrap();

    assert!(matches!(outcome.phase, SessionPhase::Failed(_)));
    assert_eq!(h.assets.puts().len(), 1);
    assert_eq!(h.history.appends(), 0);
    assert!(h.session.observe().audio_url.is_none());
}

#[tokio::test]
async fn history_failure_still_returns_audio() {
    let h = harness(
        RecordingModel::default(),
        RecordingAssets::default(),
        RecordingHistory::failing(),
    );

    let outcome = h.session.start("crackling fire", ModelKind::SoundEffect).await.unwrap();

    assert_eq!(outcome.phase, SessionPhase::Succeeded);
    let result = outcome.result.unwrap();
    assert!(result.history_id.is_none());
    assert!(outcome.warning.as_deref().unwrap().contains("disk full"));
    assert_eq!(h.assets.puts().len(), 1);

    let state = h.session.observe();
    assert_eq!(state.audio_url.as_deref(), Some(result.audio_url.as_str()));
    assert!(state.warning.is_some());
}

#[tokio::test]
async fn success_is_published_after_history_refresh() {
    let h = default_harness();
    let mut events = h.session.subscribe();

    let running = {
        let session = Arc::clone(&h.session);
        tokio::spawn(async move { session.start("birdsong", ModelKind::Music).await })
    };

    loop {
        match events.recv().await.unwrap() {
            SessionPhase::Succeeded => {
                let visible = h.session.visible_history();
                assert_eq!(visible.len(), 1);
                assert_eq!(visible[0].prompt, "birdsong");
                break;
            }
            SessionPhase::Generating => {}
            other => panic!("unexpected phase {other:?}"),
        }
    }
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn delete_then_list_then_delete_again() {
    let h = default_harness();
    h.session.start("ocean", ModelKind::Music).await.unwrap();
    h.session.start("low drone", ModelKind::Music).await.unwrap();
    let ids: Vec<_> = h.session.visible_history().iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids[0] > ids[1]);

    h.session.delete(ids[0]).await.unwrap();
    let remaining = h.history.list(&"1".into()).await.unwrap();
    assert!(remaining.iter().all(|r| r.id != ids[0]));

    let err = h.session.delete(ids[0]).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::History(HistoryError::NotFound { id, .. }) if id == ids[0]
    ));
}

#[tokio::test]
async fn second_start_is_rejected_while_generating() {
    let gate = Arc::new(Gate::default());
    let h = harness(
        RecordingModel::gated(&gate),
        RecordingAssets::default(),
        RecordingHistory::default(),
    );

    let running = {
        let session = Arc::clone(&h.session);
        tokio::spawn(async move { session.start("first prompt", ModelKind::Music).await })
    };
    gate.entered.notified().await;

    let err = h.session.start("second prompt", ModelKind::Music).await.unwrap_err();
    assert!(matches!(err, SessionError::Busy));
    let in_flight = h.session.observe().current_request.unwrap();
    assert_eq!(in_flight.prompt(), "first prompt");

    gate.release.notify_one();
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome.phase, SessionPhase::Succeeded);
    assert_eq!(h.model.calls(), 1);
    assert_eq!(h.history.appends(), 1);
}

#[tokio::test]
async fn cancel_before_commit_leaves_no_record() {
    let gate = Arc::new(Gate::default());
    let h = harness(
        RecordingModel::gated(&gate),
        RecordingAssets::default(),
        RecordingHistory::default(),
    );

    let running = {
        let session = Arc::clone(&h.session);
        tokio::spawn(async move { session.start("distant thunder", ModelKind::Music).await })
    };
    gate.entered.notified().await;
    assert!(h.session.cancel());

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome.phase, SessionPhase::Cancelled);
    assert!(outcome.result.is_none());
    assert!(h.assets.puts().is_empty());
    assert_eq!(h.history.appends(), 0);
    assert_eq!(h.session.observe().phase, SessionPhase::Idle);
}

#[tokio::test]
async fn cancel_after_commit_keeps_record() {
    let gate = Arc::new(Gate::default());
    let h = harness(
        RecordingModel::default(),
        RecordingAssets::gated(&gate),
        RecordingHistory::default(),
    );

    let running = {
        let session = Arc::clone(&h.session);
        tokio::spawn(async move { session.start("distant thunder", ModelKind::Music).await })
    };
    gate.entered.notified().await;
    assert!(h.session.cancel());
    gate.release.notify_one();

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome.phase, SessionPhase::Cancelled);
    assert!(outcome.result.is_some());
    assert_eq!(h.assets.puts().len(), 1);
    assert_eq!(h.history.appends(), 1);

    let state = h.session.observe();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert!(state.audio_url.is_none());
    assert_eq!(h.session.visible_history().len(), 1);
}

#[tokio::test]
async fn dropped_start_during_upload_still_records() {
    let gate = Arc::new(Gate::default());
    let h = harness(
        RecordingModel::default(),
        RecordingAssets::gated(&gate),
        RecordingHistory::default(),
    );

    {
        let start = h.session.start("drone", ModelKind::Music);
        tokio::pin!(start);
        tokio::select! {
            _ = &mut start => panic!("start finished while the upload was held"),
            () = gate.entered.notified() => {}
        }
    }
    assert_eq!(h.session.observe().phase, SessionPhase::Idle);
    assert_eq!(h.history.appends(), 0);

    gate.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.history.appends() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert_eq!(h.assets.puts().len(), 1);
    let records = h.history.list(&"1".into()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].prompt, "drone");
    let (key, _) = &h.assets.puts()[0];
    assert_eq!(
        records[0].audio_url.as_deref(),
        Some(format!("https://cdn.test/{key}").as_str())
    );
}

#[tokio::test]
async fn stale_refresh_does_not_replace_newer_history() {
    let gate = Arc::new(Gate::default());
    let h = harness(
        RecordingModel::default(),
        RecordingAssets::default(),
        RecordingHistory::slow_first_list(&gate),
    );

    let stale = {
        let session = Arc::clone(&h.session);
        tokio::spawn(async move { session.refresh_history().await })
    };
    gate.entered.notified().await;

    let outcome = h.session.start("birdsong", ModelKind::Music).await.unwrap();
    assert_eq!(outcome.phase, SessionPhase::Succeeded);
    assert_eq!(h.session.visible_history().len(), 1);

    gate.release.notify_one();
    let stale_records = stale.await.unwrap().unwrap();
    assert!(stale_records.is_empty());

    let visible = h.session.visible_history();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].prompt, "birdsong");
}

#[tokio::test]
async fn regenerate_appends_a_new_record() {
    let h = default_harness();
    h.session.start("wind", ModelKind::SoundEffect).await.unwrap();
    let original = h.session.visible_history()[0].clone();

    let outcome = h.session.regenerate(&original).await.unwrap();

    assert_eq!(outcome.phase, SessionPhase::Succeeded);
    assert_eq!(h.history.appends(), 2);
    assert_eq!(h.assets.puts().len(), 2);
    let newest = &h.session.visible_history()[0];
    assert_ne!(newest.id, original.id);
    assert_eq!(newest.model_kind, ModelKind::SoundEffect);
}
