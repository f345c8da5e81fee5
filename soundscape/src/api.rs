//! HTTP-shaped service boundary.
//!
//! [`SoundscapeService`] maps requests to `(status, JSON body)` pairs without
//! binding to a web framework; a transport only has to forward method, path
//! and body to [`SoundscapeService::handle`].
//!
//! | Method   | Path                          | Success                               |
//! |----------|-------------------------------|---------------------------------------|
//! | `POST`   | `/generate-sound`             | `200 {audioFilePath, promptId?, warning?}` |
//! | `GET`    | `/history/{userId}`           | `200 [record, ...]`                   |
//! | `DELETE` | `/history/{userId}/{id}`      | `200 {message}`                       |
//! | `POST`   | `/cancel/{userId}`            | `200 {message}`                       |
//!
//! Failures carry `{error}` with 400 (validation), 404 (unknown record or
//! nothing to cancel), 409 (generation already in flight), 499 (cancelled)
//! or 500 (generation, storage or history failure).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, HistoryError, PipelineError, SessionError, ValidationError};
use crate::history::HistoryId;
use crate::pipeline::GenerationPipeline;
use crate::predefined::PredefinedTable;
use crate::request::{ModelKind, UserId};
use crate::session::{SessionController, SessionPhase};

/// Non-standard status used for client-cancelled generations.
pub const STATUS_CLIENT_CLOSED: u16 = 499;

/// Body of `POST /generate-sound`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSoundRequest {
    /// Natural-language prompt.
    pub prompt: Option<String>,
    /// Model wire name; defaults to `musicgen`.
    pub model: Option<String>,
    /// Requesting user.
    pub user_id: Option<UserId>,
}

/// Success body of `POST /generate-sound`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSoundResponse {
    /// URL of the generated or predefined audio.
    pub audio_file_path: String,
    /// Id of the history record, absent if the record could not be written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<HistoryId>,
    /// Non-fatal warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A status code and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: impl Serialize) -> Self {
        Self {
            status: 200,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    fn message(message: &str) -> Self {
        Self::ok(json!({ "message": message }))
    }

    fn error(status: u16, message: impl std::fmt::Display) -> Self {
        Self {
            status,
            body: json!({ "error": message.to_string() }),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Multi-user service holding one [`SessionController`] per generating user.
///
/// Sessions are created by `POST /generate-sound` only. History reads and
/// deletes for users without a session go straight to the history store.
pub struct SoundscapeService {
    pipeline: Arc<GenerationPipeline>,
    predefined: Arc<PredefinedTable>,
    sessions: RwLock<HashMap<UserId, Arc<SessionController>>>,
}

impl std::fmt::Debug for SoundscapeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundscapeService")
            .field("pipeline", &self.pipeline)
            .field("predefined", &self.predefined.len())
            .finish_non_exhaustive()
    }
}

impl SoundscapeService {
    /// Create a service over a shared pipeline.
    pub fn new(pipeline: Arc<GenerationPipeline>, predefined: Arc<PredefinedTable>) -> Self {
        Self {
            pipeline,
            predefined,
            sessions: RwLock::default(),
        }
    }

    /// The session for `user_id`, if one was created by a generation.
    pub async fn session(&self, user_id: &UserId) -> Option<Arc<SessionController>> {
        self.sessions.read().await.get(user_id).cloned()
    }

    async fn session_or_create(&self, user_id: &UserId) -> Arc<SessionController> {
        if let Some(session) = self.session(user_id).await {
            return session;
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.clone()).or_insert_with(|| {
            debug!(user_id = %user_id, "session created");
            Arc::new(SessionController::new(
                user_id.clone(),
                Arc::clone(&self.pipeline),
                Arc::clone(&self.predefined),
            ))
        });
        Arc::clone(session)
    }

    /// Number of sessions created so far.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// `POST /generate-sound`.
    pub async fn generate_sound(&self, request: GenerateSoundRequest) -> ApiResponse {
        let Some(user_id) = request.user_id.filter(|u| !u.is_blank()) else {
            return ApiResponse::error(400, ValidationError::MissingUserId);
        };
        let kind = match request.model.as_deref().map(str::parse::<ModelKind>) {
            None => ModelKind::default(),
            Some(Ok(kind)) => kind,
            Some(Err(e)) => return ApiResponse::error(400, e),
        };
        let prompt = request.prompt.unwrap_or_default();
        if prompt.trim().is_empty() {
            return ApiResponse::error(400, ValidationError::EmptyPrompt);
        }

        let session = self.session_or_create(&user_id).await;
        match session.start(&prompt, kind).await {
            Ok(outcome) => match (outcome.phase, outcome.result) {
                (SessionPhase::Succeeded, Some(result)) => ApiResponse::ok(GenerateSoundResponse {
                    audio_file_path: result.audio_url,
                    prompt_id: result.history_id,
                    warning: outcome.warning,
                }),
                (SessionPhase::Cancelled, _) => {
                    ApiResponse::error(STATUS_CLIENT_CLOSED, PipelineError::Cancelled)
                }
                (SessionPhase::Failed(reason), _) => ApiResponse::error(500, reason),
                (phase, _) => {
                    warn!(user_id = %user_id, phase = ?phase, "unexpected session outcome");
                    ApiResponse::error(500, "Failed to generate sound")
                }
            },
            Err(SessionError::Invalid(e)) => ApiResponse::error(400, e),
            Err(e @ SessionError::Busy) => ApiResponse::error(409, e),
            Err(e @ SessionError::History(_)) => ApiResponse::error(500, e),
        }
    }

    /// `GET /history/{userId}`.
    pub async fn history(&self, user_id: &UserId) -> ApiResponse {
        if user_id.is_blank() {
            return ApiResponse::error(400, ValidationError::MissingUserId);
        }
        let listed = match self.session(user_id).await {
            Some(session) => session.refresh_history().await.map_err(Error::from),
            None => self.pipeline.history().list(user_id).await.map_err(Error::from),
        };
        match listed {
            Ok(records) => ApiResponse::ok(records),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "history fetch failed");
                ApiResponse::error(500, "Error fetching history")
            }
        }
    }

    /// `DELETE /history/{userId}/{historyId}`.
    pub async fn delete_history(&self, user_id: &UserId, id: HistoryId) -> ApiResponse {
        if user_id.is_blank() {
            return ApiResponse::error(400, ValidationError::MissingUserId);
        }
        match self.pipeline.history().delete(user_id, id).await {
            Ok(()) => {
                info!(user_id = %user_id, history_id = id, "history entry deleted");
                if let Some(session) = self.session(user_id).await
                    && let Err(e) = session.refresh_history().await
                {
                    warn!(user_id = %user_id, error = %e, "history refresh failed");
                }
                ApiResponse::message("Prompt deleted successfully")
            }
            Err(HistoryError::NotFound { .. }) => {
                ApiResponse::error(404, "Prompt not found or not authorized")
            }
            Err(e) => {
                warn!(user_id = %user_id, history_id = id, error = %e, "history delete failed");
                ApiResponse::error(500, "Error deleting prompt")
            }
        }
    }

    /// `POST /cancel/{userId}`.
    pub async fn cancel(&self, user_id: &UserId) -> ApiResponse {
        match self.session(user_id).await {
            Some(session) if session.cancel() => ApiResponse::message("Cancellation requested"),
            _ => ApiResponse::error(404, "No generation in flight"),
        }
    }

    /// Route a raw request.
    pub async fn handle(&self, method: &str, path: &str, body: Option<&str>) -> ApiResponse {
        let method = method.to_ascii_uppercase();
        let segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        info!(method = %method, path = %path, "api request");

        match (method.as_str(), segments.as_slice()) {
            ("POST", ["generate-sound"]) => {
                match serde_json::from_str::<GenerateSoundRequest>(body.unwrap_or("{}")) {
                    Ok(request) => self.generate_sound(request).await,
                    Err(e) => ApiResponse::error(400, format!("Invalid request body: {e}")),
                }
            }
            ("GET", ["history", user]) => self.history(&UserId::new(*user)).await,
            ("DELETE", ["history", user, id]) => match id.parse::<HistoryId>() {
                Ok(id) => self.delete_history(&UserId::new(*user), id).await,
                Err(_) => ApiResponse::error(400, format!("Invalid history id: {id}")),
            },
            ("POST", ["cancel", user]) => self.cancel(&UserId::new(*user)).await,
            (_, ["generate-sound" | "history" | "cancel", ..]) => {
                ApiResponse::error(405, "Method not allowed")
            }
            _ => ApiResponse::error(404, "Not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MemoryAssetStore;
    use crate::history::MemoryHistoryStore;
    use crate::model::ToneModel;

    fn service() -> SoundscapeService {
        let pipeline = GenerationPipeline::new(
            Arc::new(ToneModel::new()),
            Arc::new(MemoryAssetStore::new("https://cdn.test")),
            Arc::new(MemoryHistoryStore::new()),
        );
        SoundscapeService::new(Arc::new(pipeline), Arc::new(PredefinedTable::default()))
    }

    #[tokio::test]
    async fn test_generate_sound_round_trip() {
        let service = service();
        let response = service
            .handle(
                "POST",
                "/generate-sound",
                Some(r#"{"prompt": "thunder over hills", "model": "musicgen", "userId": 7}"#),
            )
            .await;

        assert_eq!(response.status, 200);
        let body: GenerateSoundResponse = serde_json::from_value(response.body).unwrap();
        assert!(body.audio_file_path.ends_with(".wav"));
        assert!(body.prompt_id.is_some());
        assert!(body.warning.is_none());

        let history = service.handle("GET", "/history/7", None).await;
        assert_eq!(history.status, 200);
        let records = history.body.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["model"], "musicgen");
        assert_eq!(records[0]["audio_file_path"], body.audio_file_path.as_str());
        assert_eq!(records[0]["id"], body.prompt_id.unwrap());
    }

    #[tokio::test]
    async fn test_predefined_prompt_defaults_model() {
        let service = service();
        let response = service
            .handle("POST", "/generate-sound", Some(r#"{"prompt": "Forest", "userId": "1"}"#))
            .await;
        assert_eq!(response.status, 200);
        assert!(
            response.body["audioFilePath"]
                .as_str()
                .unwrap()
                .contains("forest-birds")
        );
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let service = service();

        let missing_prompt = service
            .handle("POST", "/generate-sound", Some(r#"{"userId": "1"}"#))
            .await;
        assert_eq!(missing_prompt.status, 400);
        assert_eq!(missing_prompt.body["error"], "Prompt is required");

        let missing_user = service
            .handle("POST", "/generate-sound", Some(r#"{"prompt": "hum"}"#))
            .await;
        assert_eq!(missing_user.status, 400);

        let bad_model = service
            .handle(
                "POST",
                "/generate-sound",
                Some(r#"{"prompt": "hum", "model": "vocoder", "userId": "1"}"#),
            )
            .await;
        assert_eq!(bad_model.status, 400);

        let not_json = service.handle("POST", "/generate-sound", Some("{")).await;
        assert_eq!(not_json.status, 400);

        assert_eq!(service.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_history_then_not_found() {
        let service = service();
        let created = service
            .generate_sound(GenerateSoundRequest {
                prompt: Some("ocean".into()),
                model: None,
                user_id: Some("3".into()),
            })
            .await;
        let id = created.body["promptId"].as_u64().unwrap();

        let path = format!("/history/3/{id}");
        assert_eq!(service.handle("DELETE", "/history/4/1", None).await.status, 404);
        assert_eq!(service.handle("DELETE", &path, None).await.status, 200);
        assert_eq!(service.handle("DELETE", &path, None).await.status, 404);
        assert_eq!(service.handle("DELETE", "/history/3/abc", None).await.status, 400);

        let history = service.history(&"3".into()).await;
        assert_eq!(history.body, json!([]));
    }

    #[tokio::test]
    async fn test_reads_and_deletes_create_no_sessions() {
        let service = service();
        for user in 0..200 {
            let path = format!("/history/{user}");
            assert_eq!(service.handle("GET", &path, None).await.status, 200);
            let path = format!("/history/{user}/1");
            assert_eq!(service.handle("DELETE", &path, None).await.status, 404);
        }
        assert_eq!(service.session_count().await, 0);
        assert!(service.session(&"7".into()).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_refreshes_existing_session() {
        let service = service();
        let created = service
            .generate_sound(GenerateSoundRequest {
                prompt: Some("rain".into()),
                model: None,
                user_id: Some("5".into()),
            })
            .await;
        let id = created.body["promptId"].as_u64().unwrap();
        let session = service.session(&"5".into()).await.unwrap();
        assert_eq!(session.visible_history().len(), 1);

        let path = format!("/history/5/{id}");
        assert_eq!(service.handle("DELETE", &path, None).await.status, 200);
        assert!(session.visible_history().is_empty());
        assert_eq!(service.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_cancel_without_generation() {
        let service = service();
        let response = service.handle("POST", "/cancel/1", None).await;
        assert_eq!(response.status, 404);
        assert_eq!(service.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_routing_errors() {
        let service = service();
        assert_eq!(service.handle("GET", "/unknown", None).await.status, 404);
        assert_eq!(service.handle("GET", "/generate-sound", None).await.status, 405);
        assert_eq!(service.handle("put", "/history/1", None).await.status, 405);
    }
}
