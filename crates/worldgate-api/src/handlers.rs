//! REST API handlers.
//!
//! Orchestrator calls run on their own task so a client hanging up never
//! cancels a start or stop halfway through.

use std::future::Future;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, info, warn};

use worldgate_core::{VersionRequest, WorldId, epoch_secs};
use worldgate_orchestrator::OrchestratorError;
use worldgate_state::WorldRecord;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Bad requests map to 400, failed launches and health checks to 409.
fn orchestrator_error(e: &OrchestratorError) -> Response {
    let status = if e.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::CONFLICT
    };
    error_response(&e.to_string(), status).into_response()
}

/// Run an orchestrator call on its own task.
async fn detached<F>(op: F) -> Result<F::Output, Response>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(op).await.map_err(|e| {
        error!(error = %e, "orchestrator task aborted");
        error_response("orchestrator task aborted", StatusCode::INTERNAL_SERVER_ERROR).into_response()
    })
}

/// Parse an optional JSON body; an empty body means "no overrides".
fn optional_request(body: &Bytes) -> Result<VersionRequest, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(VersionRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| error_response(&format!("invalid request body: {e}"), StatusCode::BAD_REQUEST).into_response())
}

fn pick(requested: &str, fallback: &str) -> String {
    let requested = requested.trim();
    if requested.is_empty() {
        fallback.to_string()
    } else {
        requested.to_string()
    }
}

// ── Orchestrator ───────────────────────────────────────────────

/// POST /internal/process/versions/ensure
pub async fn ensure_version(
    State(state): State<ApiState>,
    Json(req): Json<VersionRequest>,
) -> impl IntoResponse {
    let orchestrator = state.orchestrator.clone();
    match detached(async move { orchestrator.ensure_version(&req).await }).await {
        Ok(Ok(status)) => ApiResponse::ok(status).into_response(),
        Ok(Err(e)) => orchestrator_error(&e),
        Err(resp) => resp,
    }
}

/// POST /internal/process/worlds/{id}/attach
pub async fn attach_world(
    State(state): State<ApiState>,
    Path(id): Path<WorldId>,
    Json(req): Json<VersionRequest>,
) -> impl IntoResponse {
    let orchestrator = state.orchestrator.clone();
    match detached(async move { orchestrator.attach_world(id, &req).await }).await {
        Ok(Ok(status)) => ApiResponse::ok(status).into_response(),
        Ok(Err(e)) => orchestrator_error(&e),
        Err(resp) => resp,
    }
}

/// POST /internal/process/worlds/{id}/detach
pub async fn detach_world(
    State(state): State<ApiState>,
    Path(id): Path<WorldId>,
) -> impl IntoResponse {
    let orchestrator = state.orchestrator.clone();
    match detached(async move { orchestrator.detach_world(id).await }).await {
        Ok(true) => ApiResponse::ok(serde_json::json!({ "worldId": id, "detached": true })).into_response(),
        Ok(false) => error_response("world is not attached", StatusCode::NOT_FOUND).into_response(),
        Err(resp) => resp,
    }
}

/// GET /internal/process/instances, GET /api/admin/game-versions
pub async fn list_instances(State(state): State<ApiState>) -> impl IntoResponse {
    let orchestrator = state.orchestrator.clone();
    match detached(async move { orchestrator.statuses().await }).await {
        Ok(statuses) => ApiResponse::ok(statuses).into_response(),
        Err(resp) => resp,
    }
}

/// GET /internal/routes
pub async fn list_routes(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.routes.snapshot())
}

// ── Game versions ──────────────────────────────────────────────

/// POST /api/admin/game-versions
pub async fn deploy_version(
    State(state): State<ApiState>,
    Json(mut req): Json<VersionRequest>,
) -> impl IntoResponse {
    req.commit_sha = pick(&req.commit_sha, "local");
    let orchestrator = state.orchestrator.clone();
    match detached(async move { orchestrator.ensure_version(&req).await }).await {
        Ok(Ok(status)) => {
            info!(version = %status.version_key, "game version deployed");
            (StatusCode::CREATED, ApiResponse::ok(status)).into_response()
        }
        Ok(Err(e)) => orchestrator_error(&e),
        Err(resp) => resp,
    }
}

/// DELETE /api/admin/game-versions/{version}
pub async fn stop_version(
    State(state): State<ApiState>,
    Path(version): Path<String>,
) -> impl IntoResponse {
    let orchestrator = state.orchestrator.clone();
    match detached(async move { orchestrator.stop_version(&version).await }).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response("version is not running", StatusCode::NOT_FOUND).into_response(),
        Err(resp) => resp,
    }
}

// ── Worlds ─────────────────────────────────────────────────────

/// GET /api/worlds
pub async fn list_worlds(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_worlds() {
        Ok(worlds) => ApiResponse::ok(worlds).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/worlds/{id}
pub async fn get_world(
    State(state): State<ApiState>,
    Path(id): Path<WorldId>,
) -> impl IntoResponse {
    match state.store.get_world(id) {
        Ok(Some(world)) => ApiResponse::ok(world).into_response(),
        Ok(None) => error_response("world not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// PUT /api/worlds/{id}
pub async fn put_world(
    State(state): State<ApiState>,
    Path(id): Path<WorldId>,
    Json(mut world): Json<WorldRecord>,
) -> impl IntoResponse {
    world.id = id;
    world.updated_at = epoch_secs();
    match state.store.put_world(&world) {
        Ok(()) => ApiResponse::ok(world).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/worlds/{id}/activate
///
/// The body is optional; blank `commitSha` / `gameVersion` fall back to
/// the catalog entry. On success the catalog records the build and marks
/// the world active so it is restored after a restart.
pub async fn activate_world(
    State(state): State<ApiState>,
    Path(id): Path<WorldId>,
    body: Bytes,
) -> impl IntoResponse {
    let world = match state.store.get_world(id) {
        Ok(Some(world)) => world,
        Ok(None) => return error_response("world not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    };
    let mut req = match optional_request(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    req.commit_sha = pick(&req.commit_sha, &world.commit_sha);
    req.game_version = pick(&req.game_version, &world.game_version);
    let (commit_sha, game_version) = (req.commit_sha.clone(), req.game_version.clone());

    let orchestrator = state.orchestrator.clone();
    let status = match detached(async move { orchestrator.attach_world(id, &req).await }).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            warn!(world_id = id, error = %e, "world activation failed");
            return orchestrator_error(&e);
        }
        Err(resp) => return resp,
    };

    if let Err(e) = state
        .store
        .update_version_and_activation(id, &commit_sha, &game_version, true)
    {
        error!(world_id = id, error = %e, "world attached but activation was not persisted");
        return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response();
    }
    info!(world_id = id, version = %status.version_key, "world activated");
    (StatusCode::ACCEPTED, ApiResponse::ok(status)).into_response()
}

/// POST /api/worlds/{id}/deactivate
pub async fn deactivate_world(
    State(state): State<ApiState>,
    Path(id): Path<WorldId>,
) -> impl IntoResponse {
    match state.store.get_world(id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response("world not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }

    let orchestrator = state.orchestrator.clone();
    match detached(async move { orchestrator.detach_world(id).await }).await {
        Ok(true) => {}
        Ok(false) => return error_response("world is not attached", StatusCode::NOT_FOUND).into_response(),
        Err(resp) => return resp,
    }

    if let Err(e) = state.store.mark_activation(id, false) {
        return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response();
    }
    info!(world_id = id, "world deactivated");
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use worldgate_core::config::ProcessConfig;
    use worldgate_health::HealthProber;
    use worldgate_launcher::ProcessLauncher;
    use worldgate_orchestrator::Orchestrator;
    use worldgate_routes::RouteTable;
    use worldgate_state::StateStore;

    /// State backed by a real process launcher whose artifact directory
    /// is empty, so every start is rejected before spawning.
    fn test_state(dir: &std::path::Path) -> ApiState {
        let config = ProcessConfig {
            artifacts_dir: dir.join("artifacts"),
            logs_dir: dir.join("logs"),
            ..ProcessConfig::default()
        };
        let routes = RouteTable::new();
        let orchestrator = Orchestrator::new(
            Arc::new(ProcessLauncher::new(config)),
            Arc::new(routes.clone()),
            HealthProber::default(),
        );
        ApiState {
            orchestrator: Arc::new(orchestrator),
            routes,
            store: StateStore::open_in_memory().unwrap(),
        }
    }

    #[tokio::test]
    async fn list_instances_empty() {
        let dir = tempfile::tempdir().unwrap();
        let resp = list_instances(State(test_state(dir.path()))).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn attach_without_commit_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let resp = attach_world(
            State(test_state(dir.path())),
            Path(1),
            Json(VersionRequest::new("", "1.0")),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_artifact_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let resp = ensure_version(
            State(test_state(dir.path())),
            Json(VersionRequest::new("abc123", "1.0")),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn detach_unknown_world_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resp = detach_world(State(test_state(dir.path())), Path(9)).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_unknown_version_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resp = stop_version(State(test_state(dir.path())), Path("v9".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn put_and_get_world() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let resp = put_world(
            State(state.clone()),
            Path(3),
            Json(WorldRecord::new(0, "abc", "1.0")),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let stored = state.store.get_world(3).unwrap().unwrap();
        assert_eq!(stored.id, 3);
        assert!(stored.updated_at > 0);

        let resp = get_world(State(state), Path(3)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn activate_unknown_world_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resp = activate_world(State(test_state(dir.path())), Path(4), Bytes::new())
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_activation_leaves_world_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.store.put_world(&WorldRecord::new(4, "abc123", "1.0")).unwrap();

        let resp = activate_world(State(state.clone()), Path(4), Bytes::new())
            .await
            .into_response();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(!state.store.get_world(4).unwrap().unwrap().is_gateway_active());
    }

    #[tokio::test]
    async fn activate_rejects_malformed_body() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.store.put_world(&WorldRecord::new(4, "abc123", "1.0")).unwrap();

        let resp = activate_world(State(state), Path(4), Bytes::from_static(b"{not json"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pick_falls_back_on_blank() {
        assert_eq!(pick("  ", "abc"), "abc");
        assert_eq!(pick(" def ", "abc"), "def");
    }
}
