//! worldgate-api: REST API for the gateway.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/internal/process/versions/ensure` | Pre-warm a version |
//! | POST | `/internal/process/worlds/{id}/attach` | Serve a world from a version |
//! | POST | `/internal/process/worlds/{id}/detach` | Stop serving a world |
//! | GET | `/internal/process/instances` | Live instances |
//! | GET | `/internal/routes` | World → base address table |
//! | GET | `/api/admin/game-versions` | Live instances |
//! | POST | `/api/admin/game-versions` | Deploy (pre-warm) a version |
//! | DELETE | `/api/admin/game-versions/{version}` | Stop a version |
//! | GET | `/api/worlds` | World catalog |
//! | GET | `/api/worlds/{id}` | One catalog entry |
//! | PUT | `/api/worlds/{id}` | Create or replace a catalog entry |
//! | POST | `/api/worlds/{id}/activate` | Attach and mark active |
//! | POST | `/api/worlds/{id}/deactivate` | Detach and mark inactive |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};

use worldgate_orchestrator::Orchestrator;
use worldgate_routes::RouteTable;
use worldgate_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub routes: RouteTable,
    pub store: StateStore,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // ── Orchestrator ──
        .route("/internal/process/versions/ensure", post(handlers::ensure_version))
        .route("/internal/process/worlds/{id}/attach", post(handlers::attach_world))
        .route("/internal/process/worlds/{id}/detach", post(handlers::detach_world))
        .route("/internal/process/instances", get(handlers::list_instances))
        .route("/internal/routes", get(handlers::list_routes))
        // ── Game versions ──
        .route(
            "/api/admin/game-versions",
            get(handlers::list_instances).post(handlers::deploy_version),
        )
        .route("/api/admin/game-versions/{version}", delete(handlers::stop_version))
        // ── Worlds ──
        .route("/api/worlds", get(handlers::list_worlds))
        .route("/api/worlds/{id}", get(handlers::get_world).put(handlers::put_world))
        .route("/api/worlds/{id}/activate", post(handlers::activate_world))
        .route("/api/worlds/{id}/deactivate", post(handlers::deactivate_world))
        .with_state(state)
}
