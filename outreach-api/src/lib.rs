//! outreach-api library - tenant-isolated outreach core service
//!
//! HTTP service exposing the tenant-scoped REST surface, prospect approval
//! pipeline, webhook intake, optimizer, and the orphan recovery job
//! trigger.

use axum::Router;
use sqlx::SqlitePool;

pub mod api;
pub mod approval;
pub mod notify;
pub mod optimizer;
pub mod recovery;
pub mod tenant;

/// Application state shared across HTTP handlers
///
/// Everything request handlers need is injected here; there are no
/// module-level singletons, so tests can supply their own pool and
/// secrets.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Shared secret required by the external scheduler to trigger jobs
    pub cron_secret: String,
    /// Maximum accepted request body size in bytes
    pub max_body_bytes: usize,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, cron_secret: String) -> Self {
        Self {
            db,
            cron_secret,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Build application router
///
/// Session-authenticated routes carry the auth middleware; webhook and job
/// routes authenticate by signature / shared secret instead, and health is
/// open.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Routes requiring a resolved identity
    let protected = Router::new()
        .route(
            "/api/workspace/:workspace_id/prospects/:prospect_id",
            get(api::workspace::get_prospect),
        )
        .route("/api/approval/sessions", post(api::approval::create_session))
        .route(
            "/api/approval/sessions/:session_id/decide",
            post(api::approval::decide_candidate),
        )
        .route(
            "/api/approval/sessions/:session_id/complete",
            post(api::approval::complete_session),
        )
        .route("/api/optimize", post(api::optimize::optimize_candidates))
        .route("/api/optimize/stats", get(api::optimize::optimize_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::auth_middleware,
        ));

    // Routes with their own authentication (signature / shared secret)
    let unauthenticated = Router::new()
        .route("/api/auth/login", post(api::auth::login))
        .route("/api/webhooks/:source", post(api::webhooks::receive_webhook))
        .route("/api/jobs/recover-orphans", post(api::jobs::recover_orphans))
        .merge(api::health::health_routes());

    Router::new()
        .merge(protected)
        .merge(unauthenticated)
        .layer(axum::extract::DefaultBodyLimit::max(state.max_body_bytes))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
