pub mod cache;
pub mod classifier;
pub mod config;
pub mod crawler;
pub mod favicon;
pub mod indexer;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod pool;
pub mod quality;
pub mod scheduler;
pub mod scorer;
pub mod server;
pub mod spam;
pub mod store;
pub mod tracker;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::CacheFacade;
use crate::config::Config;
use crate::indexer::Indexer;
use crate::pool::WorkerPool;
use crate::scheduler::AdminFlags;
use crate::store::Store;

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub cache: CacheFacade,
    pub flags: Arc<AdminFlags>,
    pub pool: Arc<WorkerPool>,
    pub indexer: Arc<Indexer>,
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Mutating/control endpoints require the HMAC signature (§6).
    let authenticated_routes = Router::new()
        .route("/api/v1/sessions", post(server::routes::start_session))
        .route("/api/v1/jobs", post(server::routes::create_job))
        .route("/api/v1/bulk-import", post(server::routes::bulk_import))
        .route("/api/v1/admin/force-stop", post(server::routes::force_stop))
        .route(
            "/api/v1/admin/pause-index",
            post(server::routes::pause_index),
        )
        .route("/api/v1/admin/resume", post(server::routes::resume))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            server::auth::verify_hmac,
        ));

    // Read-only endpoints (no auth required).
    let public_routes = Router::new()
        .route("/api/v1/health", get(server::routes::health))
        .route(
            "/api/v1/sessions/{id}",
            get(server::routes::get_session_stats),
        )
        .route("/api/v1/jobs/{id}", get(server::routes::get_job_status))
        .route("/api/v1/workers/status", get(server::routes::worker_status))
        .route("/api/v1/admin/status", get(server::routes::admin_status));

    Router::new()
        .merge(authenticated_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
