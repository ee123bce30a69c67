//! HTTP surface (§6): session/job control plane, bulk import, worker and
//! admin status. Grounded on the teacher's `server/routes.rs` handler shape
//! (thin handlers delegating to domain services, `Json`-in `Json`-out).

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{Job, SessionConfig};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub domain: String,
    pub page_limit: Option<u32>,
    pub max_depth: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub domain: String,
    pub page_limit: u32,
    pub max_depth: u32,
}

/// POST /api/v1/sessions
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let config = SessionConfig {
        max_depth: req.max_depth.unwrap_or(state.config.default_max_depth),
        page_limit: req.page_limit.unwrap_or(state.config.default_page_limit),
    };
    match state.store.create_session(&req.domain, config.clone()).await {
        Ok(session) => (
            StatusCode::CREATED,
            Json(StartSessionResponse {
                session_id: session.id,
                domain: session.domain,
                page_limit: config.page_limit,
                max_depth: config.max_depth,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, domain = %req.domain, "failed to create session");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

/// GET /api/v1/sessions/{id}
pub async fn get_session_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_session(&id).await {
        Ok(Some(session)) => (StatusCode::OK, Json(session)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({"error": "session not found"}))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub session_id: String,
    pub domain: String,
    pub url: String,
    pub max_depth: Option<u32>,
    pub enable_js: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub priority: i32,
}

/// POST /api/v1/jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> impl IntoResponse {
    let job = Job::new_seed(
        req.session_id,
        req.domain,
        req.url,
        req.max_depth.unwrap_or(state.config.default_max_depth),
        req.enable_js.unwrap_or(false),
    );
    match state.store.create_job(job).await {
        Ok(created) => (
            StatusCode::ACCEPTED,
            Json(CreateJobResponse {
                job_id: created.id,
                priority: created.priority,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to create job");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

/// GET /api/v1/jobs/{id}
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_job(&id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({"error": "job not found"}))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkImportRequest {
    /// One of `"csv"`, `"json"`, `"txt"` (§6).
    pub format: String,
    pub content: String,
    pub max_depth: Option<u32>,
    pub page_limit: Option<u32>,
}

#[derive(Debug, Serialize, Default)]
pub struct BulkImportResponse {
    pub sessions_created: usize,
    pub jobs_created: usize,
    pub rejected: usize,
}

/// POST /api/v1/bulk-import
///
/// Accepts a batch of seed URLs as CSV, JSON, or newline-delimited text,
/// groups them by host, and creates (or reuses, within this call) one
/// Session per host plus one pending Job per valid URL.
pub async fn bulk_import(
    State(state): State<AppState>,
    Json(req): Json<BulkImportRequest>,
) -> impl IntoResponse {
    let urls = match parse_bulk_urls(&req.format, &req.content) {
        Ok(urls) => urls,
        Err(msg) => return (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response(),
    };

    let max_depth = req.max_depth.unwrap_or(state.config.default_max_depth);
    let page_limit = req.page_limit.unwrap_or(state.config.default_page_limit);

    let mut sessions_by_domain: HashMap<String, String> = HashMap::new();
    let mut report = BulkImportResponse::default();

    for raw_url in urls {
        let Some(normalized) = crate::normalize::normalize(&raw_url) else {
            report.rejected += 1;
            continue;
        };
        if !crate::normalize::is_valid(&normalized) {
            report.rejected += 1;
            continue;
        }
        let Some(domain) = url::Url::parse(&normalized).ok().and_then(|u| u.host_str().map(str::to_string)) else {
            report.rejected += 1;
            continue;
        };

        let session_id = if let Some(id) = sessions_by_domain.get(&domain) {
            id.clone()
        } else {
            match state
                .store
                .create_session(&domain, SessionConfig { max_depth, page_limit })
                .await
            {
                Ok(session) => {
                    sessions_by_domain.insert(domain.clone(), session.id.clone());
                    report.sessions_created += 1;
                    session.id
                }
                Err(e) => {
                    tracing::error!(error = %e, domain = %domain, "bulk-import session creation failed");
                    report.rejected += 1;
                    continue;
                }
            }
        };

        let job = Job::new_seed(session_id, domain, normalized, max_depth, false);
        match state.store.create_job(job).await {
            Ok(_) => report.jobs_created += 1,
            Err(e) => {
                tracing::error!(error = %e, "bulk-import job creation failed");
                report.rejected += 1;
            }
        }
    }

    (StatusCode::ACCEPTED, Json(report)).into_response()
}

fn parse_bulk_urls(format: &str, content: &str) -> Result<Vec<String>, String> {
    match format.to_lowercase().as_str() {
        "txt" => Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        "csv" => {
            let mut urls = Vec::new();
            for (i, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let first_field = line.split(',').next().unwrap_or("").trim();
                if i == 0 && first_field.eq_ignore_ascii_case("url") {
                    continue;
                }
                if !first_field.is_empty() {
                    urls.push(first_field.trim_matches('"').to_string());
                }
            }
            Ok(urls)
        }
        "json" => {
            let value: serde_json::Value =
                serde_json::from_str(content).map_err(|e| format!("invalid json: {e}"))?;
            let urls = match value {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .filter_map(|v| match v {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Object(map) => {
                            map.get("url").and_then(|u| u.as_str()).map(str::to_string)
                        }
                        _ => None,
                    })
                    .collect(),
                _ => return Err("expected a JSON array of URLs or objects with a url field".to_string()),
            };
            Ok(urls)
        }
        other => Err(format!("unsupported bulk-import format: {other}")),
    }
}

/// GET /api/v1/workers/status
pub async fn worker_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.pool.stats()))
}

/// POST /api/v1/admin/force-stop
///
/// Only flips `crawl_enabled`, which the Worker Pool's tick loop rechecks on
/// every iteration — reversible by `/admin/resume`. The pool's own
/// `CancellationToken` is reserved for process shutdown, not this endpoint,
/// since a cancelled token cannot be un-cancelled.
pub async fn force_stop(State(state): State<AppState>) -> impl IntoResponse {
    state.flags.force_stop();
    tracing::warn!("admin force-stop requested");
    (StatusCode::OK, Json(json!({"status": "stopping"})))
}

/// POST /api/v1/admin/pause-index
pub async fn pause_index(State(state): State<AppState>) -> impl IntoResponse {
    state.flags.pause_index();
    (StatusCode::OK, Json(json!({"status": "index_paused"})))
}

/// POST /api/v1/admin/resume
pub async fn resume(State(state): State<AppState>) -> impl IntoResponse {
    state.flags.resume();
    (StatusCode::OK, Json(json!({"status": "resumed"})))
}

/// GET /api/v1/admin/status
pub async fn admin_status(State(state): State<AppState>) -> impl IntoResponse {
    let (crawl_enabled, index_enabled, force_pause_index) = state.flags.status();
    (
        StatusCode::OK,
        Json(json!({
            "crawl_enabled": crawl_enabled,
            "index_enabled": index_enabled,
            "force_pause_index": force_pause_index,
        })),
    )
}

/// GET /api/v1/health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
