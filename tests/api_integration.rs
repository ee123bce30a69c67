use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum_test::TestServer;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use siteindex_crawler::cache::CacheFacade;
use siteindex_crawler::config::Config;
use siteindex_crawler::crawler::{CrawlerConfig, CrawlerCore};
use siteindex_crawler::indexer::Indexer;
use siteindex_crawler::pool::WorkerPool;
use siteindex_crawler::scheduler::AdminFlags;
use siteindex_crawler::store::{MemoryStore, Store};
use siteindex_crawler::{build_app, AppState};

type HmacSha256 = Hmac<Sha256>;

const SHARED_SECRET: &str = "test_shared_secret";

fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        redis_url: None,
        port: 8080,
        max_concurrent_jobs: 2,
        poll_interval_secs: 5,
        discovery_interval_secs: 21600,
        queue_tick_interval_secs: 30,
        user_agent: "siteindex-crawler-test/0.1".to_string(),
        request_timeout_secs: 5,
        robots_timeout_secs: 5,
        shared_secret: SHARED_SECRET.to_string(),
        default_page_limit: 100,
        default_max_depth: 3,
        known_sites: Vec::new(),
    }
}

fn build_test_state() -> AppState {
    let config = Arc::new(test_config());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let cache = CacheFacade::new(None);
    let crawler = CrawlerCore::new(
        store.clone(),
        cache.clone(),
        CrawlerConfig {
            user_agent: config.user_agent.clone(),
            request_timeout_secs: config.request_timeout_secs,
            robots_timeout_secs: config.robots_timeout_secs,
        },
    );
    let indexer = Arc::new(Indexer::new(store.clone()));
    let pool = Arc::new(WorkerPool::new(
        store.clone(),
        crawler,
        indexer.clone(),
        config.max_concurrent_jobs,
        config.poll_interval_secs,
    ));

    AppState {
        config,
        store,
        cache,
        flags: AdminFlags::new(),
        pool,
        indexer,
    }
}

fn sign(body: &str, timestamp: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn now_secs() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .to_string()
}

#[tokio::test]
async fn health_check_requires_no_auth() {
    let server = TestServer::new(build_app(build_test_state())).unwrap();
    let response = server.get("/api/v1/health").await;
    response.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn protected_route_without_signature_is_rejected() {
    let server = TestServer::new(build_app(build_test_state())).unwrap();
    let response = server
        .post("/api/v1/sessions")
        .json(&json!({"domain": "example.com"}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn start_session_then_create_job_then_check_status() {
    let state = build_test_state();
    let server = TestServer::new(build_app(state)).unwrap();

    let session_body = json!({"domain": "example.com", "page_limit": 50, "max_depth": 2});
    let body_str = serde_json::to_string(&session_body).unwrap();
    let ts = now_secs();
    let sig = sign(&body_str, &ts, SHARED_SECRET);

    let response = server
        .post("/api/v1/sessions")
        .add_header("X-Timestamp", ts)
        .add_header("X-Signature", sig)
        .json(&session_body)
        .await;
    response.assert_status(StatusCode::CREATED);
    let session_json = response.json::<serde_json::Value>();
    let session_id = session_json["session_id"].as_str().unwrap().to_string();
    assert_eq!(session_json["max_depth"], 2);

    let job_body = json!({
        "session_id": session_id,
        "domain": "example.com",
        "url": "https://example.com/",
        "max_depth": 2,
    });
    let body_str = serde_json::to_string(&job_body).unwrap();
    let ts = now_secs();
    let sig = sign(&body_str, &ts, SHARED_SECRET);

    let response = server
        .post("/api/v1/jobs")
        .add_header("X-Timestamp", ts)
        .add_header("X-Signature", sig)
        .json(&job_body)
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let job_json = response.json::<serde_json::Value>();
    let job_id = job_json["job_id"].as_str().unwrap().to_string();

    let response = server.get(&format!("/api/v1/jobs/{job_id}")).await;
    response.assert_status(StatusCode::OK);
    let status_json = response.json::<serde_json::Value>();
    assert_eq!(status_json["status"], "pending");

    let response = server.get(&format!("/api/v1/sessions/{session_id}")).await;
    response.assert_status(StatusCode::OK);
    let stats_json = response.json::<serde_json::Value>();
    assert_eq!(stats_json["total_pages"], 1);
}

#[tokio::test]
async fn bulk_import_groups_urls_by_domain() {
    let server = TestServer::new(build_app(build_test_state())).unwrap();

    let import_body = json!({
        "format": "txt",
        "content": "https://a.example.com/\nhttps://a.example.com/about\nhttps://b.example.com/\n",
    });
    let body_str = serde_json::to_string(&import_body).unwrap();
    let ts = now_secs();
    let sig = sign(&body_str, &ts, SHARED_SECRET);

    let response = server
        .post("/api/v1/bulk-import")
        .add_header("X-Timestamp", ts)
        .add_header("X-Signature", sig)
        .json(&import_body)
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let report = response.json::<serde_json::Value>();
    assert_eq!(report["sessions_created"], 2);
    assert_eq!(report["jobs_created"], 3);
    assert_eq!(report["rejected"], 0);
}

#[tokio::test]
async fn admin_force_stop_and_resume_round_trip() {
    let server = TestServer::new(build_app(build_test_state())).unwrap();

    let response = server.get("/api/v1/admin/status").await;
    response.assert_status(StatusCode::OK);
    let status = response.json::<serde_json::Value>();
    assert_eq!(status["crawl_enabled"], true);

    let ts = now_secs();
    let sig = sign("", &ts, SHARED_SECRET);
    let response = server
        .post("/api/v1/admin/force-stop")
        .add_header("X-Timestamp", ts)
        .add_header("X-Signature", sig)
        .await;
    response.assert_status(StatusCode::OK);

    let response = server.get("/api/v1/admin/status").await;
    let status = response.json::<serde_json::Value>();
    assert_eq!(status["crawl_enabled"], false);

    let ts = now_secs();
    let sig = sign("", &ts, SHARED_SECRET);
    let response = server
        .post("/api/v1/admin/resume")
        .add_header("X-Timestamp", ts)
        .add_header("X-Signature", sig)
        .await;
    response.assert_status(StatusCode::OK);

    let response = server.get("/api/v1/admin/status").await;
    let status = response.json::<serde_json::Value>();
    assert_eq!(status["crawl_enabled"], true);
}

#[tokio::test]
async fn worker_status_reports_zero_initially() {
    let server = TestServer::new(build_app(build_test_state())).unwrap();
    let response = server.get("/api/v1/workers/status").await;
    response.assert_status(StatusCode::OK);
    let stats = response.json::<serde_json::Value>();
    assert_eq!(stats["active"], 0);
    assert_eq!(stats["completed"], 0);
}
