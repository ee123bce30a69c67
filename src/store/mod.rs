//! Persistence Facade (L11): the transactional contract in SPEC_FULL §6.
//! The Facade owns the authoritative copy of every entity in §3; the Cache
//! Facade (`crate::cache`) is a coherent-by-invalidation mirror, never
//! authoritative. Grounded on `original_source/app/db/models.py` (schema
//! shapes) and `riptide-persistence`'s sqlx+Postgres pairing alongside the
//! teacher's existing `redis` dependency.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Image, Job, JobAnnotation, JobStatus, PageAnalysis, PageMetadata, Session, SessionConfig, SessionStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("conflicting claim on an already-leased row")]
    Conflict,
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::Conflict
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Fields a Worker may update on a Job it holds the lease for. Only
/// `status` is mandatory; everything else is applied when present.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub page_value_score: Option<f64>,
    pub children: Option<Vec<String>>,
    pub failure_reason: Option<String>,
    pub annotation: Option<JobAnnotation>,
}

/// Transactional operations required by the core (§6). Every mutation that
/// the spec calls "composable within one transaction per Job outcome" is a
/// single trait method here so each implementation controls its own
/// transaction boundary.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_session(&self, domain: &str, config: SessionConfig) -> Result<Session, StoreError>;
    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;
    async fn has_recent_session(&self, domain: &str, within: chrono::Duration) -> Result<bool, StoreError>;
    async fn set_session_status(&self, id: &str, status: SessionStatus) -> Result<(), StoreError>;
    /// `Some(true)` increments `crawled_pages`, `Some(false)` increments
    /// `failed_pages`. `None` is a policy skip (robots disallow, duplicate
    /// URL, depth exceeded) and touches neither counter (§7).
    async fn record_job_outcome_on_session(&self, session_id: &str, succeeded: Option<bool>) -> Result<(), StoreError>;

    /// Enforces store uniqueness on `(session_id, url)` (§4.12 step 5,
    /// §8 de-duplication): returns `StoreError::Conflict` if a Job already
    /// exists for this pair rather than creating a second one.
    async fn create_job(&self, job: Job) -> Result<Job, StoreError>;
    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError>;
    /// Atomically leases the highest-priority, oldest pending Job (ordered
    /// `priority ASC, created_at ASC`) by flipping it to `processing`.
    /// Must reject a second claim of the same row.
    async fn claim_next_pending(&self) -> Result<Option<Job>, StoreError>;
    async fn update_job(&self, id: &str, status: JobStatus, fields: JobUpdate) -> Result<(), StoreError>;
    async fn list_completed_jobs(&self, session_id: &str) -> Result<Vec<Job>, StoreError>;
    async fn requeue_stuck_processing(&self, reason: &str) -> Result<usize, StoreError>;

    async fn insert_analysis(&self, analysis: PageAnalysis) -> Result<(), StoreError>;
    async fn get_analysis(&self, job_id: &str) -> Result<Option<PageAnalysis>, StoreError>;
    async fn insert_metadata(&self, metadata: PageMetadata) -> Result<(), StoreError>;
    async fn get_metadata(&self, job_id: &str) -> Result<Option<PageMetadata>, StoreError>;

    async fn search_record_exists(&self, url: &str) -> Result<bool, StoreError>;
    async fn upsert_search_record(&self, record: crate::models::SearchRecord) -> Result<(), StoreError>;
    async fn append_images(&self, record_url: &str, images: Vec<Image>) -> Result<(), StoreError>;
    async fn upsert_favicon(&self, domain: &str, url: &str) -> Result<(), StoreError>;
}
