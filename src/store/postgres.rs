//! `Store` implementation backed by PostgreSQL via `sqlx`. Schema sketch per
//! SPEC_FULL §3/§6: `crawl_sessions`, `crawl_jobs`, `page_analyses`,
//! `page_metadata`, `search_content`, `page_images`, `site_favicons`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use crate::models::{
    Image, Job, JobAnnotation, JobStatus, PageAnalysis, PageMetadata, QueryIntent, SearchRecord,
    Session, SessionConfig, SessionStatus, SpamReport,
};

use super::{JobUpdate, Store, StoreError};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    status TEXT NOT NULL,
    total_pages INTEGER NOT NULL DEFAULT 0,
    crawled_pages INTEGER NOT NULL DEFAULT 0,
    failed_pages INTEGER NOT NULL DEFAULT 0,
    config JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_crawl_sessions_domain ON crawl_sessions (domain);

CREATE TABLE IF NOT EXISTS crawl_jobs (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES crawl_sessions(id),
    domain TEXT NOT NULL,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    priority INTEGER NOT NULL,
    depth INTEGER NOT NULL,
    max_depth INTEGER NOT NULL,
    enable_js_rendering BOOLEAN NOT NULL,
    page_value_score DOUBLE PRECISION,
    created_at TIMESTAMPTZ NOT NULL,
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    children JSONB NOT NULL DEFAULT '[]',
    failure_reason TEXT,
    annotation JSONB
);
CREATE INDEX IF NOT EXISTS idx_crawl_jobs_lease ON crawl_jobs (status, priority, created_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_crawl_jobs_session_url ON crawl_jobs (session_id, url);

CREATE TABLE IF NOT EXISTS page_analyses (
    job_id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    total_score DOUBLE PRECISION NOT NULL,
    crawl_priority SMALLINT NOT NULL,
    recommendation TEXT NOT NULL,
    spam_report JSONB NOT NULL,
    query_intent TEXT NOT NULL,
    tracker_risk DOUBLE PRECISION NOT NULL,
    tracker_profile TEXT NOT NULL,
    tracker_count INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS page_metadata (
    job_id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    bundle JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS search_content (
    url TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    h1 TEXT,
    h2 JSONB NOT NULL DEFAULT '[]',
    body TEXT NOT NULL,
    content_type TEXT NOT NULL,
    quality_score DOUBLE PRECISION NOT NULL,
    og_tags JSONB NOT NULL DEFAULT '{}',
    favicon_url TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_search_content_domain ON search_content (domain);

CREATE TABLE IF NOT EXISTS page_images (
    id BIGSERIAL PRIMARY KEY,
    record_url TEXT NOT NULL REFERENCES search_content(url) ON DELETE CASCADE,
    url TEXT NOT NULL,
    alt TEXT,
    width INTEGER,
    height INTEGER,
    responsive BOOLEAN NOT NULL,
    position INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_page_images_record ON page_images (record_url);

CREATE TABLE IF NOT EXISTS site_favicons (
    domain TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;
        Ok(PgStore { pool })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    domain: String,
    status: String,
    total_pages: i32,
    crawled_pages: i32,
    failed_pages: i32,
    config: serde_json::Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

fn parse_session_status(s: &str) -> SessionStatus {
    match s {
        "running" => SessionStatus::Running,
        "completed" => SessionStatus::Completed,
        "failed" => SessionStatus::Failed,
        _ => SessionStatus::Pending,
    }
}

fn session_status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Pending => "pending",
        SessionStatus::Running => "running",
        SessionStatus::Completed => "completed",
        SessionStatus::Failed => "failed",
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            domain: row.domain,
            status: parse_session_status(&row.status),
            total_pages: row.total_pages as u32,
            crawled_pages: row.crawled_pages as u32,
            failed_pages: row.failed_pages as u32,
            config: serde_json::from_value(row.config).unwrap_or_default(),
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(FromRow)]
struct JobRow {
    id: String,
    session_id: String,
    domain: String,
    url: String,
    status: String,
    priority: i32,
    depth: i32,
    max_depth: i32,
    enable_js_rendering: bool,
    page_value_score: Option<f64>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    children: serde_json::Value,
    failure_reason: Option<String>,
    annotation: Option<serde_json::Value>,
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        "skipped" => JobStatus::Skipped,
        _ => JobStatus::Pending,
    }
}

fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "pending",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
        JobStatus::Skipped => "skipped",
    }
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            session_id: row.session_id,
            domain: row.domain,
            url: row.url,
            status: parse_job_status(&row.status),
            priority: row.priority,
            depth: row.depth as u32,
            max_depth: row.max_depth as u32,
            enable_js_rendering: row.enable_js_rendering,
            page_value_score: row.page_value_score,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            children: serde_json::from_value(row.children).unwrap_or_default(),
            failure_reason: row.failure_reason,
            annotation: row
                .annotation
                .and_then(|v| serde_json::from_value::<JobAnnotation>(v).ok()),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_session(&self, domain: &str, config: SessionConfig) -> Result<Session, StoreError> {
        let session = Session::new(domain, config);
        sqlx::query(
            "INSERT INTO crawl_sessions (id, domain, status, total_pages, crawled_pages, failed_pages, config, created_at)
             VALUES ($1, $2, $3, 0, 0, 0, $4, $5)",
        )
        .bind(&session.id)
        .bind(&session.domain)
        .bind(session_status_str(session.status))
        .bind(serde_json::to_value(&session.config).unwrap())
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM crawl_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Session::from))
    }

    async fn has_recent_session(&self, domain: &str, within: chrono::Duration) -> Result<bool, StoreError> {
        let cutoff = Utc::now() - within;
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM crawl_sessions WHERE domain = $1 AND created_at >= $2)",
        )
        .bind(domain)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn set_session_status(&self, id: &str, status: SessionStatus) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE crawl_sessions SET status = $1,
                started_at = CASE WHEN $1 = 'running' AND started_at IS NULL THEN $2 ELSE started_at END,
                completed_at = CASE WHEN $1 IN ('completed', 'failed') THEN $2 ELSE completed_at END
             WHERE id = $3",
        )
        .bind(session_status_str(status))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_job_outcome_on_session(&self, session_id: &str, succeeded: Option<bool>) -> Result<(), StoreError> {
        match succeeded {
            Some(true) => {
                sqlx::query("UPDATE crawl_sessions SET crawled_pages = crawled_pages + 1 WHERE id = $1")
                    .bind(session_id)
                    .execute(&self.pool)
                    .await?;
            }
            Some(false) => {
                sqlx::query("UPDATE crawl_sessions SET failed_pages = failed_pages + 1 WHERE id = $1")
                    .bind(session_id)
                    .execute(&self.pool)
                    .await?;
            }
            None => {}
        }
        Ok(())
    }

    async fn create_job(&self, job: Job) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO crawl_jobs (id, session_id, domain, url, status, priority, depth, max_depth,
                enable_js_rendering, page_value_score, created_at, started_at, completed_at, children,
                failure_reason, annotation)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .bind(&job.id)
        .bind(&job.session_id)
        .bind(&job.domain)
        .bind(&job.url)
        .bind(job_status_str(job.status))
        .bind(job.priority)
        .bind(job.depth as i32)
        .bind(job.max_depth as i32)
        .bind(job.enable_js_rendering)
        .bind(job.page_value_score)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(serde_json::to_value(&job.children).unwrap())
        .bind(&job.failure_reason)
        .bind(job.annotation.as_ref().map(|a| serde_json::to_value(a).unwrap()))
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE crawl_sessions SET total_pages = total_pages + 1 WHERE id = $1")
            .bind(&job.session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM crawl_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Job::from))
    }

    async fn claim_next_pending(&self) -> Result<Option<Job>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row: Option<JobRow> = sqlx::query_as(
            "SELECT * FROM crawl_jobs WHERE status = 'pending'
             ORDER BY priority ASC, created_at ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE crawl_jobs SET status = 'processing', started_at = $1 WHERE id = $2 AND status = 'pending'",
        )
        .bind(now)
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        let mut job: Job = row.into();
        job.status = JobStatus::Processing;
        job.started_at = Some(now);
        Ok(Some(job))
    }

    async fn update_job(&self, id: &str, status: JobStatus, fields: JobUpdate) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE crawl_jobs SET
                status = $1,
                started_at = COALESCE($2, started_at),
                completed_at = COALESCE($3, completed_at),
                page_value_score = COALESCE($4, page_value_score),
                children = COALESCE($5, children),
                failure_reason = COALESCE($6, failure_reason),
                annotation = COALESCE($7, annotation)
             WHERE id = $8",
        )
        .bind(job_status_str(status))
        .bind(fields.started_at)
        .bind(fields.completed_at)
        .bind(fields.page_value_score)
        .bind(fields.children.map(|c| serde_json::to_value(c).unwrap()))
        .bind(fields.failure_reason)
        .bind(fields.annotation.map(|a| serde_json::to_value(a).unwrap()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_completed_jobs(&self, session_id: &str) -> Result<Vec<Job>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM crawl_jobs WHERE session_id = $1 AND status = 'completed' ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn requeue_stuck_processing(&self, reason: &str) -> Result<usize, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE crawl_jobs SET status = 'failed', completed_at = $1, failure_reason = $2 WHERE status = 'processing'",
        )
        .bind(now)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn insert_analysis(&self, analysis: PageAnalysis) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO page_analyses (job_id, url, total_score, crawl_priority, recommendation, spam_report, query_intent, tracker_risk, tracker_profile, tracker_count, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
             ON CONFLICT (job_id) DO UPDATE SET
                url = EXCLUDED.url, total_score = EXCLUDED.total_score, crawl_priority = EXCLUDED.crawl_priority,
                recommendation = EXCLUDED.recommendation, spam_report = EXCLUDED.spam_report,
                query_intent = EXCLUDED.query_intent, tracker_risk = EXCLUDED.tracker_risk,
                tracker_profile = EXCLUDED.tracker_profile, tracker_count = EXCLUDED.tracker_count,
                created_at = EXCLUDED.created_at",
        )
        .bind(&analysis.job_id)
        .bind(&analysis.url)
        .bind(analysis.total_score)
        .bind(analysis.crawl_priority as i16)
        .bind(&analysis.recommendation)
        .bind(serde_json::to_value(&analysis.spam_report as &SpamReport).unwrap())
        .bind(query_intent_str(analysis.query_intent))
        .bind(analysis.tracker_risk)
        .bind(&analysis.tracker_profile)
        .bind(analysis.tracker_count as i32)
        .bind(analysis.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_analysis(&self, job_id: &str) -> Result<Option<PageAnalysis>, StoreError> {
        let row: Option<AnalysisRow> = sqlx::query_as("SELECT * FROM page_analyses WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(PageAnalysis::from))
    }

    async fn insert_metadata(&self, metadata: PageMetadata) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO page_metadata (job_id, url, bundle, created_at)
             VALUES ($1,$2,$3,$4)
             ON CONFLICT (job_id) DO UPDATE SET url = EXCLUDED.url, bundle = EXCLUDED.bundle, created_at = EXCLUDED.created_at",
        )
        .bind(&metadata.job_id)
        .bind(&metadata.url)
        .bind(serde_json::to_value(&metadata).unwrap())
        .bind(metadata.created_at.unwrap_or_else(Utc::now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_metadata(&self, job_id: &str) -> Result<Option<PageMetadata>, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT bundle FROM page_metadata WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(v,)| serde_json::from_value(v).ok()))
    }

    async fn search_record_exists(&self, url: &str) -> Result<bool, StoreError> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM search_content WHERE url = $1)")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn upsert_search_record(&self, record: SearchRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO search_content (url, domain, title, description, h1, h2, body, content_type,
                quality_score, og_tags, favicon_url, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
             ON CONFLICT (url) DO UPDATE SET
                domain = EXCLUDED.domain, title = EXCLUDED.title, description = EXCLUDED.description,
                h1 = EXCLUDED.h1, h2 = EXCLUDED.h2, body = EXCLUDED.body, content_type = EXCLUDED.content_type,
                quality_score = EXCLUDED.quality_score, og_tags = EXCLUDED.og_tags,
                favicon_url = EXCLUDED.favicon_url, updated_at = EXCLUDED.updated_at",
        )
        .bind(&record.url)
        .bind(&record.domain)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.h1)
        .bind(serde_json::to_value(&record.h2).unwrap())
        .bind(&record.body)
        .bind(&record.content_type)
        .bind(record.quality_score)
        .bind(serde_json::to_value(&record.og_tags).unwrap())
        .bind(&record.favicon_url)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_images(&self, record_url: &str, images: Vec<Image>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM page_images WHERE record_url = $1")
            .bind(record_url)
            .execute(&mut *tx)
            .await?;
        for image in images.into_iter().take(crate::models::MAX_IMAGES_PER_RECORD) {
            sqlx::query(
                "INSERT INTO page_images (record_url, url, alt, width, height, responsive, position)
                 VALUES ($1,$2,$3,$4,$5,$6,$7)",
            )
            .bind(record_url)
            .bind(&image.url)
            .bind(&image.alt)
            .bind(image.width.map(|w| w as i32))
            .bind(image.height.map(|h| h as i32))
            .bind(image.responsive)
            .bind(image.position as i32)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_favicon(&self, domain: &str, url: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO site_favicons (domain, url, updated_at) VALUES ($1, $2, $3)
             ON CONFLICT (domain) DO UPDATE SET url = EXCLUDED.url, updated_at = EXCLUDED.updated_at",
        )
        .bind(domain)
        .bind(url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn query_intent_str(intent: QueryIntent) -> &'static str {
    match intent {
        QueryIntent::Informational => "informational",
        QueryIntent::Navigational => "navigational",
        QueryIntent::Transactional => "transactional",
        QueryIntent::Unknown => "unknown",
    }
}

fn parse_query_intent(s: &str) -> QueryIntent {
    match s {
        "informational" => QueryIntent::Informational,
        "navigational" => QueryIntent::Navigational,
        "transactional" => QueryIntent::Transactional,
        _ => QueryIntent::Unknown,
    }
}

#[derive(FromRow)]
struct AnalysisRow {
    job_id: String,
    url: String,
    total_score: f64,
    crawl_priority: i16,
    recommendation: String,
    spam_report: serde_json::Value,
    query_intent: String,
    tracker_risk: f64,
    tracker_profile: String,
    tracker_count: i32,
    created_at: DateTime<Utc>,
}

impl From<AnalysisRow> for PageAnalysis {
    fn from(row: AnalysisRow) -> Self {
        PageAnalysis {
            job_id: row.job_id,
            url: row.url,
            total_score: row.total_score,
            crawl_priority: row.crawl_priority as u8,
            recommendation: row.recommendation,
            spam_report: serde_json::from_value(row.spam_report).unwrap_or(SpamReport {
                spam_score: 0.0,
                risk_level: crate::models::SpamRiskLevel::Clean,
                signals: Vec::new(),
            }),
            query_intent: parse_query_intent(&row.query_intent),
            tracker_risk: row.tracker_risk,
            tracker_profile: row.tracker_profile,
            tracker_count: row.tracker_count as u32,
            created_at: row.created_at,
        }
    }
}
