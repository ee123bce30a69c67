//! In-memory `Store` implementation. Used by integration tests and by the
//! `MemoryStore`-backed dev mode when `DATABASE_URL` is unset, exercising the
//! same orchestration logic (§10.4) without a live Postgres instance.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    Image, Job, JobStatus, PageAnalysis, PageMetadata, Session, SessionConfig, SessionStatus,
};

use super::{JobUpdate, Store, StoreError};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    jobs: HashMap<String, Job>,
    job_order: Vec<String>,
    analyses: HashMap<String, PageAnalysis>,
    metadata: HashMap<String, PageMetadata>,
    search_records: HashMap<String, crate::models::SearchRecord>,
    images: HashMap<String, Vec<Image>>,
    favicons: HashMap<String, crate::models::Favicon>,
}

/// `Mutex`-guarded state; fine-grained enough for tests and a single-process
/// dev deployment, not intended for production concurrency at scale.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_session(&self, domain: &str, config: SessionConfig) -> Result<Session, StoreError> {
        let session = Session::new(domain, config);
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.inner.lock().unwrap().sessions.get(id).cloned())
    }

    async fn has_recent_session(&self, domain: &str, within: chrono::Duration) -> Result<bool, StoreError> {
        let cutoff = Utc::now() - within;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .values()
            .any(|s| s.domain == domain && s.created_at >= cutoff))
    }

    async fn set_session_status(&self, id: &str, status: SessionStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.sessions.get_mut(id).ok_or(StoreError::NotFound)?;
        session.status = status;
        let now = Utc::now();
        match status {
            SessionStatus::Running if session.started_at.is_none() => session.started_at = Some(now),
            SessionStatus::Completed | SessionStatus::Failed => session.completed_at = Some(now),
            _ => {}
        }
        Ok(())
    }

    async fn record_job_outcome_on_session(&self, session_id: &str, succeeded: Option<bool>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.sessions.get_mut(session_id).ok_or(StoreError::NotFound)?;
        match succeeded {
            Some(true) => session.crawled_pages += 1,
            Some(false) => session.failed_pages += 1,
            None => {}
        }
        Ok(())
    }

    async fn create_job(&self, job: Job) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner
            .jobs
            .values()
            .any(|j| j.session_id == job.session_id && j.url == job.url);
        if duplicate {
            return Err(StoreError::Conflict);
        }
        if let Some(session) = inner.sessions.get_mut(&job.session_id) {
            session.total_pages += 1;
        }
        inner.job_order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().unwrap().jobs.get(id).cloned())
    }

    async fn claim_next_pending(&self) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let next_id = inner
            .job_order
            .iter()
            .filter(|id| {
                inner
                    .jobs
                    .get(*id)
                    .map(|j| j.status == JobStatus::Pending)
                    .unwrap_or(false)
            })
            .min_by(|a, b| {
                let ja = &inner.jobs[*a];
                let jb = &inner.jobs[*b];
                ja.priority
                    .cmp(&jb.priority)
                    .then(ja.created_at.cmp(&jb.created_at))
            })
            .cloned();

        let Some(id) = next_id else {
            return Ok(None);
        };

        let job = inner.jobs.get_mut(&id).unwrap();
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn update_job(&self, id: &str, status: JobStatus, fields: JobUpdate) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.jobs.get_mut(id).ok_or(StoreError::NotFound)?;
        job.status = status;
        if let Some(v) = fields.started_at {
            job.started_at = Some(v);
        }
        if let Some(v) = fields.completed_at {
            job.completed_at = Some(v);
        }
        if let Some(v) = fields.page_value_score {
            job.page_value_score = Some(v);
        }
        if let Some(v) = fields.children {
            job.children = v;
        }
        if let Some(v) = fields.failure_reason {
            job.failure_reason = Some(v);
        }
        if let Some(v) = fields.annotation {
            job.annotation = Some(v);
        }
        Ok(())
    }

    async fn list_completed_jobs(&self, session_id: &str) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .job_order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|j| j.session_id == session_id && j.status == JobStatus::Completed)
            .cloned()
            .collect())
    }

    async fn requeue_stuck_processing(&self, reason: &str) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut count = 0;
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Failed;
                job.completed_at = Some(now);
                job.failure_reason = Some(reason.to_string());
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert_analysis(&self, analysis: PageAnalysis) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .analyses
            .insert(analysis.job_id.clone(), analysis);
        Ok(())
    }

    async fn get_analysis(&self, job_id: &str) -> Result<Option<PageAnalysis>, StoreError> {
        Ok(self.inner.lock().unwrap().analyses.get(job_id).cloned())
    }

    async fn insert_metadata(&self, metadata: PageMetadata) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .metadata
            .insert(metadata.job_id.clone(), metadata);
        Ok(())
    }

    async fn get_metadata(&self, job_id: &str) -> Result<Option<PageMetadata>, StoreError> {
        Ok(self.inner.lock().unwrap().metadata.get(job_id).cloned())
    }

    async fn search_record_exists(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().search_records.contains_key(url))
    }

    async fn upsert_search_record(&self, record: crate::models::SearchRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .search_records
            .insert(record.url.clone(), record);
        Ok(())
    }

    async fn append_images(&self, record_url: &str, images: Vec<Image>) -> Result<(), StoreError> {
        let truncated: Vec<Image> = images
            .into_iter()
            .take(crate::models::MAX_IMAGES_PER_RECORD)
            .collect();
        self.inner
            .lock()
            .unwrap()
            .images
            .insert(record_url.to_string(), truncated);
        Ok(())
    }

    async fn upsert_favicon(&self, domain: &str, url: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().favicons.insert(
            domain.to_string(),
            crate::models::Favicon {
                domain: domain.to_string(),
                url: url.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_next_pending_leases_lowest_priority_oldest_job() {
        let store = MemoryStore::new();
        let session = store
            .create_session("example.com", SessionConfig::default())
            .await
            .unwrap();
        let mut low_priority = Job::new_seed(&session.id, "example.com", "https://example.com/a", 3, false);
        low_priority.priority = 9;
        let mut high_priority = Job::new_seed(&session.id, "example.com", "https://example.com/b", 3, false);
        high_priority.priority = 1;
        store.create_job(low_priority).await.unwrap();
        store.create_job(high_priority.clone()).await.unwrap();

        let claimed = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(claimed.url, high_priority.url);
        assert_eq!(claimed.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn claim_next_pending_does_not_return_already_claimed_job() {
        let store = MemoryStore::new();
        let session = store
            .create_session("example.com", SessionConfig::default())
            .await
            .unwrap();
        let job = Job::new_seed(&session.id, "example.com", "https://example.com/a", 3, false);
        store.create_job(job).await.unwrap();

        let first = store.claim_next_pending().await.unwrap();
        assert!(first.is_some());
        let second = store.claim_next_pending().await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn create_job_increments_session_total_pages() {
        let store = MemoryStore::new();
        let session = store
            .create_session("example.com", SessionConfig::default())
            .await
            .unwrap();
        let job = Job::new_seed(&session.id, "example.com", "https://example.com/a", 3, false);
        store.create_job(job).await.unwrap();
        let refreshed = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(refreshed.total_pages, 1);
    }
}
