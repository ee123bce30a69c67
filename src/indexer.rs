//! Indexer (M4): turns a completed Job's PageMetadata into a SearchRecord,
//! gated by the Content Classifier (L8) and Quality Gate (L9). Grounded on
//! `original_source/app/services/indexer.py::IndexerService`.

use std::sync::Arc;

use chrono::Utc;

use crate::classifier::{self, ContentType};
use crate::models::{Image, JobAnnotation, JobStatus, PageMetadata, SearchRecord, SEARCH_BODY_MAX_BYTES};
use crate::quality::{self, QualityInput};
use crate::store::{JobUpdate, Store, StoreError};

#[derive(Debug, Clone, Default)]
pub struct IndexOutcome {
    pub indexed: bool,
    pub skipped: bool,
    pub filtered: bool,
    pub content_type: Option<ContentType>,
    pub quality_score: Option<f64>,
}

/// Truncates `body` to at most `SEARCH_BODY_MAX_BYTES` bytes on a char
/// boundary, never splitting a multi-byte UTF-8 sequence.
fn truncate_body(body: &str) -> String {
    if body.len() <= SEARCH_BODY_MAX_BYTES {
        return body.to_string();
    }
    let mut end = SEARCH_BODY_MAX_BYTES;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

/// Title resolution (§4.12): `og:title` > `<title>` > first H1 > last
/// non-empty URL path segment > host.
fn resolve_title(metadata: &PageMetadata, url: &str) -> (String, &'static str) {
    if let Some(og_title) = metadata.og_tags.get("title") {
        if !og_title.trim().is_empty() {
            return (og_title.clone(), "og:title");
        }
    }
    if let Some(title) = &metadata.title {
        if !title.trim().is_empty() {
            return (title.clone(), "title");
        }
    }
    if let Some(h1) = metadata.h1.first() {
        if !h1.trim().is_empty() {
            return (h1.clone(), "h1");
        }
    }
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(segment) = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        {
            let cleaned = segment.replace(['-', '_'], " ");
            if !cleaned.trim().is_empty() {
                return (cleaned, "url_segment");
            }
        }
        if let Some(host) = parsed.host_str() {
            return (host.to_string(), "host");
        }
    }
    (url.to_string(), "host")
}

pub struct Indexer {
    store: Arc<dyn Store>,
}

impl Indexer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Indexer { store }
    }

    /// Index a single completed Job. No-op (returns `skipped`) if a
    /// SearchRecord already exists for the url and `reindex` is false.
    pub async fn index_job(&self, job_id: &str, reindex: bool) -> Result<IndexOutcome, StoreError> {
        let Some(job) = self.store.get_job(job_id).await? else {
            return Ok(IndexOutcome::default());
        };
        if job.status != JobStatus::Completed {
            return Ok(IndexOutcome::default());
        }

        let Some(metadata) = self.store.get_metadata(job_id).await? else {
            return Ok(IndexOutcome::default());
        };

        if !reindex && self.store.search_record_exists(&metadata.url).await? {
            return Ok(IndexOutcome {
                skipped: true,
                ..Default::default()
            });
        }

        let analysis = self.store.get_analysis(job_id).await?;
        let content_type = classifier::classify(&metadata.url);

        let body = truncate_body(&metadata.text_content);

        let images_with_alt = metadata.images.iter().filter(|i| i.alt.is_some()).count() as u32;
        let total_images = metadata.images.len() as u32;

        let quality_input = QualityInput {
            url: &metadata.url,
            title: metadata.title.as_deref(),
            word_count: metadata.word_count,
            has_meta_description: metadata.description.is_some(),
            has_og_title: metadata.og_tags.contains_key("title"),
            has_og_description: metadata.og_tags.contains_key("description"),
            has_og_image: metadata.og_tags.contains_key("image"),
            heading_count: (metadata.h1.len() + metadata.h2.len() + metadata.h3.len()) as u32,
            has_structured_data: !metadata.structured_data_types.is_empty(),
            body_sample: &body,
            images_with_alt,
            total_images,
            analysis_score: analysis.as_ref().map(|a| a.total_score),
            page_value_score: job.page_value_score,
        };

        let verdict = quality::evaluate(content_type, &quality_input);

        if !verdict.accepted {
            let reason = verdict.reject_reason.clone().unwrap_or_default();
            self.annotate_rejected(job_id, content_type, verdict.weighted_score * 100.0, &reason)
                .await?;
            return Ok(IndexOutcome {
                filtered: true,
                content_type: Some(content_type),
                quality_score: Some(verdict.weighted_score * 100.0),
                ..Default::default()
            });
        }

        let (title, title_source) = resolve_title(&metadata, &metadata.url);
        let now = Utc::now();
        let record = SearchRecord {
            url: metadata.url.clone(),
            domain: job.domain.clone(),
            title,
            description: metadata.description.clone(),
            h1: metadata.h1.first().cloned(),
            h2: metadata.h2.clone(),
            body,
            content_type: content_type.as_str().to_string(),
            quality_score: verdict.weighted_score * 100.0,
            og_tags: metadata.og_tags.clone(),
            favicon_url: None,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_search_record(record).await?;

        let images: Vec<Image> = metadata
            .images
            .iter()
            .map(|i| Image {
                url: i.src.clone(),
                record_url: metadata.url.clone(),
                alt: i.alt.clone(),
                width: i.width,
                height: i.height,
                responsive: i.responsive,
                position: i.position,
            })
            .collect();
        self.store.append_images(&metadata.url, images).await?;

        let favicon_url = metadata
            .favicon_url
            .clone()
            .or_else(|| metadata.canonical_url.as_deref().and_then(favicon_origin));
        if let Some(favicon_url) = favicon_url {
            self.store.upsert_favicon(&job.domain, &favicon_url).await?;
        }

        let quality_factors = serde_json::to_value(&verdict.factors).ok();

        let annotation = JobAnnotation {
            indexed_at: Some(now),
            content_type: Some(content_type.as_str().to_string()),
            quality_score: Some(verdict.weighted_score * 100.0),
            quality_factors,
            title_source: Some(title_source.to_string()),
            rejected: false,
            reject_reason: None,
        };
        self.store
            .update_job(
                job_id,
                JobStatus::Completed,
                JobUpdate {
                    annotation: Some(annotation),
                    ..Default::default()
                },
            )
            .await?;

        Ok(IndexOutcome {
            indexed: true,
            content_type: Some(content_type),
            quality_score: Some(verdict.weighted_score * 100.0),
            ..Default::default()
        })
    }

    async fn annotate_rejected(
        &self,
        job_id: &str,
        content_type: ContentType,
        quality_score: f64,
        reject_reason: &str,
    ) -> Result<(), StoreError> {
        let annotation = JobAnnotation {
            rejected: true,
            reject_reason: Some(reject_reason.to_string()),
            content_type: Some(content_type.as_str().to_string()),
            quality_score: Some(quality_score),
            ..Default::default()
        };
        self.store
            .update_job(
                job_id,
                JobStatus::Completed,
                JobUpdate {
                    annotation: Some(annotation),
                    ..Default::default()
                },
            )
            .await
    }

    /// Bulk reindex every completed Job of a session, honoring
    /// `skip_existing`. Returns aggregate counts for the caller.
    pub async fn reindex_session(&self, session_id: &str, skip_existing: bool) -> Result<SessionIndexReport, StoreError> {
        let jobs = self.store.list_completed_jobs(session_id).await?;
        let mut report = SessionIndexReport::default();
        for job in jobs {
            match self.index_job(&job.id, !skip_existing).await {
                Ok(outcome) => {
                    if outcome.indexed {
                        report.indexed += 1;
                    } else if outcome.skipped {
                        report.skipped += 1;
                    } else if outcome.filtered {
                        report.filtered += 1;
                    }
                    if let Some(ct) = outcome.content_type {
                        *report.by_type.entry(ct.as_str().to_string()).or_insert(0) += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "reindex failed for job");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionIndexReport {
    pub indexed: u32,
    pub skipped: u32,
    pub filtered: u32,
    pub failed: u32,
    pub by_type: std::collections::HashMap<String, u32>,
}

/// Last-resort fallback when `PageMetadata.favicon_url` wasn't populated
/// (e.g. rows written before the Crawler Core started resolving one):
/// derive `/favicon.ico` at the page's canonical origin.
fn favicon_origin(canonical_url: &str) -> Option<String> {
    let parsed = url::Url::parse(canonical_url).ok()?;
    let origin = format!("{}://{}", parsed.scheme(), parsed.host_str()?);
    Some(format!("{origin}/favicon.ico"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Job, SessionConfig};
    use crate::store::MemoryStore;

    async fn seed_completed_job(store: &MemoryStore, url: &str, word_count: u32) -> String {
        let session = store
            .create_session("example.com", SessionConfig::default())
            .await
            .unwrap();
        let mut job = Job::new_seed(&session.id, "example.com", url, 2, false);
        job.status = JobStatus::Completed;
        let job = store.create_job(job).await.unwrap();

        let metadata = PageMetadata {
            job_id: job.id.clone(),
            url: url.to_string(),
            title: Some("A Well Written Post About Rust".to_string()),
            word_count,
            ..Default::default()
        };
        store.insert_metadata(metadata).await.unwrap();
        job.id
    }

    #[tokio::test]
    async fn rejects_thin_content_and_annotates_job() {
        let store = MemoryStore::new();
        let job_id = seed_completed_job(&store, "https://example.com/post", 10).await;
        let indexer = Indexer::new(Arc::new(store) as Arc<dyn Store>);
        let outcome = indexer.index_job(&job_id, false).await.unwrap();
        assert!(outcome.filtered);
        assert!(!outcome.indexed);
    }

    #[tokio::test]
    async fn accepts_rich_content_and_writes_search_record() {
        let store = Arc::new(MemoryStore::new());
        let job_id = seed_completed_job(&store, "https://example.com/post", 2000).await;
        let indexer = Indexer::new(store.clone() as Arc<dyn Store>);
        let outcome = indexer.index_job(&job_id, false).await.unwrap();
        assert!(outcome.indexed, "{outcome:?}");
        assert!(store
            .search_record_exists("https://example.com/post")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn skips_when_search_record_already_exists() {
        let store = Arc::new(MemoryStore::new());
        let job_id = seed_completed_job(&store, "https://example.com/post", 2000).await;
        let indexer = Indexer::new(store.clone() as Arc<dyn Store>);
        indexer.index_job(&job_id, false).await.unwrap();
        let second = indexer.index_job(&job_id, false).await.unwrap();
        assert!(second.skipped);
    }
}
