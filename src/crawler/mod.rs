pub mod fetcher;
pub mod parser;
pub mod robots;
pub mod sitemap;

pub use fetcher::RateLimitedFetcher;
pub use parser::Parser;
pub use robots::RobotsChecker;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scraper::Html;
use url::Url;

use crate::cache::{CacheFacade, CacheKind};
use crate::favicon;
use crate::metadata;
use crate::models::{
    Job, JobAnnotation, JobStatus, PageAnalysis, PageImageRef, PageMetadata,
};
use crate::normalize;
use crate::scorer::{self, ContentMetrics, CrawlPriority, LinkMetrics};
use crate::spam::{self, LinkEdge, PageSummary};
use crate::store::{JobUpdate, Store, StoreError};
use crate::tracker;

/// Maximum anchors promoted to child Jobs per page (§4.12 step 5).
const MAX_CHILDREN_PER_PAGE: usize = 20;

fn priority_label(p: CrawlPriority) -> &'static str {
    match p {
        CrawlPriority::CrawlNow => "crawl_now",
        CrawlPriority::CrawlSoon => "crawl_soon",
        CrawlPriority::CrawlLater => "crawl_later",
        CrawlPriority::LowValue => "low_value",
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|h| h.to_lowercase())
}

/// Exact host match or proper subdomain — not the substring match the
/// original implementation used for its own same-domain check (see §9).
pub fn same_registered_host(url: &str, domain: &str) -> bool {
    match host_of(url) {
        Some(host) => host == domain || host.ends_with(&format!(".{domain}")),
        None => false,
    }
}

#[derive(Debug, Clone, Default)]
struct DomainState {
    robots: Option<RobotsChecker>,
    crawl_delay: Option<f64>,
    last_fetch: Option<Instant>,
    pages: Vec<PageSummary>,
    edges: Vec<LinkEdge>,
}

type SharedDomainStates = Arc<Mutex<HashMap<String, DomainState>>>;

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub robots_timeout_secs: u64,
}

/// Per-job pipeline (§4.12). One `CrawlerCore` is built per worker with its
/// own HTTP client (§5); the domain-scoped state (robots cache, politeness
/// timer, spam accumulator) is shared across workers via a cloned `Arc`.
#[derive(Clone)]
pub struct CrawlerCore {
    store: Arc<dyn Store>,
    cache: CacheFacade,
    fetcher: RateLimitedFetcher,
    domains: SharedDomainStates,
    config: CrawlerConfig,
}

/// Outcome of running one leased Job through the pipeline, for the Worker
/// Pool to log and act on.
pub enum JobOutcome {
    Completed,
    DegradedMetadata,
    Failed(String),
    /// Policy rejection (robots disallow, duplicate URL, depth exceeded):
    /// logged, never counted as a failure (§7).
    Skipped(String),
    Cancelled,
}

impl CrawlerCore {
    pub fn new(store: Arc<dyn Store>, cache: CacheFacade, config: CrawlerConfig) -> Self {
        let fetcher = RateLimitedFetcher::new(2, config.request_timeout_secs, &config.user_agent);
        CrawlerCore {
            store,
            cache,
            fetcher,
            domains: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Shares domain state with another `CrawlerCore` (used when the Worker
    /// Pool spins up additional workers that must see the same robots cache
    /// and politeness timers).
    pub fn fork_with_own_client(&self) -> Self {
        CrawlerCore {
            store: self.store.clone(),
            cache: self.cache.clone(),
            fetcher: RateLimitedFetcher::new(2, self.config.request_timeout_secs, &self.config.user_agent),
            domains: self.domains.clone(),
            config: self.config.clone(),
        }
    }

    async fn ensure_robots(&self, domain: &str) {
        let needs_fetch = {
            let states = self.domains.lock().unwrap();
            !states.contains_key(domain)
        };
        if !needs_fetch {
            return;
        }
        let checker = RobotsChecker::fetch(domain, self.config.robots_timeout_secs)
            .await
            .unwrap_or_default();
        let crawl_delay = checker.crawl_delay();
        let mut states = self.domains.lock().unwrap();
        states.entry(domain.to_string()).or_insert_with(|| DomainState {
            robots: Some(checker),
            crawl_delay,
            last_fetch: None,
            pages: Vec::new(),
            edges: Vec::new(),
        });
    }

    fn is_allowed(&self, domain: &str, url: &str) -> bool {
        let states = self.domains.lock().unwrap();
        states
            .get(domain)
            .and_then(|s| s.robots.as_ref())
            .map(|r| r.is_allowed(url))
            .unwrap_or(true)
    }

    /// Politeness wait: per worker, before each fetch, honoring the domain's
    /// crawl-delay if robots.txt declared one. Collective politeness across
    /// concurrently running workers is a known coarsening (§5).
    async fn wait_for_politeness(&self, domain: &str) {
        let wait = {
            let mut states = self.domains.lock().unwrap();
            let state = states.entry(domain.to_string()).or_default();
            let delay = state.crawl_delay.unwrap_or(0.0);
            if delay <= 0.0 {
                None
            } else {
                let elapsed = state.last_fetch.map(|t| t.elapsed());
                let needed = Duration::from_secs_f64(delay);
                match elapsed {
                    Some(e) if e < needed => Some(needed - e),
                    _ => None,
                }
            }
        };
        if let Some(w) = wait {
            tokio::time::sleep(w).await;
        }
        let mut states = self.domains.lock().unwrap();
        states.entry(domain.to_string()).or_default().last_fetch = Some(Instant::now());
    }

    /// Run the full pipeline for a Job that the caller has already leased
    /// (i.e. `claim_next_pending` already flipped it to `processing`).
    pub async fn execute(&self, job: &Job) -> JobOutcome {
        self.ensure_robots(&job.domain).await;

        if !self.is_allowed(&job.domain, &job.url) {
            self.finish_skipped(job, "blocked_by_robots").await;
            return JobOutcome::Skipped("blocked_by_robots".to_string());
        }

        self.wait_for_politeness(&job.domain).await;

        let fetch_result = match self.fetcher.fetch(&job.url).await {
            Ok(r) => r,
            Err(e) => {
                self.finish_failed(job, &format!("fetch_error: {e}")).await;
                return JobOutcome::Failed(e.to_string());
            }
        };

        if !(200..300).contains(&fetch_result.status_code) {
            let reason = format!("non_2xx_status: {}", fetch_result.status_code);
            self.finish_failed(job, &reason).await;
            return JobOutcome::Failed(reason);
        }

        let content_type = fetch_result
            .headers
            .get("content-type")
            .cloned()
            .unwrap_or_default();
        if !content_type.is_empty() && !content_type.contains("html") {
            // Boundary behavior (§8): non-HTML completes with no analysis, no children.
            self.finish_completed(job, Vec::new()).await;
            return JobOutcome::Completed;
        }

        let parsed = Parser::parse(&fetch_result.body, &fetch_result.final_url);
        let document = Html::parse_document(&fetch_result.body);

        let tracker_report = tracker::detect(&document, &fetch_result.final_url);
        let metadata_bundle = metadata::analyze(&parsed, &fetch_result.final_url);

        let headings_count = (parsed.headings.h1.len()
            + parsed.headings.h2.len()
            + parsed.headings.h3.len()
            + parsed.headings.h4.len()
            + parsed.headings.h5.len()
            + parsed.headings.h6.len()) as u32;

        let link_metrics = LinkMetrics {
            depth_from_root: job.depth,
            internal_link_count: parsed.internal_links.len() as u32,
            external_backlink_estimate: 0,
        };
        let content_metrics = ContentMetrics {
            has_structured_data: metadata_bundle.has_structured_data,
            is_article: metadata_bundle.is_article,
            has_publish_date: metadata_bundle.has_publish_date,
            has_author: metadata_bundle.has_author,
            has_og_tags: metadata_bundle.has_og_tags,
            word_count: parsed.word_count,
            headings_count,
            has_meta_description: metadata_bundle.has_meta_description,
        };
        let recently_crawled = self
            .store
            .has_recent_session(&job.domain, chrono::Duration::hours(24))
            .await
            .unwrap_or(false);
        let value_score = scorer::score(&fetch_result.final_url, link_metrics, &content_metrics, recently_crawled);

        let spam_report = {
            let mut states = self.domains.lock().unwrap();
            let state = states.entry(job.domain.clone()).or_default();
            state.pages.push(PageSummary {
                url: fetch_result.final_url.clone(),
                content_hash: spam::normalized_content_hash(&fetch_result.body),
                internal_link_count: parsed.internal_links.len() as u32,
                external_link_count: parsed.external_links.len() as u32,
                raw_content_sample: fetch_result.body.chars().take(2000).collect(),
            });
            for target in &parsed.external_links {
                state.edges.push(LinkEdge {
                    from: fetch_result.final_url.clone(),
                    to: target.clone(),
                });
            }
            spam::detect(&state.pages, &state.edges, None)
        };

        let analysis = PageAnalysis {
            job_id: job.id.clone(),
            url: fetch_result.final_url.clone(),
            total_score: value_score.total_score,
            crawl_priority: value_score.priority.numeric(),
            recommendation: priority_label(value_score.priority).to_string(),
            spam_report,
            query_intent: metadata_bundle.query_intent,
            tracker_risk: tracker_report.risk,
            tracker_profile: tracker_report.profile.as_str().to_string(),
            tracker_count: tracker_report.trackers.len() as u32,
            created_at: chrono::Utc::now(),
        };

        let favicon_url = favicon::resolve(
            self.fetcher.client(),
            &fetch_result.final_url,
            &parsed.html_favicon_candidates,
        )
        .await;
        let page_metadata = PageMetadata {
            job_id: job.id.clone(),
            url: fetch_result.final_url.clone(),
            title: parsed.title.clone(),
            description: parsed.meta_description.clone(),
            canonical_url: parsed.canonical_url.clone(),
            language: parsed.language.clone(),
            og_tags: parsed.og_tags.clone(),
            twitter_tags: parsed.twitter_tags.clone(),
            robots_index: parsed.robots_directives.index,
            robots_follow: parsed.robots_directives.follow,
            robots_archive: parsed.robots_directives.archive,
            robots_snippet: parsed.robots_directives.snippet,
            publish_date: parsed.publish_date.clone(),
            modified_date: parsed.modified_date.clone(),
            author: parsed.author.clone(),
            keywords: parsed.keywords.clone(),
            structured_data_types: metadata_bundle.structured_data_types.clone(),
            h1: parsed.headings.h1.clone(),
            h2: parsed.headings.h2.clone(),
            h3: parsed.headings.h3.clone(),
            internal_links: parsed.internal_links.clone(),
            external_links: parsed.external_links.clone(),
            images: parsed
                .images
                .iter()
                .map(|i| PageImageRef {
                    position: i.position,
                    src: i.src.clone(),
                    alt: i.alt.clone(),
                    width: i.width,
                    height: i.height,
                    responsive: i.responsive,
                })
                .collect(),
            word_count: parsed.word_count,
            text_content: parsed.text_content.clone(),
            favicon_url: favicon_url.clone(),
            created_at: Some(chrono::Utc::now()),
        };

        if let Err(e) = self.store.insert_analysis(analysis).await {
            self.finish_failed(job, &format!("store_error: {e}")).await;
            return JobOutcome::Failed(e.to_string());
        }
        if let Err(e) = self.store.insert_metadata(page_metadata).await {
            self.finish_failed(job, &format!("store_error: {e}")).await;
            return JobOutcome::Failed(e.to_string());
        }

        self.cache
            .set(CacheKind::Score, &job.domain, &job.id, &value_score.total_score)
            .await;
        self.cache.invalidate_domain(&job.domain).await;

        let children = if job.depth < job.max_depth {
            self.enqueue_children(job, &parsed.internal_links).await
        } else {
            Vec::new()
        };

        self.finish_completed(job, children).await;
        JobOutcome::Completed
    }

    async fn enqueue_children(&self, job: &Job, internal_links: &[String]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut created = Vec::new();

        for raw in internal_links {
            if created.len() >= MAX_CHILDREN_PER_PAGE {
                break;
            }
            let Some(normalized) = normalize::normalize(raw) else {
                continue;
            };
            if !same_registered_host(&normalized, &job.domain) {
                continue;
            }
            if !seen.insert(normalized.clone()) {
                continue;
            }
            let child = Job::new_child(job, normalized.clone(), job.priority);
            match self.store.create_job(child).await {
                Ok(created_job) => created.push(created_job.id),
                Err(StoreError::Conflict) => {
                    tracing::debug!(url = %normalized, "child job already exists, skipping");
                }
                Err(e) => {
                    tracing::warn!(url = %normalized, error = %e, "failed to enqueue child job");
                }
            }
        }
        created
    }

    async fn finish_completed(&self, job: &Job, children: Vec<String>) {
        let now = chrono::Utc::now();
        let update = JobUpdate {
            completed_at: Some(now),
            children: Some(children),
            ..Default::default()
        };
        if let Err(e) = self.store.update_job(&job.id, JobStatus::Completed, update).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to mark job completed");
        }
        if let Err(e) = self.store.record_job_outcome_on_session(&job.session_id, Some(true)).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to record session outcome");
        }
    }

    async fn finish_failed(&self, job: &Job, reason: &str) {
        let now = chrono::Utc::now();
        let update = JobUpdate {
            completed_at: Some(now),
            failure_reason: Some(reason.to_string()),
            annotation: Some(JobAnnotation {
                rejected: false,
                ..Default::default()
            }),
            ..Default::default()
        };
        if let Err(e) = self.store.update_job(&job.id, JobStatus::Failed, update).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to mark job failed");
        }
        if let Err(e) = self.store.record_job_outcome_on_session(&job.session_id, Some(false)).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to record session outcome");
        }
    }

    /// Policy rejection (robots disallow, duplicate, depth exceeded): a
    /// skip, not a failure — does not touch `failed_pages` (§7).
    async fn finish_skipped(&self, job: &Job, reason: &str) {
        let now = chrono::Utc::now();
        let update = JobUpdate {
            completed_at: Some(now),
            failure_reason: Some(reason.to_string()),
            ..Default::default()
        };
        if let Err(e) = self.store.update_job(&job.id, JobStatus::Skipped, update).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to mark job skipped");
        }
        if let Err(e) = self.store.record_job_outcome_on_session(&job.session_id, None).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to record session outcome");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrawlEngineError {
    #[error("URL blocked by robots.txt: {0}")]
    BlockedByRobots(String),
    #[error("fetch error: {0}")]
    FetchError(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_registered_host_matches_exact_and_subdomain() {
        assert!(same_registered_host("https://example.com/a", "example.com"));
        assert!(same_registered_host("https://blog.example.com/a", "example.com"));
        assert!(!same_registered_host("https://notexample.com/a", "example.com"));
        assert!(!same_registered_host("https://evilexample.com/a", "example.com"));
    }
}
