//! Scheduler (M3): discovery loop (auto-detect sitemaps, seed new sessions)
//! and queue-tick loop (delegates leasing to the Worker Pool), plus the
//! admin flag bag consulted at tick boundaries (§4.14).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::crawler::robots::RobotsChecker;
use crate::crawler::sitemap;
use crate::models::{Job, SessionConfig};
use crate::store::Store;

const MAX_SITEMAPS_PER_SITE: usize = 3;
const MAX_URLS_PER_SITEMAP: usize = 100;
const SESSION_FRESHNESS_HOURS: i64 = 24;

/// Plain booleans guarded by one lock (`AtomicBool`s suffice since each is
/// independent; `resume` clears all three at once).
#[derive(Default)]
pub struct AdminFlags {
    pub crawl_enabled: AtomicBool,
    pub index_enabled: AtomicBool,
    pub force_pause_index: AtomicBool,
}

impl AdminFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(AdminFlags {
            crawl_enabled: AtomicBool::new(true),
            index_enabled: AtomicBool::new(true),
            force_pause_index: AtomicBool::new(false),
        })
    }

    pub fn crawl_enabled(&self) -> bool {
        self.crawl_enabled.load(Ordering::Relaxed)
    }

    pub fn index_enabled(&self) -> bool {
        self.index_enabled.load(Ordering::Relaxed) && !self.force_pause_index.load(Ordering::Relaxed)
    }

    /// Admin force-stop (§6): halts new leasing from the next tick onward.
    /// In-flight jobs already leased run to completion; reversible by
    /// `resume` since the Worker Pool rechecks this flag every tick rather
    /// than tearing down its control loop.
    pub fn force_stop(&self) {
        self.crawl_enabled.store(false, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.crawl_enabled.store(true, Ordering::Relaxed);
        self.index_enabled.store(true, Ordering::Relaxed);
        self.force_pause_index.store(false, Ordering::Relaxed);
    }

    pub fn pause_index(&self) {
        self.force_pause_index.store(true, Ordering::Relaxed);
    }

    pub fn status(&self) -> (bool, bool, bool) {
        (
            self.crawl_enabled(),
            self.index_enabled.load(Ordering::Relaxed),
            self.force_pause_index.load(Ordering::Relaxed),
        )
    }
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    known_sites: Vec<String>,
    default_max_depth: u32,
    discovery_interval: Duration,
    queue_tick_interval: Duration,
    flags: Arc<AdminFlags>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        known_sites: Vec<String>,
        default_max_depth: u32,
        discovery_interval_secs: u64,
        queue_tick_interval_secs: u64,
        flags: Arc<AdminFlags>,
    ) -> Self {
        Scheduler {
            store,
            known_sites,
            default_max_depth,
            discovery_interval: Duration::from_secs(discovery_interval_secs),
            queue_tick_interval: Duration::from_secs(queue_tick_interval_secs),
            flags,
        }
    }

    /// Discovery loop: every `discovery_interval`, any known site without a
    /// session in the last 24h gets sitemap-discovered and seeded.
    pub async fn run_discovery_loop(&self) {
        let span = tracing::info_span!("scheduler_discovery");
        let _enter = span.enter();
        loop {
            if self.flags.crawl_enabled() {
                for domain in &self.known_sites {
                    if let Err(e) = self.maybe_seed_domain(domain).await {
                        tracing::error!(domain = %domain, error = %e, "discovery failed for domain");
                    }
                }
            }
            tokio::time::sleep(self.discovery_interval).await;
        }
    }

    async fn maybe_seed_domain(&self, domain: &str) -> Result<(), crate::store::StoreError> {
        let recent = self
            .store
            .has_recent_session(domain, chrono::Duration::hours(SESSION_FRESHNESS_HOURS))
            .await?;
        if recent {
            return Ok(());
        }

        tracing::info!(domain = %domain, "discovering sitemaps for new session");
        let robots = RobotsChecker::fetch(domain, 10).await.unwrap_or_default();
        let candidate_sitemaps = sitemap::discover_sitemaps(domain, &robots.sitemaps().to_vec()).await;

        let session = self
            .store
            .create_session(
                domain,
                SessionConfig {
                    max_depth: self.default_max_depth,
                    page_limit: 100,
                },
            )
            .await?;

        if candidate_sitemaps.is_empty() {
            let root = format!("https://{domain}/");
            let seed = Job::new_seed(&session.id, domain, root, self.default_max_depth, false);
            self.store.create_job(seed).await?;
            return Ok(());
        }

        for sitemap_url in candidate_sitemaps.iter().take(MAX_SITEMAPS_PER_SITE) {
            let result = sitemap::fetch_sitemap_urls(
                std::slice::from_ref(sitemap_url),
                domain,
                MAX_URLS_PER_SITEMAP,
            )
            .await;
            for entry in result.urls.into_iter().take(MAX_URLS_PER_SITEMAP) {
                let seed = Job::new_seed(&session.id, domain, entry.loc, self.default_max_depth, false);
                self.store.create_job(seed).await?;
            }
        }

        Ok(())
    }

    /// Queue-tick loop: every `queue_tick_interval`, just a heartbeat — the
    /// Worker Pool owns its own leasing tick; this loop exists so the
    /// Scheduler can apply admin pauses at the same cadence it advertises.
    pub async fn run_queue_tick_loop(&self) {
        let span = tracing::info_span!("scheduler_queue_tick");
        let _enter = span.enter();
        loop {
            tokio::time::sleep(self.queue_tick_interval).await;
            tracing::debug!(
                crawl_enabled = self.flags.crawl_enabled(),
                index_enabled = self.flags.index_enabled(),
                "queue tick"
            );
        }
    }
}
