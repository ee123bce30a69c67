//! Worker Pool (M2): bounded-concurrency dispatcher over the Crawler Core.
//! Grounded on the teacher's `jobs/mod.rs` control-loop shape (`JoinSet` +
//! `CancellationToken` + `biased` select), generalized from its mpsc queue
//! to atomic Store-backed leasing per SPEC_FULL §4.13.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::crawler::{CrawlerCore, JobOutcome};
use crate::indexer::Indexer;
use crate::store::Store;

const DEFAULT_GRACE_SECS: u64 = 10;

/// Aggregate counters for `/api/v1/workers/status` (§6).
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
}

struct SharedCounters {
    active: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

pub struct WorkerPool {
    store: Arc<dyn Store>,
    crawler: CrawlerCore,
    indexer: Arc<Indexer>,
    max_concurrent_jobs: usize,
    poll_interval: Duration,
    cancel: CancellationToken,
    counters: Arc<SharedCounters>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn Store>,
        crawler: CrawlerCore,
        indexer: Arc<Indexer>,
        max_concurrent_jobs: usize,
        poll_interval_secs: u64,
    ) -> Self {
        WorkerPool {
            store,
            crawler,
            indexer,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            cancel: CancellationToken::new(),
            counters: Arc::new(SharedCounters {
                active: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            }),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process shutdown: cancels the pool's control loop, which drains
    /// in-flight jobs within the grace window before `run` returns. A
    /// cancelled token stays cancelled — this is for terminating the
    /// process, not for the admin pause/resume endpoints, which gate on
    /// `crawl_enabled`/`index_enabled` instead (rechecked every tick, and
    /// reversible).
    pub fn force_stop(&self) {
        self.cancel.cancel();
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            active: self.counters.active.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed) as u64,
            failed: self.counters.failed.load(Ordering::Relaxed) as u64,
        }
    }

    /// Control loop: every tick, counts free slots, leases up to that many
    /// pending Jobs in priority order, and dispatches each to the Crawler
    /// Core. Runs until the cancellation token fires, then drains in-flight
    /// work within a bounded grace window before returning.
    pub async fn run(
        &self,
        crawl_enabled: impl Fn() -> bool + Send + Sync + 'static,
        index_enabled: impl Fn() -> bool + Send + Sync + 'static,
    ) {
        let span = tracing::info_span!("worker_pool");
        let _enter = span.enter();
        let crawl_enabled = Arc::new(crawl_enabled);
        let index_enabled = Arc::new(index_enabled);

        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    tracing::info!("worker pool received force-stop; draining in-flight jobs");
                    break;
                }

                _ = tokio::time::sleep(self.poll_interval) => {
                    if !crawl_enabled() {
                        continue;
                    }
                    let free_slots = self.max_concurrent_jobs.saturating_sub(tasks.len());
                    if free_slots == 0 {
                        continue;
                    }
                    for _ in 0..free_slots {
                        match self.store.claim_next_pending().await {
                            Ok(Some(job)) => {
                                let crawler = self.crawler.fork_with_own_client();
                                let indexer = self.indexer.clone();
                                let index_enabled = index_enabled.clone();
                                let counters = self.counters.clone();
                                let cancel = self.cancel.clone();
                                counters.active.fetch_add(1, Ordering::Relaxed);
                                tasks.spawn(async move {
                                    if cancel.is_cancelled() {
                                        counters.active.fetch_sub(1, Ordering::Relaxed);
                                        return;
                                    }
                                    tracing::info!(job_id = %job.id, url = %job.url, "job started");
                                    match crawler.execute(&job).await {
                                        JobOutcome::Completed | JobOutcome::DegradedMetadata => {
                                            counters.completed.fetch_add(1, Ordering::Relaxed);
                                            tracing::info!(job_id = %job.id, "job completed");
                                            if index_enabled() {
                                                if let Err(e) = indexer.index_job(&job.id, false).await {
                                                    tracing::error!(job_id = %job.id, error = %e, "indexing failed");
                                                }
                                            }
                                        }
                                        JobOutcome::Failed(reason) => {
                                            counters.failed.fetch_add(1, Ordering::Relaxed);
                                            tracing::warn!(job_id = %job.id, reason = %reason, "job failed");
                                        }
                                        JobOutcome::Skipped(reason) => {
                                            tracing::info!(job_id = %job.id, reason = %reason, "job skipped");
                                        }
                                        JobOutcome::Cancelled => {
                                            tracing::info!(job_id = %job.id, "job cancelled");
                                        }
                                    }
                                    counters.active.fetch_sub(1, Ordering::Relaxed);
                                });
                            }
                            Ok(None) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "failed to lease next pending job");
                                break;
                            }
                        }
                    }
                }

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "worker task panicked");
                    }
                }
            }
        }

        let grace = Duration::from_secs(DEFAULT_GRACE_SECS);
        if tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await
        .is_err()
        {
            tracing::warn!("force-stop grace period elapsed; aborting remaining jobs");
            tasks.shutdown().await;
        }

        if let Ok(dropped) = self.store.requeue_stuck_processing("cancelled").await {
            if dropped > 0 {
                tracing::info!(count = dropped, "dropped in-flight jobs to failed after force-stop");
            }
        }
    }
}
