use std::sync::Arc;

use siteindex_crawler::cache::CacheFacade;
use siteindex_crawler::config::Config;
use siteindex_crawler::crawler::{CrawlerConfig, CrawlerCore};
use siteindex_crawler::indexer::Indexer;
use siteindex_crawler::pool::WorkerPool;
use siteindex_crawler::scheduler::{AdminFlags, Scheduler};
use siteindex_crawler::store::{PgStore, Store};
use siteindex_crawler::{build_app, AppState};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config =
        Arc::new(Config::from_env().expect("failed to load configuration from environment"));
    let port = config.port;

    let store: Arc<dyn Store> = Arc::new(
        PgStore::connect(&config.database_url)
            .await
            .expect("failed to connect to database"),
    );
    let cache = CacheFacade::new(config.redis_url.as_deref());

    let crawler_config = CrawlerConfig {
        user_agent: config.user_agent.clone(),
        request_timeout_secs: config.request_timeout_secs,
        robots_timeout_secs: config.robots_timeout_secs,
    };
    let crawler = CrawlerCore::new(store.clone(), cache.clone(), crawler_config);
    let indexer = Arc::new(Indexer::new(store.clone()));

    let pool = Arc::new(WorkerPool::new(
        store.clone(),
        crawler,
        indexer.clone(),
        config.max_concurrent_jobs,
        config.poll_interval_secs,
    ));

    let flags = AdminFlags::new();
    let scheduler = Scheduler::new(
        store.clone(),
        config.known_sites.clone(),
        config.default_max_depth,
        config.discovery_interval_secs,
        config.queue_tick_interval_secs,
        flags.clone(),
    );

    let state = AppState {
        config: config.clone(),
        store,
        cache,
        flags: flags.clone(),
        pool: pool.clone(),
        indexer,
    };

    {
        let pool = pool.clone();
        let flags = flags.clone();
        let flags_index = flags.clone();
        tokio::spawn(async move {
            pool.run(move || flags.crawl_enabled(), move || flags_index.index_enabled())
                .await
        });
    }
    {
        let scheduler = Arc::new(scheduler);
        let discovery = scheduler.clone();
        tokio::spawn(async move { discovery.run_discovery_loop().await });
        let queue_tick = scheduler.clone();
        tokio::spawn(async move { queue_tick.run_queue_tick_loop().await });
    }

    let app = build_app(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("crawler service starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind to address");

    axum::serve(listener, app).await.expect("server error");
}
