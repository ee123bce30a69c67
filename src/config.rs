use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub port: u16,
    pub max_concurrent_jobs: usize,
    pub poll_interval_secs: u64,
    pub discovery_interval_secs: u64,
    pub queue_tick_interval_secs: u64,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub robots_timeout_secs: u64,
    pub shared_secret: String,
    pub default_page_limit: u32,
    pub default_max_depth: u32,
    pub known_sites: Vec<String>,
}

impl Config {
    /// Assembled once at process start; a misconfigured deployment fails
    /// here rather than mid-crawl.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let redis_url = env::var("REDIS_URL").ok();
        let shared_secret =
            env::var("SHARED_SECRET").map_err(|_| ConfigError::Missing("SHARED_SECRET"))?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("PORT", "must be a valid u16"))?;

        let max_concurrent_jobs = env::var("MAX_CONCURRENT_JOBS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue("MAX_CONCURRENT_JOBS", "must be a valid usize"))?;

        let poll_interval_secs = env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue("POLL_INTERVAL_SECS", "must be a valid u64"))?;

        let discovery_interval_secs = env::var("DISCOVERY_INTERVAL_SECS")
            .unwrap_or_else(|_| "21600".to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("DISCOVERY_INTERVAL_SECS", "must be a valid u64")
            })?;

        let queue_tick_interval_secs = env::var("QUEUE_TICK_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("QUEUE_TICK_INTERVAL_SECS", "must be a valid u64")
            })?;

        let user_agent = env::var("USER_AGENT").unwrap_or_else(|_| {
            "siteindex-crawler/0.1 (+https://example.com/bot)".to_string()
        });

        let request_timeout_secs = env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("REQUEST_TIMEOUT_SECS", "must be a valid u64")
            })?;

        let robots_timeout_secs = env::var("ROBOTS_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("ROBOTS_TIMEOUT_SECS", "must be a valid u64")
            })?;

        let default_page_limit = env::var("DEFAULT_PAGE_LIMIT")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue("DEFAULT_PAGE_LIMIT", "must be a valid u32")
            })?;

        let default_max_depth = env::var("DEFAULT_MAX_DEPTH")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue("DEFAULT_MAX_DEPTH", "must be a valid u32")
            })?;

        let known_sites = env::var("KNOWN_SITES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Config {
            database_url,
            redis_url,
            port,
            max_concurrent_jobs,
            poll_interval_secs,
            discovery_interval_secs,
            queue_tick_interval_secs,
            user_agent,
            request_timeout_secs,
            robots_timeout_secs,
            shared_secret,
            default_page_limit,
            default_max_depth,
            known_sites,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, &'static str),
}
