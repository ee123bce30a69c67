//! Cache Facade (L10): opportunistic, never-authoritative KV mirror for
//! sessions, jobs, metadata, scores, search results, and intent summaries.
//! Grounded on `original_source/app/db/cache.py` (prefix, TTLs, pattern
//! invalidation, swallow-all-errors policy). Every operation returns
//! `Option`; a cache miss and a cache error are indistinguishable to the
//! caller.

use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const CRATE_PREFIX: &str = "siteindex";

#[derive(Debug, Clone, Copy)]
pub enum CacheKind {
    Session,
    Job,
    Metadata,
    Score,
    Search,
    Intent,
}

impl CacheKind {
    fn prefix(self) -> &'static str {
        match self {
            CacheKind::Session => "session",
            CacheKind::Job => "job",
            CacheKind::Metadata => "metadata",
            CacheKind::Score => "score",
            CacheKind::Search => "search",
            CacheKind::Intent => "intent",
        }
    }

    /// TTLs per §4.10/§6: session 1h, job 1h, metadata 24h, score 24h,
    /// search-result 5m, intent 1h.
    fn ttl(self) -> Duration {
        match self {
            CacheKind::Session => Duration::from_secs(3600),
            CacheKind::Job => Duration::from_secs(3600),
            CacheKind::Metadata => Duration::from_secs(24 * 3600),
            CacheKind::Score => Duration::from_secs(24 * 3600),
            CacheKind::Search => Duration::from_secs(300),
            CacheKind::Intent => Duration::from_secs(3600),
        }
    }
}

/// Best-effort Redis-backed cache. Constructing a `CacheFacade` never fails
/// on a bad connection string being merely unreachable at call time; every
/// method swallows backend errors and logs at `warn`.
#[derive(Clone)]
pub struct CacheFacade {
    client: Option<redis::Client>,
}

impl CacheFacade {
    /// `redis_url = None` disables the facade entirely (every call becomes
    /// a guaranteed miss) rather than erroring, matching §10.3's "its
    /// absence disables the Cache Facade rather than erroring".
    pub fn new(redis_url: Option<&str>) -> Self {
        let client = redis_url.and_then(|url| match redis::Client::open(url) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(error = %e, "failed to construct redis client; cache disabled");
                None
            }
        });
        CacheFacade { client }
    }

    fn key(kind: CacheKind, domain: &str, id: &str) -> String {
        format!("{CRATE_PREFIX}:{}:{domain}:{id}", kind.prefix())
    }

    async fn conn(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.client.as_ref()?;
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "redis connection failed; treating as cache miss");
                None
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, kind: CacheKind, domain: &str, id: &str) -> Option<T> {
        let mut conn = self.conn().await?;
        let key = Self::key(kind, domain, id);
        let raw: Option<String> = match conn.get(&key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "cache get failed");
                return None;
            }
        };
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    pub async fn set<T: Serialize>(&self, kind: CacheKind, domain: &str, id: &str, value: &T) {
        let Some(mut conn) = self.conn().await else {
            return;
        };
        let key = Self::key(kind, domain, id);
        let Ok(serialized) = serde_json::to_string(value) else {
            return;
        };
        let ttl_secs = kind.ttl().as_secs();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(&key, serialized, ttl_secs)
            .await
        {
            tracing::warn!(error = %e, key = %key, "cache set failed");
        }
    }

    /// Invalidate every key for a domain across all kinds, matching pattern
    /// `*:{domain}:*` under the crate-level prefix.
    pub async fn invalidate_domain(&self, domain: &str) {
        self.delete_by_pattern(&format!("{CRATE_PREFIX}:*:{domain}:*")).await;
    }

    /// Invalidate every key this facade owns.
    pub async fn clear_all(&self) {
        self.delete_by_pattern(&format!("{CRATE_PREFIX}:*")).await;
    }

    async fn delete_by_pattern(&self, pattern: &str) {
        let Some(mut conn) = self.conn().await else {
            return;
        };
        let keys: Vec<String> = match conn.keys(pattern).await {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(error = %e, pattern = %pattern, "cache scan failed");
                return;
            }
        };
        if keys.is_empty() {
            return;
        }
        if let Err(e) = conn.del::<_, ()>(keys).await {
            tracing::warn!(error = %e, pattern = %pattern, "cache delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_cache_always_misses_without_erroring() {
        let cache = CacheFacade::new(None);
        let result: Option<String> = cache.get(CacheKind::Job, "example.com", "job-1").await;
        assert!(result.is_none());
        cache.set(CacheKind::Job, "example.com", "job-1", &"value".to_string()).await;
        cache.invalidate_domain("example.com").await;
        cache.clear_all().await;
    }

    #[test]
    fn kind_ttls_match_contract() {
        assert_eq!(CacheKind::Session.ttl(), Duration::from_secs(3600));
        assert_eq!(CacheKind::Metadata.ttl(), Duration::from_secs(86400));
        assert_eq!(CacheKind::Search.ttl(), Duration::from_secs(300));
    }

    #[test]
    fn key_includes_crate_prefix_kind_and_domain() {
        let key = CacheFacade::key(CacheKind::Score, "example.com", "abc");
        assert_eq!(key, "siteindex:score:example.com:abc");
    }
}
