//! TTL cache store + the cache-or-fetch helper.
//!
//! The cache only saves remote calls. Nothing downstream depends on it being
//! reachable: a store failure reads as a miss and a failed write is dropped.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;

use crate::error::{FetchError, StoreUnavailable};
use crate::ingest::types::{Fetched, Fetcher};

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live value for `key`. Expired and never-set keys both read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable>;

    /// Overwrite `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreUnavailable>;

    /// Overwrite `key` with no expiry ("latest snapshot" keys).
    async fn set_forever(&self, key: &str, value: &str) -> Result<(), StoreUnavailable>;
}

/// Key prefix owned by one source: keys look like `{source}:{resource}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(source: &str) -> Self {
        Self(source.to_string())
    }

    pub fn key(&self, resource: &str) -> String {
        format!("{}:{resource}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Cache lifetime: `short` while the data may still change, `long` once settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub short: Duration,
    pub long: Duration,
}

impl TtlPolicy {
    pub fn fixed(ttl: Duration) -> Self {
        Self {
            short: ttl,
            long: ttl,
        }
    }

    pub fn split(short: Duration, long: Duration) -> Self {
        Self { short, long }
    }

    pub fn ttl_for(&self, settled: bool) -> Duration {
        if settled {
            self.long
        } else {
            self.short
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedFetch {
    pub fetched: Fetched,
    pub hit: bool,
}

/// Serve `key` from the store while it is live, otherwise fetch and cache it.
///
/// Only bodies that parse are written back.
pub async fn cached_fetch(
    store: &dyn CacheStore,
    key: &str,
    fetcher: &dyn Fetcher,
    ttl: &TtlPolicy,
) -> Result<CachedFetch, FetchError> {
    crate::metrics::ensure_described();

    match store.get(key).await {
        Ok(Some(raw)) => match fetcher.parse(&raw) {
            Ok(records) => {
                counter!("cache_hits_total").increment(1);
                return Ok(CachedFetch {
                    fetched: Fetched { records, raw },
                    hit: true,
                });
            }
            Err(e) => {
                tracing::debug!(target: "feedwatch::cache", key, error = %e, "cached body no longer parses");
            }
        },
        Ok(None) => {}
        Err(e) => store_degraded(key, &e),
    }

    counter!("cache_misses_total").increment(1);
    let fetched = fetcher.fetch().await?;
    let ttl = ttl.ttl_for(fetcher.is_settled(&fetched.records));
    if let Err(e) = store.set(key, &fetched.raw, ttl).await {
        store_degraded(key, &e);
    }
    Ok(CachedFetch {
        fetched,
        hit: false,
    })
}

/// Store failures degrade to misses and are logged at info.
pub(crate) fn store_degraded(key: &str, err: &StoreUnavailable) {
    counter!("store_unavailable_total").increment(1);
    tracing::info!(target: "feedwatch::cache", key, error = %err, "store unavailable, continuing without it");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Record;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        settled: bool,
    }

    #[async_trait]
    impl Fetcher for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        async fn fetch_raw(&self) -> Result<String, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("body-{n}"))
        }
        fn parse(&self, raw: &str) -> Result<Vec<Record>, FetchError> {
            if raw.starts_with("body-") {
                Ok(vec![Record::new(raw)])
            } else {
                Err(FetchError::parse(raw, "not a body"))
            }
        }
        fn is_settled(&self, _records: &[Record]) -> bool {
            self.settled
        }
    }

    struct DownStore;

    #[async_trait]
    impl CacheStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreUnavailable> {
            Err(StoreUnavailable("connection refused".into()))
        }
        async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreUnavailable> {
            Err(StoreUnavailable("connection refused".into()))
        }
        async fn set_forever(&self, _: &str, _: &str) -> Result<(), StoreUnavailable> {
            Err(StoreUnavailable("connection refused".into()))
        }
    }

    fn counting(settled: bool) -> Counting {
        Counting {
            calls: AtomicUsize::new(0),
            settled,
        }
    }

    #[test]
    fn namespace_prefixes_keys() {
        let ns = Namespace::new("asn");
        assert_eq!(ns.key("AS13335"), "asn:AS13335");
        assert_ne!(Namespace::new("a").key("b:c"), Namespace::new("a:b").key("d"));
    }

    #[test]
    fn ttl_policy_picks_by_settledness() {
        let p = TtlPolicy::split(Duration::from_secs(600), Duration::from_secs(7200));
        assert_eq!(p.ttl_for(false), Duration::from_secs(600));
        assert_eq!(p.ttl_for(true), Duration::from_secs(7200));
        let f = TtlPolicy::fixed(Duration::from_secs(60));
        assert_eq!(f.ttl_for(true), f.ttl_for(false));
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_within_ttl_is_served_from_cache() {
        let store = MemoryStore::new();
        let f = counting(false);
        let ttl = TtlPolicy::fixed(Duration::from_secs(600));

        let first = cached_fetch(&store, "k", &f, &ttl).await.unwrap();
        let second = cached_fetch(&store, "k", &f, &ttl).await.unwrap();

        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.fetched.raw, second.fetched.raw);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_data_uses_long_ttl() {
        let store = MemoryStore::new();
        let f = counting(true);
        let ttl = TtlPolicy::split(Duration::from_secs(600), Duration::from_secs(7200));

        cached_fetch(&store, "k", &f, &ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(601)).await;
        let again = cached_fetch(&store, "k", &f, &ttl).await.unwrap();
        assert!(again.hit, "long ttl should still be live");
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_refetch() {
        let store = MemoryStore::new();
        let f = counting(false);
        let ttl = TtlPolicy::fixed(Duration::from_secs(60));

        cached_fetch(&store, "k", &f, &ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let again = cached_fetch(&store, "k", &f, &ttl).await.unwrap();
        assert!(!again.hit);
        assert_eq!(again.fetched.raw, "body-1");
    }

    #[tokio::test]
    async fn unavailable_store_falls_back_to_fetcher() {
        let f = counting(false);
        let ttl = TtlPolicy::fixed(Duration::from_secs(60));
        let a = cached_fetch(&DownStore, "k", &f, &ttl).await.unwrap();
        let b = cached_fetch(&DownStore, "k", &f, &ttl).await.unwrap();
        assert!(!a.hit && !b.hit);
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unparsable_cached_body_is_refetched() {
        let store = MemoryStore::new();
        store.set_forever("k", "garbage").await.unwrap();
        let f = counting(false);
        let out = cached_fetch(&store, "k", &f, &TtlPolicy::fixed(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(!out.hit);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("body-0"));
    }
}
