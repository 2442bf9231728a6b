use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::CacheStore;
use crate::error::StoreUnavailable;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| now < t)
    }
}

/// In-process store. Expiry is checked lazily on read.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, StoreUnavailable> {
        self.inner
            .lock()
            .map_err(|_| StoreUnavailable("memory store mutex poisoned".into()))
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut map) = self.lock() else {
            return 0;
        };
        let now = Instant::now();
        let before = map.len();
        map.retain(|_, e| e.is_live(now));
        before - map.len()
    }

    /// Number of stored entries, expired ones included until purged or read.
    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
        let mut map = self.lock()?;
        match map.get(key) {
            Some(e) if e.is_live(Instant::now()) => return Ok(Some(e.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        // expired
        map.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreUnavailable> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Some(Instant::now() + ttl),
        };
        self.lock()?.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_forever(&self, key: &str, value: &str) -> Result<(), StoreUnavailable> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: None,
        };
        self.lock()?.insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expired_key_reads_as_absent() {
        let store = MemoryStore::new();
        store.set("a:1", "v", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("a:1").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.get("a:1").await.unwrap(), None);
        assert_eq!(store.get("never:set").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_forever_clears_previous_ttl() {
        let store = MemoryStore::new();
        store.set("a:latest", "old", Duration::from_secs(5)).await.unwrap();
        store.set_forever("a:latest", "new").await.unwrap();

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(store.get("a:latest").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_and_resets_expiry() {
        let store = MemoryStore::new();
        store.set("k", "one", Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        store.set("k", "two", Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let store = MemoryStore::new();
        store.set("short", "x", Duration::from_secs(1)).await.unwrap();
        store.set("long", "x", Duration::from_secs(100)).await.unwrap();
        store.set_forever("forever", "x").await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 2);
    }
}
