//! In-process cache store with per-entry TTL

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use super::CacheStore;
use crate::error::Result;
use async_trait::async_trait;

/// Writes after which `set` sweeps expired entries
const SWEEP_EVERY_WRITES: usize = 1_024;

/// Time after which `set` sweeps expired entries
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Cached value with its expiry deadline
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe in-memory [`CacheStore`].
///
/// Expired entries are dropped on read, and swept in bulk by `set` every
/// [`SWEEP_EVERY_WRITES`] writes or once the sweep interval has passed.
/// [`InMemoryCacheStore::spawn_sweeper`] adds a background sweep for idle
/// periods. There is no size-based eviction.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    expirations: AtomicUsize,

    sweep_interval: Duration,
    epoch: Instant,
    last_sweep_ms: AtomicU64,
    writes_since_sweep: AtomicUsize,
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            expirations: AtomicUsize::new(0),
            sweep_interval,
            epoch: Instant::now(),
            last_sweep_ms: AtomicU64::new(0),
            writes_since_sweep: AtomicUsize::new(0),
        }
    }

    /// Sweep expired entries every `every` on the current tokio runtime.
    ///
    /// The task holds a weak reference and ends once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!("Cache sweeper removed {} expired entries", removed);
                }
            }
        })
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        self.expirations.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Drop every entry and reset counters
    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn sweep_if_due(&self) {
        let writes = self.writes_since_sweep.fetch_add(1, Ordering::Relaxed) + 1;
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let last_ms = self.last_sweep_ms.load(Ordering::Relaxed);

        let interval_ms = self.sweep_interval.as_millis() as u64;
        let due = writes >= SWEEP_EVERY_WRITES || now_ms.saturating_sub(last_ms) >= interval_ms;

        // One writer wins the sweep; the others carry on
        if due
            && self
                .last_sweep_ms
                .compare_exchange(last_ms, now_ms, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            self.writes_since_sweep.store(0, Ordering::Relaxed);
            self.purge_expired();
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }

            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(entry.value.clone()));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        self.sweep_if_due();
        Ok(())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let store = InMemoryCacheStore::new();

        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1"));

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = InMemoryCacheStore::new();
        store.set("k", "0", Duration::from_millis(50)).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.get("k").await.unwrap().is_none());
        let stats = store.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_overwrite_resets_ttl() {
        let store = InMemoryCacheStore::new();
        store.set("k", "0", Duration::from_millis(20)).await.unwrap();
        store.set("k", "1", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_purge_and_clear() {
        let store = InMemoryCacheStore::new();
        store.set("short", "1", Duration::ZERO).await.unwrap();
        store.set("long", "1", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.stats().entries, 1);

        store.clear();
        assert_eq!(store.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_writes_reclaim_expired_entries() {
        let store = InMemoryCacheStore::with_sweep_interval(Duration::from_millis(20));

        for i in 0..4_000 {
            store
                .set(&format!("authz:u:resource-{}:read", i), "1", Duration::from_millis(10))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(40)).await;
        store.set("fresh", "1", Duration::from_secs(60)).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.expirations, 4_000);
    }

    #[tokio::test]
    async fn test_write_count_triggers_sweep() {
        let store = InMemoryCacheStore::new();

        for i in 0..SWEEP_EVERY_WRITES - 1 {
            store.set(&format!("k{}", i), "0", Duration::ZERO).await.unwrap();
        }
        assert_eq!(store.stats().entries, SWEEP_EVERY_WRITES - 1);

        // The write that reaches the threshold sweeps everything expired
        store.set("last", "0", Duration::ZERO).await.unwrap();
        assert_eq!(store.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_sweeper_reclaims_idle_entries() {
        let store = Arc::new(InMemoryCacheStore::new());
        let sweeper = store.spawn_sweeper(Duration::from_millis(10));

        for i in 0..4_000 {
            store
                .set(&format!("authz:u:resource-{}:read", i), "0", Duration::from_millis(10))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.stats().entries, 0);

        // The task ends with the store
        drop(store);
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .unwrap()
            .unwrap();
    }
}
