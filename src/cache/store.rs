//! In-process TTL key-value store.
//!
//! # Responsibilities
//! - JSON values with per-entry expiry (lazy on read + periodic sweep)
//! - Atomic counters for the daily spending accumulators
//! - Capped prepend-lists for notification feeds
//! - Prefix invalidation for post-commit cache busting

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::observability::metrics;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// Reading of a spending accumulator.
///
/// An absent entry is a defined state, not an error: the accumulator for a
/// (card, day) pair starts to exist on the first committed debit of that day.
/// Callers that need a number use [`SpendReading::or_zero`]; the
/// default-to-zero policy is part of this read contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendReading {
    /// The accumulator exists and holds this total.
    Known(u64),
    /// No accumulator entry for this key (nothing committed yet today).
    Absent,
}

impl SpendReading {
    /// Collapse to a number, treating absence as zero.
    pub fn or_zero(self) -> u64 {
        match self {
            SpendReading::Known(n) => n,
            SpendReading::Absent => 0,
        }
    }
}

/// A thread-safe TTL cache shared across the gateway's services.
#[derive(Clone, Default)]
pub struct CacheStore {
    inner: Arc<DashMap<String, Entry>>,
}

impl CacheStore {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Store a serializable value under `key`, replacing any previous entry.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to serialize cache value");
                return;
            }
        };
        self.inner.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        metrics::record_cache_size(self.inner.len());
    }

    /// Fetch and deserialize the value under `key`.
    ///
    /// Expired entries are removed on the way out and reported as a miss.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        // Clone out of the shard before any removal; holding the read guard
        // across remove_if on the same key would deadlock.
        let (value, expired) = match self.inner.get(key) {
            Some(entry) if !entry.is_expired(now) => (Some(entry.value.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };

        if expired {
            self.inner.remove_if(key, |_, e| e.is_expired(now));
        }

        match value {
            Some(v) => {
                metrics::record_cache_access(true);
                serde_json::from_value(v).ok()
            }
            None => {
                metrics::record_cache_access(false);
                None
            }
        }
    }

    /// Remove a single key. Returns true if an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.inner.remove(key).is_some();
        metrics::record_cache_size(self.inner.len());
        removed
    }

    /// Remove every key starting with `prefix`. Returns the count removed.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let before = self.inner.len();
        self.inner.retain(|k, _| !k.starts_with(prefix));
        let removed = before.saturating_sub(self.inner.len());
        metrics::record_cache_size(self.inner.len());
        removed
    }

    /// Atomically add `delta` to the counter under `key` and return the new
    /// total. A missing or expired entry restarts the counter at `delta`.
    ///
    /// The entry API serializes all writers of one key, so concurrent
    /// increments never lose updates. This is the only sanctioned way to
    /// update a spending accumulator.
    pub fn incr_by(&self, key: &str, delta: u64, ttl: Option<Duration>) -> u64 {
        let now = Instant::now();
        let mut entry = self.inner.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::from(0u64),
            expires_at: ttl.map(|d| now + d),
        });

        let current = if entry.is_expired(now) {
            0
        } else {
            entry.value.as_u64().unwrap_or(0)
        };
        let next = current.saturating_add(delta);
        entry.value = Value::from(next);
        // TTL is anchored to the latest write so the entry survives until
        // its caller-chosen horizon (end of day for accumulators).
        entry.expires_at = ttl.map(|d| now + d);
        next
    }

    /// Read a counter as a [`SpendReading`].
    pub fn counter(&self, key: &str) -> SpendReading {
        match self.get_json::<u64>(key) {
            Some(n) => SpendReading::Known(n),
            None => SpendReading::Absent,
        }
    }

    /// Prepend `value` onto the list under `key`, truncating to `cap`
    /// entries, and refresh the list TTL.
    pub fn push_capped<T: Serialize>(&self, key: &str, value: &T, cap: usize, ttl: Option<Duration>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to serialize list entry");
                return;
            }
        };

        let now = Instant::now();
        let mut entry = self.inner.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Array(Vec::new()),
            expires_at: ttl.map(|d| now + d),
        });

        let mut list = if entry.is_expired(now) {
            Vec::new()
        } else {
            match std::mem::take(&mut entry.value) {
                Value::Array(items) => items,
                _ => Vec::new(),
            }
        };
        list.insert(0, value);
        list.truncate(cap);
        entry.value = Value::Array(list);
        entry.expires_at = ttl.map(|d| now + d);
    }

    /// Read the list under `key` (empty if absent or expired).
    pub fn get_list(&self, key: &str) -> Vec<Value> {
        self.get_json::<Vec<Value>>(key).unwrap_or_default()
    }

    /// Number of live entries (expired-but-unswept entries included).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every expired entry. Returns the count removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, e| !e.is_expired(now));
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired cache entries");
            metrics::record_cache_size(self.inner.len());
        }
        removed
    }

    /// Spawn the periodic sweep task. Stops when the shutdown signal fires.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.sweep_expired();
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Cache sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let cache = CacheStore::new();
        cache.set_json("k", &serde_json::json!({"a": 1}), None);
        let v: Value = cache.get_json("k").unwrap();
        assert_eq!(v["a"], 1);
        assert!(cache.get_json::<Value>("missing").is_none());
    }

    #[tokio::test]
    async fn test_expiry_is_a_miss() {
        let cache = CacheStore::new();
        cache.set_json("k", &1u64, Some(Duration::from_millis(20)));
        assert_eq!(cache.get_json::<u64>("k"), Some(1));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get_json::<u64>("k").is_none());
    }

    #[test]
    fn test_counter_absent_sentinel() {
        let cache = CacheStore::new();
        assert_eq!(cache.counter("spend"), SpendReading::Absent);
        assert_eq!(cache.counter("spend").or_zero(), 0);

        cache.incr_by("spend", 500, None);
        assert_eq!(cache.counter("spend"), SpendReading::Known(500));
    }

    #[tokio::test]
    async fn test_incr_is_atomic_under_contention() {
        let cache = CacheStore::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    cache.incr_by("spend", 1, None);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(cache.counter("spend"), SpendReading::Known(800));
    }

    #[test]
    fn test_push_capped_prepends_and_truncates() {
        let cache = CacheStore::new();
        for i in 0..5u64 {
            cache.push_capped("feed", &i, 3, None);
        }
        let list = cache.get_list("feed");
        assert_eq!(list.len(), 3);
        // Newest first
        assert_eq!(list[0], Value::from(4u64));
        assert_eq!(list[2], Value::from(2u64));
    }

    #[test]
    fn test_delete_prefix() {
        let cache = CacheStore::new();
        cache.set_json("fastValidation:card-1:100", &true, None);
        cache.set_json("fastValidation:card-1:200", &true, None);
        cache.set_json("fastValidation:card-2:100", &true, None);

        let removed = cache.delete_prefix("fastValidation:card-1:");
        assert_eq!(removed, 2);
        assert!(cache.get_json::<bool>("fastValidation:card-2:100").is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let cache = CacheStore::new();
        cache.set_json("short", &1u64, Some(Duration::from_millis(10)));
        cache.set_json("long", &2u64, Some(Duration::from_secs(60)));
        cache.set_json("forever", &3u64, None);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 2);
    }
}
