use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::CacheError;

/// TTL applied when `set` is called without one.
/// Short enough that edits made by other users show up quickly.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counters describing how the cache has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner<V> {
    entries: LruCache<String, CacheEntry<V>>,
    stats: CacheStats,
}

/// Bounded, time-limited cache for read query results.
///
/// Recency order lives in the LRU map: a successful `get` or a `set` moves the
/// key to the most-recently-used end, and inserting a new key at capacity
/// evicts the least-recently-used one. Expiry is checked lazily on `get`.
///
/// All bookkeeping happens under a short synchronous lock, so one instance can
/// be shared across tasks behind an `Arc`.
pub struct QueryCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: NonZeroUsize,
    default_ttl: Duration,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        Self::with_default_ttl(capacity, DEFAULT_TTL)
    }

    pub fn with_default_ttl(capacity: usize, default_ttl: Duration) -> Result<Self, CacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity)?;
        if default_ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        Ok(Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            capacity,
            default_ttl,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        // Bookkeeping never panics mid-update, so a poisoned lock still holds consistent state
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry, marking it most-recently-used.
    ///
    /// A miss and an expired entry both yield `Ok(None)`; the expired entry is
    /// dropped on the way out.
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }

        let now = Instant::now();
        let mut inner = self.lock();

        let lookup = inner
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));

        match lookup {
            None => {
                inner.stats.misses += 1;
                trace!(key = key, "Cache miss");
                Ok(None)
            }
            Some(None) => {
                inner.entries.pop(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                trace!(key = key, "Cache entry expired");
                Ok(None)
            }
            Some(Some(value)) => {
                inner.stats.hits += 1;
                Ok(Some(value))
            }
        }
    }

    /// Store `value` under `key` for `ttl` (or the default TTL).
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<(), CacheError> {
        let ttl = self.checked_ttl(key, ttl)?;
        self.insert(key, value, ttl);
        Ok(())
    }

    /// Validate a key and resolve the TTL to use for it.
    fn checked_ttl(&self, key: &str, ttl: Option<Duration>) -> Result<Duration, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        Ok(ttl)
    }

    fn insert(&self, key: &str, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };

        let mut inner = self.lock();
        if !inner.entries.contains(key) && inner.entries.len() >= self.capacity.get() {
            if let Some((evicted, _)) = inner.entries.pop_lru() {
                inner.stats.evictions += 1;
                debug!(key = %evicted, "Evicted least recently used cache entry");
            }
        }
        inner.entries.put(key.to_string(), entry);
        inner.stats.inserts += 1;
    }

    /// Remove entries. `None` clears the cache; `Some(pattern)` removes every
    /// key containing `pattern`. Returns how many entries were removed.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut inner = self.lock();
        let removed = match pattern {
            None => {
                let count = inner.entries.len();
                inner.entries.clear();
                count
            }
            Some(pattern) => {
                let matching: Vec<String> = inner
                    .entries
                    .iter()
                    .filter(|(key, _)| key.contains(pattern))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in &matching {
                    inner.entries.pop(key);
                }
                matching.len()
            }
        };
        debug!(pattern = ?pattern, removed = removed, "Cache invalidated");
        removed
    }

    /// Return the cached value for `key`, or run `query_fn`, cache its result
    /// and return it.
    ///
    /// Failures from `query_fn` are returned as-is and nothing is stored, so the
    /// next call tries again. Concurrent misses on one key may each run their
    /// own `query_fn`. The key and TTL are checked before `query_fn` runs.
    pub async fn cached_query<F, Fut, E>(
        &self,
        key: &str,
        query_fn: F,
        ttl: Option<Duration>,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<CacheError>,
    {
        let ttl = self.checked_ttl(key, ttl)?;
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }

        let value = query_fn().await?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}

// ============================================================================
// Tests
// ============================================================================
