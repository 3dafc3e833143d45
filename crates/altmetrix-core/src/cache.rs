//! In-memory response cache keyed by request URL.
//!
//! Concurrent misses on the same URL are not coalesced: both callers hit the
//! network and the later `put` wins.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::http_client::HttpResponse;

#[derive(Debug, Clone)]
struct CacheEntry {
    response: HttpResponse,
    /// `None` when the TTL is too large to represent; the entry never expires.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    /// Expiry queue, soonest first. Overwritten keys leave stale slots that
    /// are discarded when they come due.
    expiries: BinaryHeap<Reverse<(Instant, String)>>,
    default_ttl: Duration,
}

impl CacheInner {
    fn new(default_ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            expiries: BinaryHeap::new(),
            default_ttl,
        }
    }

    fn get(&self, key: &str) -> Option<HttpResponse> {
        let now = Instant::now();
        self.map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.response.clone())
    }

    fn put(&mut self, key: String, response: HttpResponse, ttl: Duration) {
        let now = Instant::now();
        self.evict_due(now);

        let expires_at = now.checked_add(ttl);
        if let Some(expires_at) = expires_at {
            self.expiries.push(Reverse((expires_at, key.clone())));
        }
        self.map.insert(
            key,
            CacheEntry {
                response,
                expires_at,
            },
        );
    }

    /// Drop every entry whose expiry has passed.
    fn evict_due(&mut self, now: Instant) {
        while let Some(Reverse((expires_at, _))) = self.expiries.peek() {
            if *expires_at > now {
                break;
            }
            let Some(Reverse((expires_at, key))) = self.expiries.pop() else {
                break;
            };
            if self
                .map
                .get(&key)
                .is_some_and(|entry| entry.expires_at == Some(expires_at))
            {
                self.map.remove(&key);
            }
        }
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.evict_due(now);
        self.map.retain(|_, entry| entry.is_live(now));
    }

    fn clear(&mut self) {
        self.map.clear();
        self.expiries.clear();
    }
}

/// Thread-safe in-memory cache shared by every provider of a process.
///
/// Each provider passes its own `max_cache_duration` as the TTL override; a
/// zero TTL turns caching off for that write.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl CacheStore {
    /// Create a new cache store with a default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner::new(default_ttl))),
        }
    }

    /// Create a disabled cache.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Get the cached response for `url` if it exists and hasn't expired.
    pub async fn get(&self, url: &str) -> Option<HttpResponse> {
        let store = self.inner.read().await;
        store.get(url)
    }

    /// Store a response under `url`.
    ///
    /// `ttl_override` replaces the default TTL. Writes are dropped when the
    /// effective TTL is zero. Entries that have expired are reclaimed on
    /// every write.
    pub async fn put(&self, url: &str, response: HttpResponse, ttl_override: Option<Duration>) {
        let mut store = self.inner.write().await;
        let ttl = ttl_override.unwrap_or(store.default_ttl);
        if ttl.is_zero() {
            return;
        }

        store.put(url.to_owned(), response, ttl);
    }

    /// Remove expired entries from the cache.
    pub async fn clear_expired(&self) {
        let mut store = self.inner.write().await;
        store.clear_expired();
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.clear();
    }

    /// Number of entries in the cache, including expired ones not yet
    /// reclaimed by a write.
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
