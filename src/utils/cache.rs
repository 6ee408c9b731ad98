//! In-Memory Response Cache
//!
//! Sits between the activity service and the rate-limited client so that
//! repeated queries for the same wallet (the history endpoint is read twice per
//! wallet) cost one unit of rate budget instead of two.
//!
//! Features:
//! - TTL-based expiration, checked explicitly on every `get`
//! - Bounded size, oldest entry evicted first
//! - Key normalization (lowercase)
//! - Thread-safe with DashMap

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::CacheConfig;

/// Cache entry with creation time for TTL validation
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: Instant,
}

impl CacheEntry {
    /// Expired once its age reaches `ttl`
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }

    /// Time left before expiry
    pub fn remaining_ttl(&self, ttl: Duration) -> Duration {
        ttl.saturating_sub(self.created_at.elapsed())
    }
}

/// Bounded TTL cache of raw service responses
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<DashMap<String, CacheEntry>>,
    capacity: usize,
    ttl: Duration,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            capacity: config.capacity.max(1),
            ttl: config.ttl,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    fn normalize_key(key: &str) -> String {
        key.to_lowercase()
    }

    /// Returns the cached value if present and not expired.
    /// Expired entries are removed on the way out.
    pub fn get(&self, key: &str) -> Option<Value> {
        let key = Self::normalize_key(key);

        let expired = match self.store.get(&key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "✅ CACHE HIT: {} (TTL: {}s remaining)",
                    key,
                    entry.remaining_ttl(self.ttl).as_secs()
                );
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.store.remove(&key);
            debug!("📭 CACHE MISS (expired): {}", key);
        } else {
            debug!("📭 CACHE MISS: {}", key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a value, then evict expired entries and the oldest entries
    /// until the cache is back within capacity
    pub fn put(&self, key: &str, value: Value) {
        let key = Self::normalize_key(key);

        self.store.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
        debug!("💾 CACHE SET: {} (TTL: {}s)", key, self.ttl.as_secs());

        if self.store.len() > self.capacity {
            self.cleanup_expired();
            while self.store.len() > self.capacity {
                if !self.evict_oldest() {
                    break;
                }
            }
        }
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .store
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                // Another put may have evicted the same entry first
                if self.store.remove(&key).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!("🗑️ CACHE EVICT: {}", key);
                }
                true
            }
            None => false,
        }
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        let ttl = self.ttl;
        self.store.retain(|_, entry| !entry.is_expired(ttl));
        let removed = before.saturating_sub(self.store.len());
        if removed > 0 {
            debug!("🧹 CACHE CLEANUP: {} expired entries removed", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}
