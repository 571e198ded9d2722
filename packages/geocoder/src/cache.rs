//! In-memory cache of resolved search terms.
//!
//! Entries are keyed by the normalized term; the resolver writes each
//! success under both the normalized key and its lowercase form so that
//! `"Camden Town"` and `"camden town"` share a hit. The cache is passed to
//! the resolver explicitly and may be shared between resolvers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use planning_pulse_search_models::{
    Coordinates,
    clock::{Clock, system_clock},
};
use serde::Deserialize;

/// Capacity and expiry settings for a [`CoordinateCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoordinateCacheConfig {
    /// Maximum number of keys held.
    pub capacity: usize,
    /// How long an entry stays valid, in seconds.
    pub ttl_secs: i64,
}

impl Default for CoordinateCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            ttl_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    coordinates: Coordinates,
    stored_at: DateTime<Utc>,
}

/// Thread-safe term → coordinates cache with expiry and a size bound.
pub struct CoordinateCache {
    config: CoordinateCacheConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl std::fmt::Debug for CoordinateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateCache")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for CoordinateCache {
    fn default() -> Self {
        Self::new(CoordinateCacheConfig::default(), system_clock())
    }
}

impl CoordinateCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CoordinateCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached coordinates for `key` if present and unexpired.
    ///
    /// Expired entries are removed on access.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Coordinates> {
        let now = self.clock.now();
        let ttl = Duration::seconds(self.config.ttl_secs);
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if now - entry.stored_at < ttl => Some(entry.coordinates),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `coordinates` under `key`, evicting the oldest entry when
    /// the cache is full.
    pub fn insert(&self, key: &str, coordinates: Coordinates) {
        if self.config.capacity == 0 {
            return;
        }

        let now = self.clock.now();
        let mut entries = self.lock();

        if !entries.contains_key(key) && entries.len() >= self.config.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                coordinates,
                stored_at: now,
            },
        );
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of keys currently held, including not yet evicted expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use planning_pulse_search_models::clock::ManualClock;

    use super::*;

    fn cache_with(capacity: usize) -> (CoordinateCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = CoordinateCache::new(
            CoordinateCacheConfig {
                capacity,
                ttl_secs: 60,
            },
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn stores_and_expires() {
        let (cache, clock) = cache_with(10);
        let here = Coordinates::new(51.5, -0.12);
        cache.insert("SW1A 1AA", here);
        assert_eq!(cache.get("SW1A 1AA"), Some(here));

        clock.advance(Duration::seconds(61));
        assert_eq!(cache.get("SW1A 1AA"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_oldest_when_full() {
        let (cache, clock) = cache_with(2);
        cache.insert("a", Coordinates::new(1.0, 1.0));
        clock.advance(Duration::seconds(1));
        cache.insert("b", Coordinates::new(2.0, 2.0));
        clock.advance(Duration::seconds(1));
        cache.insert("c", Coordinates::new(3.0, 3.0));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn overwriting_does_not_evict() {
        let (cache, _clock) = cache_with(1);
        cache.insert("a", Coordinates::new(1.0, 1.0));
        cache.insert("a", Coordinates::new(2.0, 2.0));
        assert_eq!(cache.get("a"), Some(Coordinates::new(2.0, 2.0)));
    }

    #[test]
    fn clear_empties_cache() {
        let (cache, _clock) = cache_with(10);
        cache.insert("leeds", Coordinates::new(53.8, -1.55));
        cache.clear();
        assert!(cache.is_empty());
    }
}
