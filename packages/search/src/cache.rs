//! Bounded, expiring cache of spatial query results.
//!
//! Keyed by the search centre rounded to 3 decimal places (about 110 m),
//! the radius, the row limit and the stable JSON form of the filters, so
//! nearby repeat searches reuse one backend round trip. When full, the
//! single entry with the oldest insertion time is evicted (earliest
//! inserted on a tie); reads do not refresh entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use planning_pulse_search_models::{
    Application, Coordinates, SearchFilters,
    clock::{Clock, system_clock},
};
use serde::Deserialize;

/// Expiry and size settings for a [`ResultCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResultCacheConfig {
    /// How long an entry is served, in seconds.
    pub ttl_secs: i64,
    /// Maximum number of entries.
    pub capacity: usize,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            capacity: 10,
        }
    }
}

/// A stored query result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// When the entry was inserted.
    pub stored_at: DateTime<Utc>,
    /// Rows as returned by the backend.
    pub data: Vec<Application>,
    /// Total matching rows reported by the backend.
    pub total_count: usize,
    /// Whether the rows came from the bounding-box fallback.
    pub used_fallback: bool,
    /// Search centre.
    pub coordinates: Coordinates,
    /// Search radius in kilometres.
    pub radius_km: f64,
    /// Row limit the rows were fetched with.
    pub page_size: usize,
    /// Filters the rows were fetched with.
    pub filters: SearchFilters,
}

/// Builds the cache key for a query.
#[must_use]
pub fn cache_key(
    center: Coordinates,
    radius_km: f64,
    page_size: usize,
    filters: &SearchFilters,
) -> String {
    format!(
        "{:.3},{:.3}:{radius_km}:{page_size}:{}",
        round3(center.lat),
        round3(center.lng),
        filters.cache_fragment()
    )
}

/// Rounds to 3 dp, folding `-0.0` into `0.0` so both sides of the meridian
/// share a key.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0 + 0.0
}

#[derive(Debug, Default)]
struct CacheState {
    next_seq: u64,
    entries: HashMap<String, (u64, CacheEntry)>,
}

/// Thread-safe result cache.
pub struct ResultCache {
    config: ResultCacheConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(ResultCacheConfig::default(), system_clock())
    }
}

impl ResultCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: ResultCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the unexpired entry for this query, if any.
    #[must_use]
    pub fn get(
        &self,
        center: Coordinates,
        radius_km: f64,
        page_size: usize,
        filters: &SearchFilters,
    ) -> Option<CacheEntry> {
        let key = cache_key(center, radius_km, page_size, filters);
        let now = self.clock.now();
        let ttl = Duration::seconds(self.config.ttl_secs);
        let mut state = self.lock();
        let entries = &mut state.entries;

        match entries.get(&key) {
            Some((_, entry)) if now - entry.stored_at < ttl => {
                log::debug!("result cache hit: {key}");
                Some(entry.clone())
            }
            Some(_) => {
                log::debug!("result cache expired: {key}");
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Stores rows for this query, replacing any previous entry.
    #[allow(clippy::too_many_arguments)]
    pub fn set(
        &self,
        center: Coordinates,
        radius_km: f64,
        page_size: usize,
        filters: &SearchFilters,
        data: Vec<Application>,
        total_count: usize,
        used_fallback: bool,
    ) {
        if self.config.capacity == 0 {
            return;
        }

        let key = cache_key(center, radius_km, page_size, filters);
        let entry = CacheEntry {
            stored_at: self.clock.now(),
            data,
            total_count,
            used_fallback,
            coordinates: center,
            radius_km,
            page_size,
            filters: filters.clone(),
        };

        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(key, (seq, entry));

        while state.entries.len() > self.config.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, (seq, entry))| (entry.stored_at, *seq))
                .map(|(k, _)| k.clone());
            match oldest {
                Some(oldest) => {
                    log::debug!("result cache full, evicting {oldest}");
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
