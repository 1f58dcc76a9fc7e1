//! Time-based freshness and throttle bookkeeping for fetched odds data.
//!
//! Nothing here performs I/O or awaits. Every operation takes the map lock
//! for the duration of one lookup or replacement, so readers never observe a
//! half-written entry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;
use crate::models::SportSummary;

const SPORTS_LIST_KEY: &str = "sports";

/// A payload together with the moment it was fetched. Never mutated after
/// creation; a refresh swaps in a new entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub fetched_at: Instant,
    pub fetched_at_utc: DateTime<Utc>,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T) -> Self {
        Self {
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            payload,
        }
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }

    /// Fresh strictly before `ttl` has elapsed; an entry exactly `ttl` old is expired.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// Key-addressed store of the most recent payload per resource.
pub struct StalenessCache<V> {
    entries: RwLock<HashMap<String, Arc<CacheEntry<V>>>>,
}

impl<V> Default for StalenessCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> fmt::Debug for StalenessCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StalenessCache")
            .field("keys", &self.keys())
            .finish()
    }
}

impl<V> StalenessCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    // Writes are single inserts or removes; a poisoned map is still consistent.
    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CacheEntry<V>>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<CacheEntry<V>>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the entry whatever its age, for stale-while-revalidate reads.
    pub fn get_stale(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
        self.read_map().get(key).cloned()
    }

    /// Replaces any existing entry for `key`, stamped with the current time.
    pub fn put(&self, key: impl Into<String>, payload: V) {
        let key = key.into();
        let entry = Arc::new(CacheEntry::new(payload));
        self.write_map().insert(key, entry);
    }

    /// True iff an entry exists and is younger than `min_interval`. A key
    /// that was never fetched is never throttled.
    pub fn should_throttle(&self, key: &str, min_interval: Duration) -> bool {
        self.read_map()
            .get(key)
            .map(|entry| entry.age() < min_interval)
            .unwrap_or(false)
    }

    /// Returns whether an entry was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.write_map().remove(key).is_some()
    }

    pub fn invalidate_all(&self) {
        self.write_map().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read_map().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }
}

impl<V: Clone> StalenessCache<V> {
    /// Returns the payload only while `now - fetched_at < ttl`. An expired
    /// entry is kept, see [`StalenessCache::get_stale`].
    pub fn get_if_fresh(&self, key: &str, ttl: Duration) -> Option<V> {
        let map = self.read_map();
        let entry = map.get(key)?;
        if entry.is_fresh(ttl) {
            Some(entry.payload.clone())
        } else {
            None
        }
    }
}

/// Identifies one independently cached data set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    SportsList,
    Events(String),
}

impl ResourceKey {
    pub fn events(sport_key: impl Into<String>) -> Self {
        ResourceKey::Events(sport_key.into())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::SportsList => f.write_str(SPORTS_LIST_KEY),
            ResourceKey::Events(key) => write!(f, "events:{key}"),
        }
    }
}

/// The odds cache: a singleton sports list plus one events list per sport key,
/// each with its own TTL class.
#[derive(Debug)]
pub struct OddsCache<R> {
    sports: StalenessCache<Vec<SportSummary>>,
    events: StalenessCache<Vec<R>>,
    config: CacheConfig,
}

impl<R> OddsCache<R> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            sports: StalenessCache::new(),
            events: StalenessCache::new(),
            config,
        }
    }

    pub fn ttl(&self, key: &ResourceKey) -> Duration {
        match key {
            ResourceKey::SportsList => self.config.sports_ttl(),
            ResourceKey::Events(_) => self.config.events_ttl(),
        }
    }

    pub fn stale_sports(&self) -> Option<Arc<CacheEntry<Vec<SportSummary>>>> {
        self.sports.get_stale(SPORTS_LIST_KEY)
    }

    pub fn stale_events(&self, sport_key: &str) -> Option<Arc<CacheEntry<Vec<R>>>> {
        self.events.get_stale(sport_key)
    }

    pub fn put_sports(&self, sports: Vec<SportSummary>) {
        debug!(count = sports.len(), "caching sports list");
        self.sports.put(SPORTS_LIST_KEY, sports);
    }

    pub fn put_events(&self, sport_key: &str, events: Vec<R>) {
        debug!(sport = %sport_key, count = events.len(), "caching events");
        self.events.put(sport_key, events);
    }

    pub fn should_throttle(&self, key: &ResourceKey) -> bool {
        let min_interval = self.config.min_fetch_interval();
        match key {
            ResourceKey::SportsList => self.sports.should_throttle(SPORTS_LIST_KEY, min_interval),
            ResourceKey::Events(sport) => self.events.should_throttle(sport, min_interval),
        }
    }

    pub fn invalidate(&self, key: &ResourceKey) {
        let removed = match key {
            ResourceKey::SportsList => self.sports.invalidate(SPORTS_LIST_KEY),
            ResourceKey::Events(sport) => self.events.invalidate(sport),
        };
        debug!(resource = %key, removed, "invalidated cache entry");
    }

    pub fn invalidate_all(&self) {
        self.sports.invalidate_all();
        self.events.invalidate_all();
        debug!("invalidated all cache entries");
    }

    /// Sport keys that currently hold an events entry, fresh or not.
    pub fn cached_event_keys(&self) -> Vec<String> {
        self.events.keys()
    }
}

impl<R: Clone> OddsCache<R> {
    pub fn sports_if_fresh(&self) -> Option<Vec<SportSummary>> {
        self.sports.get_if_fresh(SPORTS_LIST_KEY, self.config.sports_ttl())
    }

    pub fn events_if_fresh(&self, sport_key: &str) -> Option<Vec<R>> {
        self.events.get_if_fresh(sport_key, self.config.events_ttl())
    }
}
