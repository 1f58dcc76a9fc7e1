//! Read-through access to odds data for consumers.
//!
//! Serves fresh cache entries directly, fetches when stale or missing, and
//! falls back to the last known entry when the upstream call fails.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cache::{CacheEntry, OddsCache, ResourceKey};
use crate::coordinator::SportTracker;
use crate::error::FetchError;
use crate::fetch::OddsFetcher;
use crate::models::SportSummary;

/// Where a served value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Fetched during this call
    Network,
    /// Cached and within its TTL
    CacheFresh,
    /// Cached but past its TTL, served because fetching was throttled or failed
    CacheStale,
}

#[derive(Debug, Clone)]
pub struct CacheResult<T> {
    pub data: T,
    pub source: CacheSource,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheResult<T> {
    fn from_network(data: T) -> Self {
        Self {
            data,
            source: CacheSource::Network,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.source == CacheSource::CacheStale
    }
}

impl<T: Clone> CacheResult<T> {
    fn from_entry(entry: &CacheEntry<T>, fresh: bool) -> Self {
        Self {
            data: entry.payload.clone(),
            source: if fresh {
                CacheSource::CacheFresh
            } else {
                CacheSource::CacheStale
            },
            fetched_at: entry.fetched_at_utc,
        }
    }
}

pub struct OddsService<F: OddsFetcher> {
    fetcher: Arc<F>,
    cache: Arc<OddsCache<F::Record>>,
    tracker: SportTracker,
}

impl<F: OddsFetcher> OddsService<F> {
    /// `tracker` should be the coordinator's, so that sports viewed here are
    /// kept fresh in the background.
    pub fn new(fetcher: Arc<F>, cache: Arc<OddsCache<F::Record>>, tracker: SportTracker) -> Self {
        Self {
            fetcher,
            cache,
            tracker,
        }
    }

    pub fn cache(&self) -> &Arc<OddsCache<F::Record>> {
        &self.cache
    }

    pub async fn sports(&self) -> Result<CacheResult<Vec<SportSummary>>, FetchError> {
        let ttl = self.cache.ttl(&ResourceKey::SportsList);
        if let Some(entry) = self.cache.stale_sports() {
            let fresh = entry.is_fresh(ttl);
            if fresh || self.cache.should_throttle(&ResourceKey::SportsList) {
                return Ok(CacheResult::from_entry(&entry, fresh));
            }
        }

        match self.fetcher.fetch_sports().await {
            Ok(sports) => {
                self.cache.put_sports(sports.clone());
                Ok(CacheResult::from_network(sports))
            }
            Err(err) => match self.cache.stale_sports() {
                Some(entry) => {
                    warn!(error = %err, "sports fetch failed, serving stale list");
                    Ok(CacheResult::from_entry(&entry, false))
                }
                None => Err(err),
            },
        }
    }

    /// Events for one sport. Also marks the sport as being of interest to the
    /// background refresh.
    pub async fn events(&self, sport_key: &str) -> Result<CacheResult<Vec<F::Record>>, FetchError> {
        self.tracker.track(sport_key);

        let key = ResourceKey::events(sport_key);
        let ttl = self.cache.ttl(&key);
        if let Some(entry) = self.cache.stale_events(sport_key) {
            let fresh = entry.is_fresh(ttl);
            if fresh || self.cache.should_throttle(&key) {
                debug!(sport = %sport_key, fresh, "serving cached events");
                return Ok(CacheResult::from_entry(&entry, fresh));
            }
        }

        match self.fetcher.fetch_events(sport_key).await {
            Ok(events) => {
                self.cache.put_events(sport_key, events.clone());
                Ok(CacheResult::from_network(events))
            }
            Err(err) => match self.cache.stale_events(sport_key) {
                Some(entry) => {
                    warn!(
                        sport = %sport_key,
                        error = %err,
                        "events fetch failed, serving stale events"
                    );
                    Ok(CacheResult::from_entry(&entry, false))
                }
                None => Err(err),
            },
        }
    }

    /// Drops every cached entry and refetches the sports list plus the events
    /// of every tracked sport it still contains.
    pub async fn force_refresh(&self) -> Result<(), FetchError> {
        self.cache.invalidate_all();
        let sports = self.sports().await?.data;
        for sport in sports.iter().filter(|s| self.tracker.contains(&s.key)) {
            self.events(&sport.key).await?;
        }
        Ok(())
    }

    /// Drops and refetches one sport's events; other sports keep their entries.
    pub async fn force_refresh_sport(
        &self,
        sport_key: &str,
    ) -> Result<CacheResult<Vec<F::Record>>, FetchError> {
        self.cache.invalidate(&ResourceKey::events(sport_key));
        self.events(sport_key).await
    }
}
