#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use linescan_core::{CacheConfig, FetchError, OddsFetcher, RefreshConfig, SportSummary};

/// In-memory fetcher with scripted failures and optional latency.
#[derive(Default)]
pub struct ScriptedFetcher {
    pub sports: Vec<SportSummary>,
    pub sports_errors: Mutex<VecDeque<FetchError>>,
    pub always_fail_sports: Option<FetchError>,
    pub events_errors: Mutex<VecDeque<FetchError>>,
    pub sports_delay: Duration,
    pub events_delay: Duration,
    /// Every call in order: "sports" for the primary list, the sport key otherwise.
    pub log: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn with_sports(keys: &[&str]) -> Self {
        Self {
            sports: keys
                .iter()
                .map(|k| SportSummary::new(*k, k.to_uppercase()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn sports_calls(&self) -> usize {
        self.log().iter().filter(|c| *c == "sports").count()
    }

    pub fn event_calls(&self) -> Vec<String> {
        self.log().into_iter().filter(|c| c != "sports").collect()
    }

    pub fn fail_next_sports(&self, err: FetchError) {
        self.sports_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_next_events(&self, err: FetchError) {
        self.events_errors.lock().unwrap().push_back(err);
    }
}

#[async_trait]
impl OddsFetcher for ScriptedFetcher {
    type Record = String;

    async fn fetch_sports(&self) -> Result<Vec<SportSummary>, FetchError> {
        self.log.lock().unwrap().push("sports".to_string());
        if !self.sports_delay.is_zero() {
            tokio::time::sleep(self.sports_delay).await;
        }
        if let Some(err) = &self.always_fail_sports {
            return Err(err.clone());
        }
        if let Some(err) = self.sports_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.sports.clone())
    }

    async fn fetch_events(&self, sport_key: &str) -> Result<Vec<String>, FetchError> {
        self.log.lock().unwrap().push(sport_key.to_string());
        if !self.events_delay.is_zero() {
            tokio::time::sleep(self.events_delay).await;
        }
        if let Some(err) = self.events_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(vec![format!("{sport_key}-game-1"), format!("{sport_key}-game-2")])
    }
}

pub fn cache_config() -> CacheConfig {
    CacheConfig {
        sports_ttl_secs: 3600,
        events_ttl_secs: 300,
        min_fetch_interval_ms: 1000,
    }
}

pub fn refresh_config() -> RefreshConfig {
    RefreshConfig {
        tick_interval_secs: 60,
        active_refresh_interval_secs: 300,
        max_consecutive_failures: 3,
        pacing_delay_ms: 1500,
        fetch_timeout_secs: 15,
    }
}
