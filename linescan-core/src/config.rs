use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

pub const API_KEY_ENV: &str = "LINESCAN_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub refresh: RefreshConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub sports_ttl_secs: u64,
    pub events_ttl_secs: u64,
    pub min_fetch_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    pub tick_interval_secs: u64,
    pub active_refresh_interval_secs: u64,
    pub max_consecutive_failures: u32,
    pub pacing_delay_ms: u64,
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sports_ttl_secs: 3600,
            events_ttl_secs: 300,
            min_fetch_interval_ms: 1000,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            active_refresh_interval_secs: 300,
            max_consecutive_failures: 3,
            pacing_delay_ms: 1500,
            fetch_timeout_secs: 15,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.the-odds-api.com/v4".to_string(),
            api_key: String::new(),
            request_timeout_secs: 10,
            user_agent: "linescan/0.1".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn sports_ttl(&self) -> Duration {
        Duration::from_secs(self.sports_ttl_secs)
    }

    pub fn events_ttl(&self) -> Duration {
        Duration::from_secs(self.events_ttl_secs)
    }

    pub fn min_fetch_interval(&self) -> Duration {
        Duration::from_millis(self.min_fetch_interval_ms)
    }
}

impl RefreshConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn active_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.active_refresh_interval_secs)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AppConfig {
    /// Default location: `<config_dir>/linescan/config.json`.
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("linescan").join("config.json"))
    }

    /// Loads the config from the default location, falling back to defaults
    /// (and trying to persist them) when the file is missing or unreadable.
    pub fn load() -> Self {
        let loaded = Self::config_file_path().and_then(|path| Self::load_from(&path));
        let mut config = match loaded {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load config, using defaults");
                let default_config = Self::default();
                if let Err(save_err) = default_config.save() {
                    warn!(error = %save_err, "failed to save default config");
                }
                default_config
            }
        };
        config.apply_env();
        config
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_file_path()?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // atomic write
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// The API key from the environment wins over the one on disk.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.upstream.api_key = key.trim().to_string();
            }
        }
    }
}
