pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod http;
pub mod models;
pub mod service;

pub use cache::{CacheEntry, OddsCache, ResourceKey, StalenessCache};
pub use config::{AppConfig, CacheConfig, RefreshConfig, UpstreamConfig};
pub use coordinator::{
    PassOutcome, RefreshCoordinator, RefreshPhase, RefreshStatus, SkipReason, SportTracker,
};
pub use error::{ConfigError, CoordinatorError, FetchError};
pub use fetch::OddsFetcher;
pub use http::HttpOddsFetcher;
pub use models::{EventSummary, SportSummary};
pub use service::{CacheResult, CacheSource, OddsService};
