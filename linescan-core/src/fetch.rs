use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::SportSummary;

/// Upstream data source for the refresh engine.
///
/// Implementations classify their own failures into [`FetchError`] and must
/// never hand back partially decoded data.
#[async_trait]
pub trait OddsFetcher: Send + Sync {
    /// Record type of the per-sport resource.
    type Record: Clone + Send + Sync + 'static;

    async fn fetch_sports(&self) -> Result<Vec<SportSummary>, FetchError>;

    async fn fetch_events(&self, sport_key: &str) -> Result<Vec<Self::Record>, FetchError>;
}

