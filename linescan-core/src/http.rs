use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::error::FetchError;
use crate::fetch::OddsFetcher;
use crate::models::{EventSummary, SportSummary};

/// Fetcher for an odds REST API exposing `/sports` and `/sports/{key}/events`.
#[derive(Debug, Clone)]
pub struct HttpOddsFetcher {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpOddsFetcher {
    pub fn new(client: Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
        }
    }

    pub fn build_client(config: &UpstreamConfig) -> Result<Client, FetchError> {
        ClientBuilder::new()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(FetchError::from)
    }

    /// Each segment is percent-encoded, so a key can never reach another endpoint.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| FetchError::Transport(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, FetchError> {
        if self.api_key.is_empty() {
            return Err(FetchError::InvalidCredentials);
        }

        let url = self.endpoint(segments)?;
        debug!(%url, "requesting upstream resource");
        let response = self
            .client
            .get(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn classify_status(status: StatusCode) -> Option<FetchError> {
    match status {
        s if s.is_success() => None,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(FetchError::InvalidCredentials),
        StatusCode::TOO_MANY_REQUESTS => Some(FetchError::RateLimited),
        s => Some(FetchError::Transport(format!("unexpected status {s}"))),
    }
}

#[async_trait]
impl OddsFetcher for HttpOddsFetcher {
    type Record = EventSummary;

    async fn fetch_sports(&self) -> Result<Vec<SportSummary>, FetchError> {
        let sports: Vec<SportSummary> = self.get_json(&["sports"]).await?;
        Ok(sports.into_iter().filter(|s| s.active).collect())
    }

    async fn fetch_events(&self, sport_key: &str) -> Result<Vec<EventSummary>, FetchError> {
        self.get_json(&["sports", sport_key, "events"]).await
    }
}
