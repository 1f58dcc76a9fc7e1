use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the primary resource: a sport or league with odds coverage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SportSummary {
    pub key: String,
    #[serde(rename = "title")]
    pub display_name: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SportSummary {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            group: None,
            active: true,
        }
    }
}

/// An upcoming or live event for one sport key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSummary {
    pub id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
}
