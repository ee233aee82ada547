use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the pulse API service.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Page size for the trend catalog.
    pub trends_page_size: u64,
    /// Page size for the anomaly history query.
    pub anomalies_page_size: u64,
    /// Cap on the live anomaly buffer and on the presented feed.
    pub max_live: usize,
    /// Interval between full refresh polls, in seconds.
    pub refresh_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8080".to_string(),
                request_timeout_secs: 15,
            },
            feed: FeedConfig {
                trends_page_size: 60,
                anomalies_page_size: 40,
                max_live: 400,
                refresh_interval_secs: 30,
            },
        }
    }
}
