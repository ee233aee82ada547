//! Rate-limited HTTP client for the pulse API service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use pulse_core::filter::AnomalyFilter;
use pulse_core::models::{AnomaliesPage, KeywordDetail, RawTrendsPayload, TrendsPage};
use pulse_core::traits::{AnomalySource, TrendsSource};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::normalize::normalize_trends;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

pub struct PulseClient {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
}

impl PulseClient {
    /// Creates a client with the default request timeout.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: String) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a client with an explicit request timeout.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_timeout(base_url: String, timeout: Duration) -> Result<Self> {
        // 10 rps is generous for a dashboard polling two endpoints
        let quota = Quota::per_second(NonZeroU32::new(10).expect("nonzero"));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    /// Fetches and normalizes one page of the trend catalog.
    ///
    /// # Errors
    /// Returns an error on transport failure or an unparseable body. No
    /// retry is attempted here; retry policy belongs to the caller.
    pub async fn fetch_trends(&self, offset: u64, limit: u64) -> Result<TrendsPage> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/api/trends", self.base_url);
        let raw: RawTrendsPayload = self
            .http_client
            .get(&url)
            .query(&[("offset", offset), ("limit", limit)])
            .send()
            .await
            .context("Trends request failed")?
            .error_for_status()
            .context("Trends request rejected")?
            .json()
            .await
            .context("Failed to parse trends payload")?;

        Ok(normalize_trends(raw, Utc::now()))
    }

    /// Fetches one page of anomaly history for the given filter.
    ///
    /// # Errors
    /// Returns an error on transport failure or an unparseable body.
    pub async fn fetch_anomalies(
        &self,
        page: u64,
        limit: u64,
        filter: &AnomalyFilter,
    ) -> Result<AnomaliesPage> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/api/anomalies", self.base_url);
        let filter = filter.normalized();

        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(keyword) = &filter.keyword {
            query.push(("keyword", keyword.clone()));
        }
        if let Some(min_z) = filter.min_z {
            query.push(("minZ", min_z.to_string()));
        }
        if let Some(since) = filter.since {
            query.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let page: AnomaliesPage = self
            .http_client
            .get(&url)
            .query(&query)
            .send()
            .await
            .context("Anomalies request failed")?
            .error_for_status()
            .context("Anomalies request rejected")?
            .json()
            .await
            .context("Failed to parse anomalies payload")?;

        Ok(page)
    }

    /// Fetches per-keyword drill-down detail. Passed through to the caller
    /// untouched; the reconcilers never see it.
    ///
    /// # Errors
    /// Returns an error on transport failure or an unparseable body.
    pub async fn fetch_keyword_detail(&self, keyword: &str) -> Result<KeywordDetail> {
        self.rate_limiter.until_ready().await;
        let mut url = url::Url::parse(&self.base_url).context("Invalid base URL")?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Base URL cannot carry a path"))?
            .extend(["api", "trends", keyword]);
        let detail: KeywordDetail = self
            .http_client
            .get(url)
            .send()
            .await
            .context("Keyword detail request failed")?
            .error_for_status()
            .context("Keyword detail request rejected")?
            .json()
            .await
            .context("Failed to parse keyword detail")?;

        Ok(detail)
    }
}

#[async_trait]
impl TrendsSource for PulseClient {
    async fn fetch_trends(&self, offset: u64, limit: u64) -> Result<TrendsPage> {
        Self::fetch_trends(self, offset, limit).await
    }
}

#[async_trait]
impl AnomalySource for PulseClient {
    async fn fetch_anomalies(
        &self,
        page: u64,
        limit: u64,
        filter: &AnomalyFilter,
    ) -> Result<AnomaliesPage> {
        Self::fetch_anomalies(self, page, limit, filter).await
    }
}
