use crate::filter::AnomalyFilter;
use crate::models::{AnomaliesPage, TrendsPage};
use anyhow::Result;
use async_trait::async_trait;

/// Paginated source of trend catalog pages.
#[async_trait]
pub trait TrendsSource: Send + Sync {
    async fn fetch_trends(&self, offset: u64, limit: u64) -> Result<TrendsPage>;
}

/// Paginated, filterable source of anomaly history pages.
#[async_trait]
pub trait AnomalySource: Send + Sync {
    async fn fetch_anomalies(
        &self,
        page: u64,
        limit: u64,
        filter: &AnomalyFilter,
    ) -> Result<AnomaliesPage>;
}
