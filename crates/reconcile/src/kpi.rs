//! Headline KPI aggregation.
//!
//! Derived from the two reconciled collections on every read; never stored.
//! Fallback precedence per counter: upstream-reported meta value, then the
//! value derivable from the reconciled collection, then zero.

use serde::{Deserialize, Serialize};

use crate::anomalies::AnomalyFeed;
use crate::trends::TrendCatalog;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub total_posts: u64,
    pub active_keywords: u64,
    pub anomalies_today: u64,
    pub window_minutes: u32,
}

/// Computes the headline counters from the current collections.
#[must_use]
pub fn compute_kpi(catalog: &TrendCatalog, feed: &AnomalyFeed) -> KpiSnapshot {
    let trends_meta = catalog.meta();
    let total_posts = trends_meta
        .and_then(|m| m.total_posts)
        .unwrap_or_else(|| catalog.total_volume());
    let active_keywords = trends_meta
        .and_then(|m| m.active_keywords)
        .unwrap_or(catalog.len() as u64);
    let anomalies_today = feed
        .meta()
        .and_then(|m| m.anomalies_today)
        .unwrap_or(feed.fetched_len() as u64);
    let window_minutes = trends_meta.and_then(|m| m.window_minutes).unwrap_or(60);

    KpiSnapshot {
        total_posts,
        active_keywords,
        anomalies_today,
        window_minutes,
    }
}
