//! Wire models for the pulse analytics API.
//!
//! Field names follow the upstream JSON (camelCase). The trends endpoint has
//! two historical shapes: the current envelope and a legacy bare array of
//! partial records. `RawTrendsPayload` accepts both; the normalizer in the
//! client crate produces the canonical `TrendsPage`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single trending keyword with its ranking metrics.
///
/// `keyword` is the identity: the catalog holds at most one entry per
/// keyword, and a later-arriving record replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendMetric {
    pub keyword: String,
    /// Ranking value; defaults to `volume` when upstream omits it.
    pub score: f64,
    /// Signed relative change over the sparkline window.
    pub delta: f64,
    /// Absolute post count in the aggregation window.
    pub volume: u64,
    /// Recent volume samples, oldest to newest.
    pub sparkline: Vec<u64>,
    pub trend_window_minutes: u32,
    pub last_seen_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
}

/// A partial trend record as the legacy upstream may send it.
///
/// Every field is optional; `count` is the legacy name for `volume`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrendRecord {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub volume: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub sparkline: Option<Vec<u64>>,
    #[serde(default)]
    pub trend_window_minutes: Option<u32>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sentiment: Option<f64>,
}

/// Pagination and aggregate metadata for a trends page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendsMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_posts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<u32>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_keywords: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_keywords: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// `TrendsMeta` with every field optional, as received on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrendsMeta {
    #[serde(default)]
    pub total_posts: Option<u64>,
    #[serde(default)]
    pub window_minutes: Option<u32>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_keywords: Option<u64>,
    #[serde(default)]
    pub total_keywords: Option<u64>,
    #[serde(default)]
    pub next_offset: Option<u64>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

/// Raw trends response: either the current envelope or the legacy bare array.
///
/// Untagged so serde tries the envelope first and falls back to the array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTrendsPayload {
    Envelope {
        #[serde(default)]
        trends: Vec<RawTrendRecord>,
        #[serde(default)]
        meta: Option<RawTrendsMeta>,
    },
    List(Vec<RawTrendRecord>),
}

/// Canonical, fully-populated trends page produced by normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendsPage {
    pub trends: Vec<TrendMetric>,
    pub meta: TrendsMeta,
}

/// A statistical anomaly detected on the firehose.
///
/// `id` is opaque and globally unique across history and live push;
/// `created_at` is authoritative for feed ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyEvent {
    pub id: String,
    pub keyword: String,
    pub z_score: f64,
    pub baseline_volume: u64,
    pub current_volume: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomaliesMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomalies_today: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<u32>,
}

/// One page of the anomaly history query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomaliesPage {
    pub anomalies: Vec<AnomalyEvent>,
    #[serde(default)]
    pub meta: AnomaliesMeta,
}

/// A single point in a keyword's trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A source post associated with a keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPost {
    pub id: String,
    pub text: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordAnalytics {
    pub current_score: f64,
    pub percentile: f64,
    pub doc_frequency: f64,
    pub velocity: f64,
}

/// Per-keyword drill-down detail. Consumed as-is by presentation; the
/// reconcilers never touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordDetail {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trend_series: Vec<SeriesPoint>,
    pub related_posts: Vec<RelatedPost>,
    pub analytics: KeywordAnalytics,
}
