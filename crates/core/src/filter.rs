//! Anomaly feed filter descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter applied to the paginated anomaly query.
///
/// Compared for equality when a fetch completes: a result issued for a
/// filter that no longer matches the current one is stale and must be
/// dropped, otherwise it can resurrect filtered-out entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyFilter {
    /// Keyword substring match.
    pub keyword: Option<String>,
    /// Minimum absolute z-score.
    pub min_z: Option<f64>,
    /// Only anomalies created at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

impl AnomalyFilter {
    /// Returns a copy with the keyword trimmed and blank keywords removed,
    /// so `"  "` and absent compare equal.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let keyword = self
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        Self {
            keyword,
            min_z: self.min_z,
            since: self.since,
        }
    }

    /// True when no criterion is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.normalized() == Self::default()
    }
}
