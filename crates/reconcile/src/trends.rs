//! Trend catalog reconciler.
//!
//! Owns the deduplicated, keyword-keyed trend collection. A full-refresh
//! snapshot replaces the catalog wholesale; a "load more" page merges into
//! it keyword by keyword, latest record winning while existing entries keep
//! their display position.

use std::collections::HashMap;

use pulse_core::models::{TrendMetric, TrendsMeta, TrendsPage};
use serde::{Deserialize, Serialize};

/// Insertion-ordered keyword-to-metric catalog with its pagination cursor.
#[derive(Debug, Default)]
pub struct TrendCatalog {
    order: Vec<String>,
    entries: HashMap<String, TrendMetric>,
    next_offset: u64,
    has_more: bool,
    meta: Option<TrendsMeta>,
}

/// Immutable point-in-time read of the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendCatalogSnapshot {
    /// Metrics in display order.
    pub trends: Vec<TrendMetric>,
    pub next_offset: u64,
    pub has_more: bool,
    pub meta: Option<TrendsMeta>,
}

impl TrendCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the catalog contents with a full-refresh snapshot page.
    ///
    /// Duplicated keywords within the page keep their first occurrence; the
    /// pagination cursor is reset from the page's meta, falling back to the
    /// merged length / non-emptiness when the meta carries no signal.
    pub fn seed(&mut self, page: TrendsPage) {
        self.order.clear();
        self.entries.clear();
        for trend in page.trends {
            if !self.entries.contains_key(&trend.keyword) {
                self.order.push(trend.keyword.clone());
                self.entries.insert(trend.keyword.clone(), trend);
            }
        }
        self.next_offset = page.meta.next_offset.unwrap_or(self.order.len() as u64);
        self.has_more = page.meta.has_more.unwrap_or(!self.order.is_empty());
        self.meta = Some(page.meta);
        tracing::debug!(
            keywords = self.order.len(),
            next_offset = self.next_offset,
            has_more = self.has_more,
            "seeded trend catalog"
        );
    }

    /// Merges a "load more" page into the catalog.
    ///
    /// An incoming record overwrites any existing record with the same
    /// keyword while keeping its position; unseen keywords append in page
    /// order. Advances the cursor from the page's meta with the same
    /// fallbacks as `seed`.
    pub fn append_page(&mut self, page: TrendsPage) {
        let incoming = page.trends.len();
        for trend in page.trends {
            if !self.entries.contains_key(&trend.keyword) {
                self.order.push(trend.keyword.clone());
            }
            self.entries.insert(trend.keyword.clone(), trend);
        }
        self.next_offset = page.meta.next_offset.unwrap_or(self.order.len() as u64);
        self.has_more = page.meta.has_more.unwrap_or(incoming > 0);
        self.meta = Some(page.meta);
        tracing::debug!(
            incoming,
            total = self.order.len(),
            next_offset = self.next_offset,
            "merged trend page"
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    #[must_use]
    pub fn meta(&self) -> Option<&TrendsMeta> {
        self.meta.as_ref()
    }

    /// Sum of volumes across the catalog, the `totalPosts` fallback.
    #[must_use]
    pub fn total_volume(&self) -> u64 {
        self.entries.values().map(|t| t.volume).sum()
    }

    /// Returns an immutable snapshot in display order.
    #[must_use]
    pub fn snapshot(&self) -> TrendCatalogSnapshot {
        let trends = self
            .order
            .iter()
            .filter_map(|k| self.entries.get(k).cloned())
            .collect();
        TrendCatalogSnapshot {
            trends,
            next_offset: self.next_offset,
            has_more: self.has_more,
            meta: self.meta.clone(),
        }
    }
}
