//! Anomaly feed reconciler.
//!
//! Merges two disjoint-by-source sets into one presented feed: the "fetched"
//! set accumulated from paginated history queries for the current filter,
//! and the "live" set prepended by the push channel. The union is
//! deduplicated by id, sorted newest-first by `created_at`, and bounded.
//!
//! A filter change discards the fetched pages and resets the cursor, but
//! never clears the live set: live events are filter-independent.

use std::collections::{HashMap, HashSet, VecDeque};

use pulse_core::filter::AnomalyFilter;
use pulse_core::models::{AnomaliesMeta, AnomaliesPage, AnomalyEvent};
use serde::{Deserialize, Serialize};

/// Default cap on the live buffer and on the presented feed.
pub const DEFAULT_MAX_LIVE: usize = 400;

/// Default page size of the anomaly history query.
pub const DEFAULT_PAGE_SIZE: usize = 40;

#[derive(Debug)]
pub struct AnomalyFeed {
    fetched: HashMap<String, AnomalyEvent>,
    /// Live events, front = newest.
    live: VecDeque<AnomalyEvent>,
    live_ids: HashSet<String>,
    max_live: usize,
    page_size: usize,
    page: u64,
    has_more: bool,
    filter: AnomalyFilter,
    meta: Option<AnomaliesMeta>,
}

/// Immutable point-in-time read of the feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyFeedSnapshot {
    /// Union of fetched and live events, deduplicated, newest first.
    pub events: Vec<AnomalyEvent>,
    /// Ids that arrived via the push channel, for "LIVE" badging.
    pub live_ids: HashSet<String>,
    pub page: u64,
    pub has_more: bool,
    pub filter: AnomalyFilter,
    pub meta: Option<AnomaliesMeta>,
}

impl Default for AnomalyFeed {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_MAX_LIVE)
    }
}

impl AnomalyFeed {
    #[must_use]
    pub fn new(page_size: usize, max_live: usize) -> Self {
        Self {
            fetched: HashMap::new(),
            live: VecDeque::new(),
            live_ids: HashSet::new(),
            max_live,
            page_size,
            page: 0,
            has_more: true,
            filter: AnomalyFilter::default(),
            meta: None,
        }
    }

    /// Applies a filter change: cursor back to page 0, accumulated fetched
    /// pages and their meta discarded. The live set is untouched.
    ///
    /// A no-op when the normalized filter is unchanged.
    pub fn reset_for_filter(&mut self, filter: AnomalyFilter) {
        let filter = filter.normalized();
        if filter == self.filter {
            return;
        }
        tracing::debug!(?filter, "anomaly filter changed, dropping fetched pages");
        self.filter = filter;
        self.fetched.clear();
        self.meta = None;
        self.page = 0;
        self.has_more = true;
    }

    /// Replaces the fetched set with the first page for the current filter.
    pub fn seed_fetched(&mut self, page: AnomaliesPage) {
        self.fetched.clear();
        let received = page.anomalies.len();
        for event in page.anomalies {
            self.fetched.insert(event.id.clone(), event);
        }
        self.page = 0;
        self.has_more = received >= self.page_size;
        self.meta = Some(page.meta);
    }

    /// Merges an additional fetched page into the fetched set by id,
    /// latest wins, and advances the page cursor.
    pub fn append_fetched_page(&mut self, page: AnomaliesPage) {
        let received = page.anomalies.len();
        for event in page.anomalies {
            self.fetched.insert(event.id.clone(), event);
        }
        self.page += 1;
        self.has_more = received >= self.page_size;
        self.meta = Some(page.meta);
    }

    /// Inserts a push event at the front of the live buffer.
    ///
    /// Idempotent: an id already in the live set is dropped silently.
    /// Returns whether the event was inserted.
    pub fn on_live_event(&mut self, event: AnomalyEvent) -> bool {
        if !self.live_ids.insert(event.id.clone()) {
            tracing::trace!(id = %event.id, "duplicate live anomaly dropped");
            return false;
        }
        self.live.push_front(event);
        while self.live.len() > self.max_live {
            if let Some(dropped) = self.live.pop_back() {
                self.live_ids.remove(&dropped.id);
            }
        }
        true
    }

    /// The presented feed: union of fetched and live, deduplicated by id
    /// (the fetched copy is authoritative since it reflects the queried
    /// state), sorted by `created_at` descending with id as tie-break,
    /// truncated to `max_live`.
    ///
    /// Pure projection, deterministic for a given state.
    #[must_use]
    pub fn view(&self) -> Vec<AnomalyEvent> {
        let mut by_id: HashMap<&str, &AnomalyEvent> = HashMap::new();
        for event in &self.live {
            by_id.insert(event.id.as_str(), event);
        }
        for event in self.fetched.values() {
            by_id.insert(event.id.as_str(), event);
        }
        let mut events: Vec<AnomalyEvent> = by_id.into_values().cloned().collect();
        events.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        events.truncate(self.max_live);
        events
    }

    #[must_use]
    pub fn filter(&self) -> &AnomalyFilter {
        &self.filter
    }

    #[must_use]
    pub fn page(&self) -> u64 {
        self.page
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Number of events in the fetched set, the `anomaliesToday` fallback.
    #[must_use]
    pub fn fetched_len(&self) -> usize {
        self.fetched.len()
    }

    #[must_use]
    pub fn meta(&self) -> Option<&AnomaliesMeta> {
        self.meta.as_ref()
    }

    #[must_use]
    pub fn snapshot(&self) -> AnomalyFeedSnapshot {
        AnomalyFeedSnapshot {
            events: self.view(),
            live_ids: self.live_ids.clone(),
            page: self.page,
            has_more: self.has_more,
            filter: self.filter.clone(),
            meta: self.meta.clone(),
        }
    }
}
