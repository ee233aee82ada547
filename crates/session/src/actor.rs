//! The session actor: single task, single owner of both reconcilers.
//!
//! Fetches run as spawned tasks reporting back through an internal channel,
//! tagged with the filter they were issued for; a completion whose filter
//! no longer matches the current descriptor is stale and dropped, so a
//! filter change can never be overwritten by an older in-flight result.
//! Per-collection in-flight counters implement the serialized "load more"
//! guard. Every state change publishes an immutable snapshot on a watch
//! channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pulse_client::stream::AnomalyStreamHandle;
use pulse_core::config::FeedConfig;
use pulse_core::events::StreamEvent;
use pulse_core::filter::AnomalyFilter;
use pulse_core::models::{AnomaliesPage, TrendsPage};
use pulse_core::traits::{AnomalySource, TrendsSource};
use pulse_reconcile::anomalies::{AnomalyFeed, AnomalyFeedSnapshot};
use pulse_reconcile::kpi::{compute_kpi, KpiSnapshot};
use pulse_reconcile::trends::{TrendCatalog, TrendCatalogSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::commands::SessionCommand;
use crate::handle::SessionHandle;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub trends_page_size: u64,
    pub anomalies_page_size: u64,
    pub max_live: usize,
    pub refresh_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_feed(&pulse_core::AppConfig::default().feed)
    }
}

impl SessionConfig {
    #[must_use]
    pub fn from_feed(feed: &FeedConfig) -> Self {
        Self {
            trends_page_size: feed.trends_page_size,
            anomalies_page_size: feed.anomalies_page_size,
            max_live: feed.max_live,
            refresh_interval: Duration::from_secs(feed.refresh_interval_secs),
        }
    }
}

/// Immutable point-in-time read of the whole session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub trends: TrendCatalogSnapshot,
    pub anomalies: AnomalyFeedSnapshot,
    pub kpi: KpiSnapshot,
    pub stream_connected: bool,
    /// Most recent fetch failure, cleared on the next success. Lets
    /// presentation distinguish "no data yet" from "fetch failed".
    pub last_error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// Completed fetch, tagged with what it was issued for.
#[derive(Debug)]
enum FetchOutcome {
    SeedTrends(Result<TrendsPage>),
    MoreTrends(Result<TrendsPage>),
    SeedAnomalies {
        filter: AnomalyFilter,
        result: Result<AnomaliesPage>,
    },
    MoreAnomalies {
        filter: AnomalyFilter,
        result: Result<AnomaliesPage>,
    },
}

pub struct SessionActor {
    state: SessionState,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    outcome_rx: mpsc::Receiver<FetchOutcome>,
    stream_rx: mpsc::Receiver<StreamEvent>,
}

impl SessionActor {
    /// Spawns the session task and returns its handle.
    ///
    /// `stream_rx` is the receiver half of the push channel;
    /// `stream_handle` (when present) is closed exactly once on shutdown.
    #[must_use]
    pub fn spawn(
        trends_source: Arc<dyn TrendsSource>,
        anomaly_source: Arc<dyn AnomalySource>,
        stream_rx: mpsc::Receiver<StreamEvent>,
        stream_handle: Option<AnomalyStreamHandle>,
        config: SessionConfig,
    ) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (outcome_tx, outcome_rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot_rx) = watch::channel(DashboardSnapshot::default());

        let state = SessionState {
            catalog: TrendCatalog::new(),
            feed: AnomalyFeed::new(config.anomalies_page_size as usize, config.max_live),
            trends_source,
            anomaly_source,
            outcome_tx,
            snapshot_tx,
            stream_handle,
            config,
            trends_inflight: 0,
            anomalies_inflight: 0,
            stream_connected: false,
            last_error: None,
        };

        let actor = Self {
            state,
            cmd_rx,
            outcome_rx,
            stream_rx,
        };
        tokio::spawn(actor.run());

        SessionHandle::new(cmd_tx, snapshot_rx)
    }

    async fn run(self) {
        let Self {
            mut state,
            mut cmd_rx,
            mut outcome_rx,
            mut stream_rx,
        } = self;

        let mut refresh = tokio::time::interval(state.config.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stream_open = true;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        if state.handle_command(cmd) {
                            break;
                        }
                    }
                    // every handle dropped: nothing can reach us anymore
                    None => break,
                },
                Some(outcome) = outcome_rx.recv() => state.apply_outcome(outcome),
                event = stream_rx.recv(), if stream_open => match event {
                    Some(event) => state.handle_stream_event(event),
                    None => {
                        stream_open = false;
                        state.stream_connected = false;
                        state.publish();
                    }
                },
                // first tick fires immediately and performs the initial load
                _ = refresh.tick() => state.start_refresh(),
            }
        }

        state.close_stream();
        debug!("session actor stopped");
    }
}

struct SessionState {
    catalog: TrendCatalog,
    feed: AnomalyFeed,
    trends_source: Arc<dyn TrendsSource>,
    anomaly_source: Arc<dyn AnomalySource>,
    outcome_tx: mpsc::Sender<FetchOutcome>,
    snapshot_tx: watch::Sender<DashboardSnapshot>,
    stream_handle: Option<AnomalyStreamHandle>,
    config: SessionConfig,
    trends_inflight: u32,
    anomalies_inflight: u32,
    stream_connected: bool,
    last_error: Option<String>,
}

impl SessionState {
    /// Returns true when the session should stop.
    fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::LoadMoreTrends => {
                if self.trends_inflight > 0 || !self.catalog.has_more() {
                    debug!(
                        inflight = self.trends_inflight,
                        has_more = self.catalog.has_more(),
                        "ignoring trend load-more"
                    );
                } else {
                    self.spawn_more_trends();
                }
            }
            SessionCommand::LoadMoreAnomalies => {
                if self.anomalies_inflight > 0 || !self.feed.has_more() {
                    debug!(
                        inflight = self.anomalies_inflight,
                        has_more = self.feed.has_more(),
                        "ignoring anomaly load-more"
                    );
                } else {
                    self.spawn_more_anomalies();
                }
            }
            SessionCommand::SetFilter(filter) => {
                let filter = filter.normalized();
                if filter == *self.feed.filter() {
                    return false;
                }
                self.feed.reset_for_filter(filter);
                self.publish();
                self.spawn_seed_anomalies();
            }
            SessionCommand::Refresh => self.start_refresh(),
            SessionCommand::Shutdown => return true,
        }
        false
    }

    fn start_refresh(&mut self) {
        if self.trends_inflight == 0 {
            self.spawn_seed_trends();
        }
        if self.anomalies_inflight == 0 {
            self.spawn_seed_anomalies();
        }
    }

    fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => {
                self.stream_connected = true;
                self.publish();
            }
            StreamEvent::Anomaly(anomaly) => {
                if self.feed.on_live_event(anomaly) {
                    self.publish();
                }
            }
            StreamEvent::Disconnected { reason } => {
                warn!(%reason, "live anomaly channel lost");
                self.stream_connected = false;
                self.publish();
            }
        }
    }

    fn apply_outcome(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::SeedTrends(result) => {
                self.trends_inflight = self.trends_inflight.saturating_sub(1);
                match result {
                    Ok(page) => {
                        self.catalog.seed(page);
                        self.last_error = None;
                    }
                    Err(err) => self.record_error("trend refresh failed", &err),
                }
            }
            FetchOutcome::MoreTrends(result) => {
                self.trends_inflight = self.trends_inflight.saturating_sub(1);
                match result {
                    Ok(page) => {
                        self.catalog.append_page(page);
                        self.last_error = None;
                    }
                    Err(err) => self.record_error("trend page failed", &err),
                }
            }
            FetchOutcome::SeedAnomalies { filter, result } => {
                self.anomalies_inflight = self.anomalies_inflight.saturating_sub(1);
                if filter != *self.feed.filter() {
                    debug!(?filter, "dropping stale anomaly seed");
                    return;
                }
                match result {
                    Ok(page) => {
                        self.feed.seed_fetched(page);
                        self.last_error = None;
                    }
                    Err(err) => self.record_error("anomaly refresh failed", &err),
                }
            }
            FetchOutcome::MoreAnomalies { filter, result } => {
                self.anomalies_inflight = self.anomalies_inflight.saturating_sub(1);
                if filter != *self.feed.filter() {
                    debug!(?filter, "dropping stale anomaly page");
                    return;
                }
                match result {
                    Ok(page) => {
                        self.feed.append_fetched_page(page);
                        self.last_error = None;
                    }
                    Err(err) => self.record_error("anomaly page failed", &err),
                }
            }
        }
        self.publish();
    }

    fn record_error(&mut self, what: &str, err: &anyhow::Error) {
        warn!(%err, "{what}");
        self.last_error = Some(format!("{what}: {err:#}"));
    }

    fn spawn_seed_trends(&mut self) {
        self.trends_inflight += 1;
        let source = Arc::clone(&self.trends_source);
        let limit = self.config.trends_page_size;
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_trends(0, limit).await;
            let _ = tx.send(FetchOutcome::SeedTrends(result)).await;
        });
    }

    fn spawn_more_trends(&mut self) {
        self.trends_inflight += 1;
        let source = Arc::clone(&self.trends_source);
        let offset = self.catalog.next_offset();
        let limit = self.config.trends_page_size;
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_trends(offset, limit).await;
            let _ = tx.send(FetchOutcome::MoreTrends(result)).await;
        });
    }

    fn spawn_seed_anomalies(&mut self) {
        self.anomalies_inflight += 1;
        let source = Arc::clone(&self.anomaly_source);
        let filter = self.feed.filter().clone();
        let limit = self.config.anomalies_page_size;
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_anomalies(0, limit, &filter).await;
            let _ = tx
                .send(FetchOutcome::SeedAnomalies { filter, result })
                .await;
        });
    }

    fn spawn_more_anomalies(&mut self) {
        self.anomalies_inflight += 1;
        let source = Arc::clone(&self.anomaly_source);
        let filter = self.feed.filter().clone();
        let page = self.feed.page() + 1;
        let limit = self.config.anomalies_page_size;
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_anomalies(page, limit, &filter).await;
            let _ = tx
                .send(FetchOutcome::MoreAnomalies { filter, result })
                .await;
        });
    }

    fn publish(&self) {
        let snapshot = DashboardSnapshot {
            trends: self.catalog.snapshot(),
            anomalies: self.feed.snapshot(),
            kpi: compute_kpi(&self.catalog, &self.feed),
            stream_connected: self.stream_connected,
            last_error: self.last_error.clone(),
            last_updated: Utc::now(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }

    fn close_stream(&mut self) {
        if let Some(mut handle) = self.stream_handle.take() {
            handle.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use pulse_core::models::{AnomaliesMeta, AnomalyEvent, TrendMetric, TrendsMeta};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    fn metric(keyword: &str, volume: u64) -> TrendMetric {
        TrendMetric {
            keyword: keyword.to_string(),
            score: volume as f64,
            delta: 0.0,
            volume,
            sparkline: vec![volume; 5],
            trend_window_minutes: 60,
            last_seen_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            sentiment: None,
        }
    }

    fn trends_page(keywords: &[(&str, u64)], has_more: bool) -> TrendsPage {
        TrendsPage {
            trends: keywords.iter().map(|(k, v)| metric(k, *v)).collect(),
            meta: TrendsMeta {
                total_posts: None,
                window_minutes: Some(60),
                generated_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
                active_keywords: None,
                total_keywords: None,
                next_offset: None,
                has_more: Some(has_more),
            },
        }
    }

    fn anomaly(id: &str, minute: u32) -> AnomalyEvent {
        AnomalyEvent {
            id: id.to_string(),
            keyword: "ai".to_string(),
            z_score: 3.0,
            baseline_volume: 10,
            current_volume: 50,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap(),
        }
    }

    fn anomalies_page(events: Vec<AnomalyEvent>) -> AnomaliesPage {
        AnomaliesPage {
            anomalies: events,
            meta: AnomaliesMeta::default(),
        }
    }

    /// Serves queued trend pages, then empty pages. Counts calls.
    struct ScriptedTrends {
        pages: Mutex<VecDeque<TrendsPage>>,
        calls: AtomicUsize,
    }

    impl ScriptedTrends {
        fn new(pages: Vec<TrendsPage>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TrendsSource for ScriptedTrends {
        async fn fetch_trends(&self, _offset: u64, _limit: u64) -> Result<TrendsPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.pages.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| trends_page(&[], false)))
        }
    }

    /// Keyword-keyed anomaly pages; a fetch for the "slow" keyword parks on
    /// a notify until the test releases it.
    struct ScriptedAnomalies {
        by_keyword: Mutex<std::collections::HashMap<Option<String>, Vec<AnomalyEvent>>>,
        calls: AtomicUsize,
        gate: Notify,
        gated_keyword: Option<String>,
    }

    impl ScriptedAnomalies {
        fn new(by_keyword: Vec<(Option<&str>, Vec<AnomalyEvent>)>) -> Arc<Self> {
            Arc::new(Self {
                by_keyword: Mutex::new(
                    by_keyword
                        .into_iter()
                        .map(|(k, v)| (k.map(str::to_string), v))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                gated_keyword: None,
            })
        }

        fn gated(mut self: Arc<Self>, keyword: &str) -> Arc<Self> {
            Arc::get_mut(&mut self).unwrap().gated_keyword = Some(keyword.to_string());
            self
        }
    }

    #[async_trait]
    impl AnomalySource for ScriptedAnomalies {
        async fn fetch_anomalies(
            &self,
            _page: u64,
            _limit: u64,
            filter: &AnomalyFilter,
        ) -> Result<AnomaliesPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.gated_keyword.is_some() && filter.keyword == self.gated_keyword {
                self.gate.notified().await;
            }
            let events = self
                .by_keyword
                .lock()
                .unwrap()
                .get(&filter.keyword)
                .cloned()
                .unwrap_or_default();
            Ok(anomalies_page(events))
        }
    }

    fn small_config() -> SessionConfig {
        SessionConfig {
            trends_page_size: 2,
            anomalies_page_size: 2,
            max_live: 400,
            // effectively disables periodic refresh beyond the initial tick
            refresh_interval: Duration::from_secs(3600),
        }
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<DashboardSnapshot>, mut pred: F) -> DashboardSnapshot
    where
        F: FnMut(&DashboardSnapshot) -> bool,
    {
        timeout(Duration::from_secs(2), async {
            loop {
                {
                    let snap = rx.borrow_and_update();
                    if pred(&snap) {
                        return snap.clone();
                    }
                }
                rx.changed().await.expect("session ended early");
            }
        })
        .await
        .expect("condition not reached")
    }

    fn spawn_session(
        trends: Arc<ScriptedTrends>,
        anomalies: Arc<ScriptedAnomalies>,
    ) -> (SessionHandle, mpsc::Sender<StreamEvent>) {
        let (stream_tx, stream_rx) = mpsc::channel(16);
        let handle = SessionActor::spawn(trends, anomalies, stream_rx, None, small_config());
        (handle, stream_tx)
    }

    #[tokio::test]
    async fn initial_refresh_seeds_both_collections() {
        let trends = ScriptedTrends::new(vec![trends_page(&[("ai", 10), ("btc", 20)], true)]);
        let anomalies = ScriptedAnomalies::new(vec![(None, vec![anomaly("a1", 1)])]);
        let (handle, _stream_tx) = spawn_session(trends, anomalies);

        let mut rx = handle.subscribe();
        let snap = wait_for(&mut rx, |s| {
            !s.trends.trends.is_empty() && !s.anomalies.events.is_empty()
        })
        .await;

        assert_eq!(snap.trends.trends.len(), 2);
        assert_eq!(snap.anomalies.events[0].id, "a1");
        assert_eq!(snap.kpi.total_posts, 30);
        assert_eq!(snap.kpi.active_keywords, 2);
    }

    #[tokio::test]
    async fn load_more_trends_merges_and_exhausts() {
        let trends = ScriptedTrends::new(vec![
            trends_page(&[("ai", 10), ("btc", 20)], true),
            trends_page(&[("btc", 25), ("eth", 30)], false),
        ]);
        let anomalies = ScriptedAnomalies::new(vec![]);
        let (handle, _stream_tx) = spawn_session(Arc::clone(&trends), anomalies);

        let mut rx = handle.subscribe();
        wait_for(&mut rx, |s| s.trends.trends.len() == 2).await;

        handle.load_more_trends().await.unwrap();
        let snap = wait_for(&mut rx, |s| s.trends.trends.len() == 3).await;
        assert!(!snap.trends.has_more);
        assert_eq!(snap.trends.trends[1].score, 25.0);

        // exhausted: load-more is a silent no-op, while refresh still fetches
        let calls_before = trends.calls.load(Ordering::SeqCst);
        handle.load_more_trends().await.unwrap();
        handle.refresh().await.unwrap();
        wait_for(&mut rx, |s| s.trends.trends.is_empty()).await;
        assert_eq!(trends.calls.load(Ordering::SeqCst), calls_before + 1);
    }

    #[tokio::test]
    async fn duplicate_live_event_yields_one_entry() {
        let trends = ScriptedTrends::new(vec![]);
        let anomalies = ScriptedAnomalies::new(vec![]);
        let (handle, stream_tx) = spawn_session(trends, anomalies);

        stream_tx.send(StreamEvent::Connected).await.unwrap();
        stream_tx
            .send(StreamEvent::Anomaly(anomaly("x1", 1)))
            .await
            .unwrap();
        stream_tx
            .send(StreamEvent::Anomaly(anomaly("x1", 1)))
            .await
            .unwrap();
        stream_tx
            .send(StreamEvent::Anomaly(anomaly("x2", 2)))
            .await
            .unwrap();

        let mut rx = handle.subscribe();
        let snap = wait_for(&mut rx, |s| s.anomalies.events.len() == 2).await;
        assert!(snap.stream_connected);
        assert_eq!(snap.anomalies.events[0].id, "x2");
    }

    #[tokio::test]
    async fn stale_filtered_fetch_is_dropped() {
        let trends = ScriptedTrends::new(vec![]);
        let anomalies = ScriptedAnomalies::new(vec![
            (Some("slow"), vec![anomaly("stale1", 1)]),
            (Some("fast"), vec![anomaly("fresh1", 2)]),
        ])
        .gated("slow");
        let (handle, _stream_tx) = spawn_session(trends, Arc::clone(&anomalies));

        let mut rx = handle.subscribe();

        // issue a fetch for "slow", then change filter before it completes
        handle
            .set_filter(AnomalyFilter {
                keyword: Some("slow".to_string()),
                ..AnomalyFilter::default()
            })
            .await
            .unwrap();
        handle
            .set_filter(AnomalyFilter {
                keyword: Some("fast".to_string()),
                ..AnomalyFilter::default()
            })
            .await
            .unwrap();

        let snap = wait_for(&mut rx, |s| !s.anomalies.events.is_empty()).await;
        assert_eq!(snap.anomalies.events[0].id, "fresh1");

        // release the parked fetch; its result must not resurrect "stale1"
        anomalies.gate.notify_waiters();
        handle.refresh().await.unwrap();
        let snap = wait_for(&mut rx, |s| {
            s.anomalies.events.iter().all(|e| e.id != "stale1")
                && !s.anomalies.events.is_empty()
        })
        .await;
        assert_eq!(snap.anomalies.filter.keyword.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn short_anomaly_page_stops_pagination() {
        let trends = ScriptedTrends::new(vec![]);
        // page size is 2; a single event means no more pages
        let anomalies = ScriptedAnomalies::new(vec![(None, vec![anomaly("a1", 1)])]);
        let (handle, _stream_tx) = spawn_session(trends, Arc::clone(&anomalies));

        let mut rx = handle.subscribe();
        let snap = wait_for(&mut rx, |s| !s.anomalies.events.is_empty()).await;
        assert!(!snap.anomalies.has_more);

        let calls_before = anomalies.calls.load(Ordering::SeqCst);
        handle.load_more_anomalies().await.unwrap();
        // command is processed before shutdown; no fetch may result
        handle.shutdown().await.unwrap();
        wait_for(&mut rx, |s| !s.anomalies.events.is_empty()).await;
        assert_eq!(anomalies.calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_last_error() {
        struct FailingTrends;
        #[async_trait]
        impl TrendsSource for FailingTrends {
            async fn fetch_trends(&self, _offset: u64, _limit: u64) -> Result<TrendsPage> {
                anyhow::bail!("connection refused")
            }
        }

        let anomalies = ScriptedAnomalies::new(vec![]);
        let (stream_tx, stream_rx) = mpsc::channel(4);
        let handle = SessionActor::spawn(
            Arc::new(FailingTrends),
            anomalies,
            stream_rx,
            None,
            small_config(),
        );
        drop(stream_tx);

        let mut rx = handle.subscribe();
        let snap = wait_for(&mut rx, |s| s.last_error.is_some()).await;
        assert!(snap.last_error.unwrap().contains("connection refused"));
        assert!(snap.trends.trends.is_empty());
    }
}
