//! Reconciliation engine for the pulse dashboard.
//!
//! Three independent update sources compete for the same collections: a
//! full-refresh poll that may reorder or replace entries, manual pagination
//! appending older data, and a live push stream prepending newest data.
//! The reconcilers here merge all of them into deduplicated, correctly
//! ordered, memory-bounded collections with pure snapshot reads.

pub mod anomalies;
pub mod kpi;
pub mod trends;

pub use anomalies::{AnomalyFeed, AnomalyFeedSnapshot};
pub use kpi::{compute_kpi, KpiSnapshot};
pub use trends::{TrendCatalog, TrendCatalogSnapshot};
