pub mod config;
pub mod config_loader;
pub mod events;
pub mod filter;
pub mod models;
pub mod traits;

pub use config::{ApiConfig, AppConfig, FeedConfig};
pub use config_loader::ConfigLoader;
pub use events::StreamEvent;
pub use filter::AnomalyFilter;
pub use models::{
    AnomaliesMeta, AnomaliesPage, AnomalyEvent, KeywordAnalytics, KeywordDetail, RawTrendRecord,
    RawTrendsMeta, RawTrendsPayload, RelatedPost, SeriesPoint, TrendMetric, TrendsMeta, TrendsPage,
};
pub use traits::{AnomalySource, TrendsSource};
