// monitoring/mod.rs

pub mod change_timestamp_cache;
pub mod config;
pub mod deriver;
pub mod metrics;
pub mod session;
pub mod trend_cache;

pub use change_timestamp_cache::{
    ChangeRecord, ChangeTimestampConfig, SnapshotColumnValueChangeTimestampCache,
};
pub use config::CacheConfig;
pub use deriver::{NumericTrendDeriver, TrendElementDeriver};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use session::{MachineCacheRegistry, MachineCaches};
pub use trend_cache::{MachineTrendCache, TrendRow};
