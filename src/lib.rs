pub mod constants;
pub mod error;
pub mod monitoring;
pub mod types;

pub use error::{CacheError, Result};
pub use monitoring::{
    CacheConfig, MachineCacheRegistry, MachineCaches, MachineTrendCache, NumericTrendDeriver,
    SnapshotColumnValueChangeTimestampCache, TrendElementDeriver,
};
pub use types::{ColumnId, ColumnValue, MachineId, MachineSnapshot, TimeRange, TrendSnapshot};
