use std::time::Duration;

// Change detection
pub const DEFAULT_GAP_THRESHOLD: Duration = Duration::from_secs(2 * 60);

// Trend retention
pub const DEFAULT_VALIDITY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(60);
