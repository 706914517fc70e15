// config.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_EVICTION_INTERVAL, DEFAULT_GAP_THRESHOLD, DEFAULT_VALIDITY_WINDOW};
use crate::error::{CacheError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Distance between two processed snapshots of a column that voids its
    /// tracked change state.
    #[serde(with = "humantime_serde")]
    pub gap_threshold: Duration,
    /// How far back trend rows are kept by periodic eviction.
    #[serde(with = "humantime_serde")]
    pub validity_window: Duration,
    #[serde(with = "humantime_serde")]
    pub eviction_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            gap_threshold: DEFAULT_GAP_THRESHOLD,
            validity_window: DEFAULT_VALIDITY_WINDOW,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
        }
    }
}

impl CacheConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("gap_threshold", self.gap_threshold),
            ("validity_window", self.validity_window),
            ("eviction_interval", self.eviction_interval),
        ] {
            if value.is_zero() {
                return Err(CacheError::invalid_config(format!("{} must be non-zero", name)));
            }
            to_chrono(name, value)?;
        }
        Ok(())
    }

    pub fn gap_threshold(&self) -> Result<chrono::Duration> {
        to_chrono("gap_threshold", self.gap_threshold)
    }

    pub fn validity_window(&self) -> Result<chrono::Duration> {
        to_chrono("validity_window", self.validity_window)
    }
}

fn to_chrono(name: &str, value: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(value)
        .map_err(|_| CacheError::invalid_config(format!("{} is out of range", name)))
}
