// metrics.rs

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct CacheMetrics {
    // Trend cache
    trend_rows_inserted: AtomicU64,
    trend_rows_merged: AtomicU64,
    trend_rows_evicted: AtomicU64,

    // Change-timestamp cache
    change_updates_applied: AtomicU64,
    out_of_order_drops: AtomicU64,
    gap_resets: AtomicU64,
    uninitialized_drops: AtomicU64,

    start_time: Instant,
    last_eviction: RwLock<Option<DateTime<Utc>>>,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            trend_rows_inserted: AtomicU64::new(0),
            trend_rows_merged: AtomicU64::new(0),
            trend_rows_evicted: AtomicU64::new(0),
            change_updates_applied: AtomicU64::new(0),
            out_of_order_drops: AtomicU64::new(0),
            gap_resets: AtomicU64::new(0),
            uninitialized_drops: AtomicU64::new(0),
            start_time: Instant::now(),
            last_eviction: RwLock::new(None),
        }
    }

    pub fn record_row_inserted(&self) {
        self.trend_rows_inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_row_merged(&self) {
        self.trend_rows_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rows_evicted(&self, count: u64) {
        self.trend_rows_evicted.fetch_add(count, Ordering::Relaxed);
        *self.last_eviction.write() = Some(Utc::now());
    }

    pub fn record_change_update(&self) {
        self.change_updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_out_of_order_drop(&self) {
        self.out_of_order_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gap_reset(&self) {
        self.gap_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_uninitialized_drop(&self) {
        self.uninitialized_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_rows_evicted(&self) -> u64 {
        self.trend_rows_evicted.load(Ordering::Relaxed)
    }

    pub fn get_gap_resets(&self) -> u64 {
        self.gap_resets.load(Ordering::Relaxed)
    }

    pub fn get_current_metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            trend_rows_inserted: self.trend_rows_inserted.load(Ordering::Relaxed),
            trend_rows_merged: self.trend_rows_merged.load(Ordering::Relaxed),
            trend_rows_evicted: self.trend_rows_evicted.load(Ordering::Relaxed),
            change_updates_applied: self.change_updates_applied.load(Ordering::Relaxed),
            out_of_order_drops: self.out_of_order_drops.load(Ordering::Relaxed),
            gap_resets: self.gap_resets.load(Ordering::Relaxed),
            uninitialized_drops: self.uninitialized_drops.load(Ordering::Relaxed),
            last_eviction: *self.last_eviction.read(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime: std::time::Duration,
    pub trend_rows_inserted: u64,
    pub trend_rows_merged: u64,
    pub trend_rows_evicted: u64,
    pub change_updates_applied: u64,
    pub out_of_order_drops: u64,
    pub gap_resets: u64,
    pub uninitialized_drops: u64,
    pub last_eviction: Option<DateTime<Utc>>,
}
