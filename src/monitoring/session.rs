// session.rs

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::monitoring::{
    change_timestamp_cache::{ChangeTimestampConfig, SnapshotColumnValueChangeTimestampCache},
    config::CacheConfig,
    deriver::TrendElementDeriver,
    metrics::CacheMetrics,
    trend_cache::MachineTrendCache,
};
use crate::types::{MachineId, MachineSnapshot, TimeRange};

/// The caches owned by one connected machine.
#[derive(Debug)]
pub struct MachineCaches {
    machine_id: MachineId,
    created_at: DateTime<Utc>,
    trend: MachineTrendCache,
    change_timestamps: SnapshotColumnValueChangeTimestampCache,
}

impl MachineCaches {
    pub fn new(
        machine_id: MachineId,
        change_config: ChangeTimestampConfig,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            trend: MachineTrendCache::with_metrics(machine_id.clone(), Arc::clone(&metrics)),
            change_timestamps: SnapshotColumnValueChangeTimestampCache::with_config(
                machine_id.clone(),
                change_config,
                metrics,
            ),
            created_at: Utc::now(),
            machine_id,
        }
    }

    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn trend(&self) -> &MachineTrendCache {
        &self.trend
    }

    pub fn change_timestamps(&self) -> &SnapshotColumnValueChangeTimestampCache {
        &self.change_timestamps
    }

    /// Feeds a batch of snapshots into both caches, one snapshot at a time.
    /// Only minutely snapshots become trend rows; every snapshot drives change
    /// tracking. A snapshot that fails to derive stops the batch: the ones
    /// before it stay applied to both caches and it is applied to neither.
    pub fn apply_batch<D>(&self, snapshots: &[MachineSnapshot], deriver: &D) -> Result<()>
    where
        D: TrendElementDeriver + ?Sized,
    {
        for snapshot in snapshots {
            if snapshot.machine_id != self.machine_id {
                warn!(
                    "Skipping snapshot of {} pushed to caches of {}",
                    snapshot.machine_id, self.machine_id
                );
                continue;
            }

            if snapshot.is_minutely {
                self.trend.ingest(std::iter::once(snapshot), deriver)?;
            }

            for (column, value) in &snapshot.values {
                self.change_timestamps.track(
                    column,
                    value.clone(),
                    snapshot.snapshot_time,
                    snapshot.is_minutely,
                );
            }
        }
        Ok(())
    }

    /// Live values seen before a reconnect can not be compared to new ones.
    pub fn on_reconnect(&self) {
        self.change_timestamps.clear();
        debug!("Change tracking of {} cleared after reconnect", self.machine_id);
    }
}

#[derive(Debug)]
pub struct MachineCacheRegistry {
    machines: DashMap<MachineId, Arc<MachineCaches>>,
    config: CacheConfig,
    change_config: ChangeTimestampConfig,
    validity_window: chrono::Duration,
    metrics: Arc<CacheMetrics>,
}

impl MachineCacheRegistry {
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            change_config: ChangeTimestampConfig {
                gap_threshold: config.gap_threshold()?,
            },
            validity_window: config.validity_window()?,
            machines: DashMap::new(),
            metrics: Arc::new(CacheMetrics::new()),
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn get_or_create(&self, machine_id: &MachineId) -> Arc<MachineCaches> {
        let entry = self.machines.entry(machine_id.clone()).or_insert_with(|| {
            debug!("Creating caches for machine {}", machine_id);
            Arc::new(MachineCaches::new(
                machine_id.clone(),
                self.change_config,
                Arc::clone(&self.metrics),
            ))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, machine_id: &MachineId) -> Option<Arc<MachineCaches>> {
        self.machines
            .get(machine_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, machine_id: &MachineId) -> Option<Arc<MachineCaches>> {
        let removed = self.machines.remove(machine_id).map(|(_, caches)| caches);
        if removed.is_some() {
            debug!("Removed caches for machine {}", machine_id);
        }
        removed
    }

    pub fn machine_ids(&self) -> Vec<MachineId> {
        let mut ids: Vec<_> = self.machines.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Drops trend rows older than the validity window for every machine.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let valid_range = TimeRange::ending_at(now, self.validity_window);
        let machines: Vec<_> = self
            .machines
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        machines
            .iter()
            .map(|caches| caches.trend().delete_old_snapshots_from_cache(&valid_range))
            .sum()
    }

    /// Runs `evict_stale` every `eviction_interval` until the registry is
    /// dropped. Must be called from within a tokio runtime.
    pub fn spawn_eviction_task(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.eviction_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(period);
            loop {
                interval_timer.tick().await;
                let Some(registry) = weak.upgrade() else {
                    debug!("Registry dropped, stopping trend eviction");
                    break;
                };
                let evicted = registry.evict_stale(Utc::now());
                if evicted > 0 {
                    debug!("Periodic eviction removed {} trend rows", evicted);
                }
            }
        })
    }
}
