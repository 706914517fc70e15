// change_timestamp_cache.rs

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::constants::DEFAULT_GAP_THRESHOLD;
use crate::monitoring::metrics::CacheMetrics;
use crate::types::{ColumnId, ColumnValue, MachineId, TimestampedValue};

/// Tracked change state of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Latest observed value, debounced against the last stable value.
    pub live: TimestampedValue,
    /// Latest minutely (aggregated) value.
    pub last_stable_value: TimestampedValue,
    pub last_snapshot_time: DateTime<Utc>,
}

impl ChangeRecord {
    fn seeded(value: ColumnValue, changed_timestamp: DateTime<Utc>, last_snapshot_time: DateTime<Utc>) -> Self {
        let stable = TimestampedValue::new(changed_timestamp, value);
        Self {
            live: stable.clone(),
            last_stable_value: stable,
            last_snapshot_time,
        }
    }

    fn apply(&mut self, value: ColumnValue, snapshot_time: DateTime<Utc>, is_minutely_snapshot: bool) {
        if is_minutely_snapshot {
            if value != self.last_stable_value.value {
                let stable = TimestampedValue::new(snapshot_time, value);
                self.live = stable.clone();
                self.last_stable_value = stable;
            } else {
                self.last_stable_value.timestamp = snapshot_time;
                self.live = self.last_stable_value.clone();
            }
        } else if value == self.live.value {
            // live value already current
        } else if value == self.last_stable_value.value {
            // spike reverted within the minute
            self.live = self.last_stable_value.clone();
        } else {
            self.live = TimestampedValue::new(snapshot_time, value);
        }
        self.last_snapshot_time = snapshot_time;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeTimestampConfig {
    pub gap_threshold: Duration,
}

impl Default for ChangeTimestampConfig {
    fn default() -> Self {
        Self {
            gap_threshold: Duration::seconds(DEFAULT_GAP_THRESHOLD.as_secs() as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateOutcome {
    Applied,
    Uninitialized,
    OutOfOrder,
    Gap,
}

/// Last real change timestamp per column of a single machine.
///
/// A slot holding `None` is a column whose tracking was voided by a gap; it
/// stays that way until it is initialized again.
#[derive(Debug)]
pub struct SnapshotColumnValueChangeTimestampCache {
    machine_id: MachineId,
    columns: DashMap<ColumnId, Option<ChangeRecord>>,
    config: ChangeTimestampConfig,
    metrics: Arc<CacheMetrics>,
}

impl SnapshotColumnValueChangeTimestampCache {
    pub fn new(machine_id: MachineId) -> Self {
        Self::with_config(
            machine_id,
            ChangeTimestampConfig::default(),
            Arc::new(CacheMetrics::new()),
        )
    }

    pub fn with_config(
        machine_id: MachineId,
        config: ChangeTimestampConfig,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            machine_id,
            columns: DashMap::new(),
            config,
            metrics,
        }
    }

    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    /// Timestamp of the last real change of `column_id`, if it is tracked.
    pub fn try_get_value(&self, column_id: &ColumnId) -> Option<DateTime<Utc>> {
        self.columns
            .get(column_id)
            .and_then(|slot| slot.value().as_ref().map(|record| record.live.timestamp))
    }

    /// `None` if never seen, `Some(None)` if reset by a gap.
    pub fn record(&self, column_id: &ColumnId) -> Option<Option<ChangeRecord>> {
        self.columns.get(column_id).map(|slot| slot.value().clone())
    }

    pub fn initialize_value_for_column_id(
        &self,
        column_id: ColumnId,
        value: ColumnValue,
        changed_timestamp: DateTime<Utc>,
        latest_minutely_snapshot_time: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let record = ChangeRecord::seeded(value, changed_timestamp, latest_minutely_snapshot_time);
        self.columns.insert(column_id, Some(record));
        changed_timestamp
    }

    pub fn update_live_value_for_column_id(
        &self,
        column_id: &ColumnId,
        value: ColumnValue,
        snapshot_time: DateTime<Utc>,
        is_minutely_snapshot: bool,
    ) {
        let outcome = match self.columns.get_mut(column_id) {
            None => UpdateOutcome::Uninitialized,
            Some(mut slot) => {
                self.transition(slot.value_mut(), value, snapshot_time, is_minutely_snapshot)
            }
        };
        self.record_outcome(outcome, column_id, snapshot_time);
    }

    /// Updates the column, initializing it first when it is not tracked.
    /// Both happen under the column's entry lock.
    /// Returns `None` when the update voided the tracking because of a gap.
    pub fn track(
        &self,
        column_id: &ColumnId,
        value: ColumnValue,
        snapshot_time: DateTime<Utc>,
        is_minutely_snapshot: bool,
    ) -> Option<DateTime<Utc>> {
        let mut slot = self.columns.entry(column_id.clone()).or_insert(None);
        if slot.value().is_none() {
            *slot.value_mut() = Some(ChangeRecord::seeded(value, snapshot_time, snapshot_time));
            return Some(snapshot_time);
        }

        let outcome = self.transition(slot.value_mut(), value, snapshot_time, is_minutely_snapshot);
        let last_change = slot.value().as_ref().map(|record| record.live.timestamp);
        drop(slot);

        self.record_outcome(outcome, column_id, snapshot_time);
        last_change
    }

    fn transition(
        &self,
        slot: &mut Option<ChangeRecord>,
        value: ColumnValue,
        snapshot_time: DateTime<Utc>,
        is_minutely_snapshot: bool,
    ) -> UpdateOutcome {
        let outcome = match slot.as_mut() {
            None => UpdateOutcome::Uninitialized,
            Some(record) if record.last_snapshot_time > snapshot_time => UpdateOutcome::OutOfOrder,
            Some(record)
                if snapshot_time - record.last_snapshot_time >= self.config.gap_threshold =>
            {
                UpdateOutcome::Gap
            }
            Some(record) => {
                record.apply(value, snapshot_time, is_minutely_snapshot);
                UpdateOutcome::Applied
            }
        };
        if outcome == UpdateOutcome::Gap {
            *slot = None;
        }
        outcome
    }

    fn record_outcome(&self, outcome: UpdateOutcome, column_id: &ColumnId, snapshot_time: DateTime<Utc>) {
        match outcome {
            UpdateOutcome::Applied => self.metrics.record_change_update(),
            UpdateOutcome::Uninitialized => self.metrics.record_uninitialized_drop(),
            UpdateOutcome::OutOfOrder => {
                self.metrics.record_out_of_order_drop();
                debug!(
                    "Dropped out-of-order update for {}/{} at {}",
                    self.machine_id, column_id, snapshot_time
                );
            }
            UpdateOutcome::Gap => {
                self.metrics.record_gap_reset();
                debug!(
                    "Gap detected for {}/{} at {}, change tracking reset",
                    self.machine_id, column_id, snapshot_time
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn clear(&self) {
        self.columns.clear();
    }
}
