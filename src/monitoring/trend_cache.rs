// trend_cache.rs

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::monitoring::deriver::TrendElementDeriver;
use crate::monitoring::metrics::CacheMetrics;
use crate::types::{truncate_to_minute, ColumnId, MachineId, MachineSnapshot, TimeRange, TrendSnapshot};

/// Column values of one minute. Rows are never mutated in place: a merge
/// builds a new map and swaps the `Arc`, so readers keep a stable view.
pub type TrendRow = Arc<HashMap<ColumnId, Option<f64>>>;

/// Per-minute trend values of a single machine.
#[derive(Debug)]
pub struct MachineTrendCache {
    machine_id: MachineId,
    rows: DashMap<DateTime<Utc>, TrendRow>,
    metrics: Arc<CacheMetrics>,
}

impl MachineTrendCache {
    pub fn new(machine_id: MachineId) -> Self {
        Self::with_metrics(machine_id, Arc::new(CacheMetrics::new()))
    }

    pub fn with_metrics(machine_id: MachineId, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            machine_id,
            rows: DashMap::new(),
            metrics,
        }
    }

    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    /// Returns one entry per minute from `range.from` to `range.to`, `None`
    /// where nothing is cached. `range.from` must already be minute aligned.
    pub fn get(&self, range: &TimeRange) -> BTreeMap<DateTime<Utc>, Option<TrendRow>> {
        range
            .minutes()
            .map(|minute| {
                let row = self.rows.get(&minute).map(|row| Arc::clone(row.value()));
                (minute, row)
            })
            .collect()
    }

    pub fn row(&self, minute: DateTime<Utc>) -> Option<TrendRow> {
        self.rows
            .get(&truncate_to_minute(minute))
            .map(|row| Arc::clone(row.value()))
    }

    /// Inserts or merges each snapshot into the row of its minute. Columns of
    /// a snapshot overwrite the same columns of the row; other columns stay.
    pub fn update_cache_values<I>(&self, snapshots: I)
    where
        I: IntoIterator<Item = TrendSnapshot>,
    {
        for snapshot in snapshots {
            let minute = truncate_to_minute(snapshot.snapshot_time);
            match self.rows.entry(minute) {
                Entry::Occupied(mut occupied) => {
                    let mut merged = (**occupied.get()).clone();
                    merged.extend(snapshot.element);
                    occupied.insert(Arc::new(merged));
                    self.metrics.record_row_merged();
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::new(snapshot.element));
                    self.metrics.record_row_inserted();
                }
            }
        }
    }

    /// Derives the trend element of every snapshot and applies it. A deriver
    /// failure stops the batch; snapshots applied before it stay cached.
    pub fn ingest<'a, I, D>(&self, snapshots: I, deriver: &D) -> Result<usize>
    where
        I: IntoIterator<Item = &'a MachineSnapshot>,
        D: TrendElementDeriver + ?Sized,
    {
        let mut applied = 0;
        for snapshot in snapshots {
            let element = deriver.derive(snapshot).map_err(|e| {
                warn!(
                    "Failed to derive trend element for {} at {}: {}",
                    self.machine_id, snapshot.snapshot_time, e
                );
                e
            })?;
            self.update_cache_values(std::iter::once(TrendSnapshot::new(
                snapshot.snapshot_time,
                element,
            )));
            applied += 1;
        }
        Ok(applied)
    }

    /// Removes every row outside `valid_range`. Returns the number removed.
    pub fn delete_old_snapshots_from_cache(&self, valid_range: &TimeRange) -> usize {
        let mut removed = 0;
        self.rows.retain(|minute, _| {
            let keep = valid_range.contains(*minute);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            self.metrics.record_rows_evicted(removed as u64);
            debug!(
                "Evicted {} trend rows of {} outside {} - {}",
                removed, self.machine_id, valid_range.from, valid_range.to
            );
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn latest_date_time(&self) -> Option<DateTime<Utc>> {
        self.rows.iter().map(|row| *row.key()).max()
    }

    pub fn clear(&self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::monitoring::deriver::NumericTrendDeriver;
    use crate::types::ColumnValue;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, h, m, s).unwrap()
    }

    fn element(values: &[(&str, f64)]) -> HashMap<ColumnId, Option<f64>> {
        values
            .iter()
            .map(|(c, v)| (ColumnId::from(*c), Some(*v)))
            .collect()
    }

    fn create_test_cache() -> MachineTrendCache {
        MachineTrendCache::new(MachineId::from("M1"))
    }

    #[test]
    fn test_rows_are_minute_aligned() {
        let cache = create_test_cache();
        cache.update_cache_values(vec![
            TrendSnapshot::new(at(10, 0, 17), element(&[("Speed", 1.0)])),
            TrendSnapshot::new(at(10, 1, 59), element(&[("Speed", 2.0)])),
        ]);

        assert_eq!(cache.len(), 2);
        assert!(cache.row(at(10, 0, 0)).is_some());
        assert!(cache.row(at(10, 1, 0)).is_some());
        assert_eq!(cache.latest_date_time(), Some(at(10, 1, 0)));
    }

    #[test]
    fn test_get_fills_missing_minutes() {
        let cache = create_test_cache();
        cache.update_cache_values(vec![
            TrendSnapshot::new(at(10, 3, 0), element(&[("Speed", 3.0)])),
            TrendSnapshot::new(at(10, 1, 0), element(&[("Speed", 1.0)])),
        ]);

        let result = cache.get(&TimeRange::new(at(10, 0, 0), at(10, 4, 0)));
        let keys: Vec<_> = result.keys().copied().collect();
        assert_eq!(
            keys,
            vec![at(10, 0, 0), at(10, 1, 0), at(10, 2, 0), at(10, 3, 0), at(10, 4, 0)]
        );
        assert!(result[&at(10, 0, 0)].is_none());
        assert_eq!(result[&at(10, 1, 0)].as_ref().unwrap()[&ColumnId::from("Speed")], Some(1.0));
        assert!(result[&at(10, 2, 0)].is_none());
        assert_eq!(result[&at(10, 3, 0)].as_ref().unwrap()[&ColumnId::from("Speed")], Some(3.0));
        assert!(result[&at(10, 4, 0)].is_none());
    }

    #[test]
    fn test_merge_keeps_unsupplied_columns() {
        let cache = create_test_cache();
        cache.update_cache_values(vec![TrendSnapshot::new(
            at(10, 0, 5),
            element(&[("Speed", 1.0), ("Temp", 20.0)]),
        )]);
        let before = cache.row(at(10, 0, 0)).unwrap();

        cache.update_cache_values(vec![TrendSnapshot::new(
            at(10, 0, 40),
            element(&[("Speed", 5.0), ("Pressure", 2.5)]),
        )]);

        let row = cache.row(at(10, 0, 0)).unwrap();
        assert_eq!(*row, element(&[("Speed", 5.0), ("Temp", 20.0), ("Pressure", 2.5)]));
        // a reader holding the old row is not affected by the merge
        assert_eq!(*before, element(&[("Speed", 1.0), ("Temp", 20.0)]));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![
            TrendSnapshot::new(at(10, 0, 0), element(&[("Speed", 1.0)])),
            TrendSnapshot::new(at(10, 0, 30), element(&[("Temp", 20.0)])),
            TrendSnapshot::new(at(10, 1, 0), element(&[("Speed", 2.0)])),
        ];
        let once = create_test_cache();
        once.update_cache_values(batch.clone());
        let twice = create_test_cache();
        twice.update_cache_values(batch.clone());
        twice.update_cache_values(batch);

        let range = TimeRange::new(at(10, 0, 0), at(10, 1, 0));
        assert_eq!(once.get(&range), twice.get(&range));
    }

    #[test]
    fn test_delete_old_snapshots() {
        let cache = create_test_cache();
        cache.update_cache_values(
            (0..10).map(|m| TrendSnapshot::new(at(10, m, 0), element(&[("Speed", m as f64)]))),
        );

        let valid = TimeRange::new(at(10, 3, 0), at(10, 6, 0));
        assert_eq!(cache.delete_old_snapshots_from_cache(&valid), 6);
        assert_eq!(cache.len(), 4);
        for m in 3..=6 {
            assert_eq!(
                cache.row(at(10, m, 0)).unwrap()[&ColumnId::from("Speed")],
                Some(m as f64)
            );
        }
        assert_eq!(cache.delete_old_snapshots_from_cache(&valid), 0);
    }

    #[test]
    fn test_empty_cache() {
        let cache = create_test_cache();
        assert!(cache.is_empty());
        assert_eq!(cache.latest_date_time(), None);
        let result = cache.get(&TimeRange::new(at(10, 0, 0), at(10, 2, 0)));
        assert_eq!(result.len(), 3);
        assert!(result.values().all(Option::is_none));
    }

    #[test]
    fn test_ingest_with_deriver() {
        let cache = create_test_cache();
        let snapshots: Vec<MachineSnapshot> = (0..3)
            .map(|m| MachineSnapshot {
                machine_id: MachineId::from("M1"),
                snapshot_time: at(10, m, 0),
                values: HashMap::from([(ColumnId::from("Sacks"), ColumnValue::Int(i64::from(m) * 10))]),
                is_minutely: true,
            })
            .collect();

        let applied = cache.ingest(&snapshots, &NumericTrendDeriver::new()).unwrap();
        assert_eq!(applied, 3);
        assert_eq!(cache.row(at(10, 2, 0)).unwrap()[&ColumnId::from("Sacks")], Some(20.0));
    }

    #[test]
    fn test_ingest_stops_on_overflow() {
        let cache = create_test_cache();
        let deriver = NumericTrendDeriver::new().with_integer_columns([ColumnId::from("Sacks")]);
        let snapshots: Vec<MachineSnapshot> = [1_i64, i64::MAX, 3]
            .iter()
            .enumerate()
            .map(|(m, v)| MachineSnapshot {
                machine_id: MachineId::from("M1"),
                snapshot_time: at(10, m as u32, 0),
                values: HashMap::from([(ColumnId::from("Sacks"), ColumnValue::Int(*v))]),
                is_minutely: true,
            })
            .collect();

        let err = cache.ingest(&snapshots, &deriver).unwrap_err();
        assert!(matches!(err, CacheError::ValueOverflow { .. }));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_updates_same_minute() {
        let cache = create_test_cache();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let cache = &cache;
                scope.spawn(move || {
                    for i in 0..100 {
                        let column = format!("C{}", worker);
                        cache.update_cache_values(vec![TrendSnapshot::new(
                            at(10, 0, 0) + Duration::milliseconds(i),
                            element(&[(column.as_str(), i as f64)]),
                        )]);
                    }
                });
            }
        });

        let row = cache.row(at(10, 0, 0)).unwrap();
        assert_eq!(row.len(), 8);
        for worker in 0..8 {
            assert_eq!(row[&ColumnId::from(format!("C{}", worker))], Some(99.0));
        }
    }
}
