// deriver.rs

use std::collections::HashSet;

use crate::error::Result;
use crate::types::{ColumnId, MachineSnapshot, TrendElement};

/// Turns a raw snapshot into the per-minute column values stored by the
/// trend cache.
pub trait TrendElementDeriver: Send + Sync {
    fn derive(&self, snapshot: &MachineSnapshot) -> Result<TrendElement>;
}

impl<F> TrendElementDeriver for F
where
    F: Fn(&MachineSnapshot) -> Result<TrendElement> + Send + Sync,
{
    fn derive(&self, snapshot: &MachineSnapshot) -> Result<TrendElement> {
        self(snapshot)
    }
}

/// Maps every column onto its numeric view. Text values become `None`.
///
/// Columns registered as integer columns are narrowed to `i32` first, and a
/// value that does not fit fails the whole derivation.
#[derive(Debug, Clone, Default)]
pub struct NumericTrendDeriver {
    columns: Option<HashSet<ColumnId>>,
    integer_columns: HashSet<ColumnId>,
}

impl NumericTrendDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the derived element to the given columns.
    pub fn with_columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = ColumnId>,
    {
        self.columns = Some(columns.into_iter().collect());
        self
    }

    pub fn with_integer_columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = ColumnId>,
    {
        self.integer_columns.extend(columns);
        self
    }

    fn is_tracked(&self, column: &ColumnId) -> bool {
        self.columns
            .as_ref()
            .map_or(true, |columns| columns.contains(column))
    }
}

impl TrendElementDeriver for NumericTrendDeriver {
    fn derive(&self, snapshot: &MachineSnapshot) -> Result<TrendElement> {
        let mut element = TrendElement::with_capacity(snapshot.values.len());
        for (column, value) in &snapshot.values {
            if !self.is_tracked(column) {
                continue;
            }
            let trend_value = if self.integer_columns.contains(column) {
                Some(f64::from(value.try_to_i32(column)?))
            } else {
                value.as_f64()
            };
            element.insert(column.clone(), trend_value);
        }
        Ok(element)
    }
}
