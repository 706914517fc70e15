use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(MachineId);
string_id!(ColumnId);

/// A single signal value as delivered by the snapshot pipeline.
///
/// Equality is structural: `Int(1)` and `Float(1.0)` are different values,
/// and a NaN reading equals another NaN reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ColumnValue::Bool(a), ColumnValue::Bool(b)) => a == b,
            (ColumnValue::Int(a), ColumnValue::Int(b)) => a == b,
            (ColumnValue::Float(a), ColumnValue::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (ColumnValue::Text(a), ColumnValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl ColumnValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ColumnValue::Int(i) => Some(*i as f64),
            ColumnValue::Float(f) => Some(*f),
            ColumnValue::Text(_) => None,
        }
    }

    /// Narrows the value to an `i32`. Never truncates: anything that does not
    /// fit exactly is an error.
    pub fn try_to_i32(&self, column: &ColumnId) -> Result<i32> {
        match self {
            ColumnValue::Bool(b) => Ok(i32::from(*b)),
            ColumnValue::Int(i) => i32::try_from(*i)
                .map_err(|_| CacheError::value_overflow(column.as_str(), i, "i32")),
            ColumnValue::Float(f) => {
                if f.is_finite()
                    && f.fract() == 0.0
                    && *f >= f64::from(i32::MIN)
                    && *f <= f64::from(i32::MAX)
                {
                    Ok(*f as i32)
                } else {
                    Err(CacheError::value_overflow(column.as_str(), f, "i32"))
                }
            }
            ColumnValue::Text(_) => Err(CacheError::NotNumeric {
                column: column.to_string(),
            }),
        }
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Bool(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Float(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

/// Inclusive time range. `from` is not aligned automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The window of length `window` that ends at `now`.
    pub fn ending_at(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            from: now - window,
            to: now,
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from <= timestamp && timestamp <= self.to
    }

    /// Steps one minute at a time from `from` up to and including `to`.
    pub fn minutes(&self) -> impl Iterator<Item = DateTime<Utc>> {
        let to = self.to;
        std::iter::successors(Some(self.from), |t| Some(*t + Duration::minutes(1)))
            .take_while(move |t| *t <= to)
    }

    /// Number of entries `minutes()` yields.
    pub fn len_minutes(&self) -> usize {
        if self.to < self.from {
            return 0;
        }
        ((self.to - self.from).num_minutes() + 1) as usize
    }
}

pub fn truncate_to_minute(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(timestamp)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedValue {
    pub timestamp: DateTime<Utc>,
    pub value: ColumnValue,
}

impl TimestampedValue {
    pub fn new(timestamp: DateTime<Utc>, value: ColumnValue) -> Self {
        Self { timestamp, value }
    }
}

/// Per-minute column values derived from one snapshot.
pub type TrendElement = HashMap<ColumnId, Option<f64>>;

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSnapshot {
    pub snapshot_time: DateTime<Utc>,
    pub element: TrendElement,
}

impl TrendSnapshot {
    pub fn new(snapshot_time: DateTime<Utc>, element: TrendElement) -> Self {
        Self {
            snapshot_time,
            element,
        }
    }
}

/// Raw snapshot as pushed by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub machine_id: MachineId,
    pub snapshot_time: DateTime<Utc>,
    pub values: HashMap<ColumnId, ColumnValue>,
    #[serde(default)]
    pub is_minutely: bool,
}
