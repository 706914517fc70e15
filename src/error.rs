// error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Value overflow: {value} in column {column} does not fit into {target}")]
    ValueOverflow {
        column: String,
        value: String,
        target: &'static str,
    },

    #[error("Column {column} does not carry a numeric value")]
    NotNumeric { column: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    /// Creates a new ValueOverflow error
    pub fn value_overflow<C: Into<String>, V: ToString>(
        column: C,
        value: V,
        target: &'static str,
    ) -> Self {
        Self::ValueOverflow {
            column: column.into(),
            value: value.to_string(),
            target,
        }
    }

    /// Creates a new InvalidConfig error
    pub fn invalid_config<T: Into<String>>(message: T) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if the error means the incoming data itself is unusable
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::ValueOverflow { .. } | Self::NotNumeric { .. })
    }
}

/// Result type alias for CacheError
pub type Result<T> = std::result::Result<T, CacheError>;
