//! # Errors
//!
//! Validation failures are returned synchronously by the context setters, everything else
//! surfaces from [MetricsLogger::flush](super::MetricsLogger::flush)

use std::io;
use thiserror::Error;

/// Input rejected by one of the Embedded Metric Format limits
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("namespace cannot be empty")]
    EmptyNamespace,

    #[error("namespace cannot be longer than {max} characters, got {len}")]
    NamespaceTooLong { len: usize, max: usize },

    #[error("namespace {0:?} must only contain characters [a-zA-Z0-9._#:/-]")]
    InvalidNamespace(String),

    #[error("maximum number of dimensions per dimension set is {max}, got {count}")]
    TooManyDimensions { count: usize, max: usize },

    #[error("dimension key {0:?} has non-ASCII characters")]
    NonAsciiDimensionKey(String),

    #[error("dimension value {0:?} has non-ASCII characters")]
    NonAsciiDimensionValue(String),

    #[error("dimension key must include at least one non-whitespace character")]
    EmptyDimensionKey,

    #[error("dimension value for key {0:?} must include at least one non-whitespace character")]
    EmptyDimensionValue(String),

    #[error("dimension key {key:?} must not exceed {max} characters")]
    DimensionKeyTooLong { key: String, max: usize },

    #[error("dimension value for key {key:?} must not exceed {max} characters")]
    DimensionValueTooLong { key: String, max: usize },

    #[error("dimension key {0:?} cannot start with ':'")]
    DimensionKeyStartsWithColon(String),

    #[error("metric name must include at least one non-whitespace character")]
    EmptyMetricName,

    #[error("metric name {name:?} must not exceed {max} characters")]
    MetricNameTooLong { name: String, max: usize },

    #[error("metric unit {0:?} is not valid")]
    InvalidUnit(String),

    #[error("metric storage resolution {0} is not valid, expected 1 or 60")]
    InvalidStorageResolution(u64),

    #[error("resolution for metric {0:?} is already set, a single log event cannot have a metric with two different resolutions")]
    ConflictingStorageResolution(String),

    #[error("metric value {value} for {name:?} is not a finite number within the 64 bit integer range")]
    InvalidMetricValue { name: String, value: f64 },

    #[error("timestamp cannot be zero")]
    ZeroTimestamp,

    #[error("timestamp {timestamp} is more than {max_ms}ms in the past")]
    TimestampTooOld { timestamp: u64, max_ms: u64 },

    #[error("timestamp {timestamp} is more than {max_ms}ms in the future")]
    TimestampInFuture { timestamp: u64, max_ms: u64 },

    #[error("metadata key {0:?} is reserved by the _aws envelope")]
    ReservedMetaKey(String),
}

/// Failures while flushing a context to its sink
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("maximum number of dimensions allowed is {max}, a dimension set has {size}; account for default dimensions if not using set_dimensions")]
    DimensionSetTooLarge { size: usize, max: usize },

    #[error("failed to serialize metrics document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write metrics: {0}")]
    Io(#[from] io::Error),

    #[error("unable to connect to {addr} after {attempts} attempts: {source}")]
    Connect {
        addr: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("unable to resolve address {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("address {0} did not resolve to any socket address")]
    NoAddress(String),
}
