//! # Validation
//!
//! Limits imposed by CloudWatch on namespaces, dimensions, metrics and timestamps
//!
//! <https://docs.aws.amazon.com/AmazonCloudWatch/latest/monitoring/CloudWatch_Embedded_Metric_Format_Specification.html>

use super::context::DimensionSet;
use super::error::ValidationError;
use super::units::StorageResolution;
use std::collections::HashMap;

/// The Embedded Metric Format supports a maximum of 30 dimensions per dimension set
pub const MAX_DIMENSION_SET_SIZE: usize = 30;
pub const MAX_DIMENSION_NAME_LENGTH: usize = 250;
pub const MAX_DIMENSION_VALUE_LENGTH: usize = 1024;
pub const MAX_METRIC_NAME_LENGTH: usize = 1024;
pub const MAX_NAMESPACE_LENGTH: usize = 256;
/// Two weeks
pub const MAX_TIMESTAMP_PAST_AGE_MS: u64 = 14 * 24 * 60 * 60 * 1000;
/// Two hours
pub const MAX_TIMESTAMP_FUTURE_AGE_MS: u64 = 2 * 60 * 60 * 1000;

const NAMESPACE_SYMBOLS: &[char] = &['.', '_', '#', ':', '/', '-'];

/// Keys of the `_aws` envelope that are not metadata
pub const RESERVED_META_KEYS: [&str; 2] = ["Timestamp", "CloudWatchMetrics"];

pub fn validate_namespace(namespace: &str) -> Result<(), ValidationError> {
    if namespace.is_empty() {
        return Err(ValidationError::EmptyNamespace);
    }
    if namespace.len() > MAX_NAMESPACE_LENGTH {
        return Err(ValidationError::NamespaceTooLong {
            len: namespace.len(),
            max: MAX_NAMESPACE_LENGTH,
        });
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || NAMESPACE_SYMBOLS.contains(&c))
    {
        return Err(ValidationError::InvalidNamespace(namespace.to_owned()));
    }
    Ok(())
}

/// Validate a dimension set, values are checked after trimming surrounding whitespace
pub fn validate_dimension_set(dimension_set: &DimensionSet) -> Result<(), ValidationError> {
    if dimension_set.len() > MAX_DIMENSION_SET_SIZE {
        return Err(ValidationError::TooManyDimensions {
            count: dimension_set.len(),
            max: MAX_DIMENSION_SET_SIZE,
        });
    }

    for (key, value) in dimension_set {
        let value = value.trim();

        if !key.is_ascii() {
            return Err(ValidationError::NonAsciiDimensionKey(key.clone()));
        }
        if !value.is_ascii() {
            return Err(ValidationError::NonAsciiDimensionValue(value.to_owned()));
        }
        if key.trim().is_empty() {
            return Err(ValidationError::EmptyDimensionKey);
        }
        if value.is_empty() {
            return Err(ValidationError::EmptyDimensionValue(key.clone()));
        }
        if key.len() > MAX_DIMENSION_NAME_LENGTH {
            return Err(ValidationError::DimensionKeyTooLong {
                key: key.clone(),
                max: MAX_DIMENSION_NAME_LENGTH,
            });
        }
        if value.len() > MAX_DIMENSION_VALUE_LENGTH {
            return Err(ValidationError::DimensionValueTooLong {
                key: key.clone(),
                max: MAX_DIMENSION_VALUE_LENGTH,
            });
        }
        if key.starts_with(':') {
            return Err(ValidationError::DimensionKeyStartsWithColon(key.clone()));
        }
    }

    Ok(())
}

/// Validate a metric name against its resolution history within one context
///
/// Units and resolutions are typed, so their checks happen where strings are parsed into
/// [Unit](super::Unit) and [StorageResolution]
pub fn validate_metric(
    name: &str,
    resolution: StorageResolution,
    resolutions: &HashMap<String, StorageResolution>,
) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyMetricName);
    }
    if name.len() > MAX_METRIC_NAME_LENGTH {
        return Err(ValidationError::MetricNameTooLong {
            name: name.to_owned(),
            max: MAX_METRIC_NAME_LENGTH,
        });
    }
    match resolutions.get(name) {
        Some(previous) if *previous != resolution => {
            Err(ValidationError::ConflictingStorageResolution(name.to_owned()))
        }
        _ => Ok(()),
    }
}

/// CloudWatch only accepts finite values that fit in a signed 64 bit integer's magnitude
pub fn validate_value(name: &str, value: f64) -> Result<(), ValidationError> {
    // i64::MAX as f64 rounds up to exactly 2^63
    const LIMIT: f64 = i64::MAX as f64;

    if !value.is_finite() || value > LIMIT || value < -LIMIT {
        return Err(ValidationError::InvalidMetricValue {
            name: name.to_owned(),
            value,
        });
    }
    Ok(())
}

/// Validate an epoch millisecond timestamp relative to `now`
pub fn validate_timestamp(timestamp: u64, now: u64) -> Result<(), ValidationError> {
    if timestamp == 0 {
        return Err(ValidationError::ZeroTimestamp);
    }
    if timestamp < now && now - timestamp > MAX_TIMESTAMP_PAST_AGE_MS {
        return Err(ValidationError::TimestampTooOld {
            timestamp,
            max_ms: MAX_TIMESTAMP_PAST_AGE_MS,
        });
    }
    if timestamp > now && timestamp - now > MAX_TIMESTAMP_FUTURE_AGE_MS {
        return Err(ValidationError::TimestampInFuture {
            timestamp,
            max_ms: MAX_TIMESTAMP_FUTURE_AGE_MS,
        });
    }
    Ok(())
}

pub fn validate_meta_key(key: &str) -> Result<(), ValidationError> {
    if RESERVED_META_KEYS.contains(&key) {
        return Err(ValidationError::ReservedMetaKey(key.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;
    const HOUR_MS: u64 = 60 * 60 * 1000;
    const NOW: u64 = 1_700_000_000_000;

    fn set(pairs: &[(&str, &str)]) -> DimensionSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn namespaces() {
        assert!(validate_namespace("My.App-1").is_ok());
        assert!(validate_namespace("a_b#c:d/e").is_ok());
        assert_eq!(validate_namespace(""), Err(ValidationError::EmptyNamespace));
        assert_eq!(
            validate_namespace(&"a".repeat(257)),
            Err(ValidationError::NamespaceTooLong { len: 257, max: 256 })
        );
        assert!(validate_namespace(&"a".repeat(256)).is_ok());
        assert!(matches!(
            validate_namespace("spaces are bad"),
            Err(ValidationError::InvalidNamespace(_))
        ));
        assert!(validate_namespace("naïve").is_err());
    }

    #[test]
    fn dimension_set_at_limits_is_valid() {
        let mut dimensions = DimensionSet::new();
        for i in 0..MAX_DIMENSION_SET_SIZE {
            dimensions.insert(format!("{i:0>250}"), "v".repeat(1024));
        }
        assert!(validate_dimension_set(&dimensions).is_ok());

        dimensions.insert("one_too_many".into(), "v".into());
        assert_eq!(
            validate_dimension_set(&dimensions),
            Err(ValidationError::TooManyDimensions { count: 31, max: 30 })
        );
    }

    #[test]
    fn dimension_set_violations() {
        assert_eq!(
            validate_dimension_set(&set(&[("Région", "eu")])),
            Err(ValidationError::NonAsciiDimensionKey("Région".into()))
        );
        assert!(matches!(
            validate_dimension_set(&set(&[("Region", "éu")])),
            Err(ValidationError::NonAsciiDimensionValue(_))
        ));
        assert_eq!(
            validate_dimension_set(&set(&[("  ", "value")])),
            Err(ValidationError::EmptyDimensionKey)
        );
        assert_eq!(
            validate_dimension_set(&set(&[("Key", "   ")])),
            Err(ValidationError::EmptyDimensionValue("Key".into()))
        );
        assert!(matches!(
            validate_dimension_set(&set(&[(&"k".repeat(251), "v")])),
            Err(ValidationError::DimensionKeyTooLong { .. })
        ));
        assert!(matches!(
            validate_dimension_set(&set(&[("k", &"v".repeat(1025))])),
            Err(ValidationError::DimensionValueTooLong { .. })
        ));
        assert_eq!(
            validate_dimension_set(&set(&[(":Key", "v")])),
            Err(ValidationError::DimensionKeyStartsWithColon(":Key".into()))
        );
    }

    #[test]
    fn dimension_values_are_trimmed_before_length_check() {
        let padded = format!("  {}  ", "v".repeat(1024));
        assert!(validate_dimension_set(&set(&[("k", &padded)])).is_ok());
    }

    #[test]
    fn metric_names_and_resolutions() {
        let mut resolutions = HashMap::new();
        assert!(validate_metric("Latency", StorageResolution::High, &resolutions).is_ok());
        assert_eq!(
            validate_metric(" \t", StorageResolution::Standard, &resolutions),
            Err(ValidationError::EmptyMetricName)
        );
        assert!(matches!(
            validate_metric(&"m".repeat(1025), StorageResolution::Standard, &resolutions),
            Err(ValidationError::MetricNameTooLong { .. })
        ));

        resolutions.insert("Latency".to_owned(), StorageResolution::High);
        assert!(validate_metric("Latency", StorageResolution::High, &resolutions).is_ok());
        assert_eq!(
            validate_metric("Latency", StorageResolution::Standard, &resolutions),
            Err(ValidationError::ConflictingStorageResolution("Latency".into()))
        );
    }

    #[test]
    fn metric_values() {
        assert!(validate_value("m", 0.0).is_ok());
        assert!(validate_value("m", -1.5e18).is_ok());
        assert!(validate_value("m", 9.223372036854776e18).is_ok());
        assert!(validate_value("m", f64::NAN).is_err());
        assert!(validate_value("m", f64::INFINITY).is_err());
        assert!(validate_value("m", f64::NEG_INFINITY).is_err());
        assert!(validate_value("m", 1e19).is_err());
        assert!(validate_value("m", -1e19).is_err());
    }

    #[test]
    fn timestamps() {
        assert_eq!(validate_timestamp(0, NOW), Err(ValidationError::ZeroTimestamp));
        assert!(validate_timestamp(NOW, NOW).is_ok());
        assert!(validate_timestamp(NOW - DAY_MS, NOW).is_ok());
        assert!(validate_timestamp(NOW + HOUR_MS, NOW).is_ok());
        assert!(matches!(
            validate_timestamp(NOW - 15 * DAY_MS, NOW),
            Err(ValidationError::TimestampTooOld { .. })
        ));
        assert!(matches!(
            validate_timestamp(NOW + 3 * HOUR_MS, NOW),
            Err(ValidationError::TimestampInFuture { .. })
        ));
    }

    #[test]
    fn meta_keys() {
        assert!(validate_meta_key("LogGroupName").is_ok());
        assert_eq!(
            validate_meta_key("Timestamp"),
            Err(ValidationError::ReservedMetaKey("Timestamp".into()))
        );
        assert!(validate_meta_key("CloudWatchMetrics").is_err());
    }
}
