//! # Context
//!
//! One event worth of metrics, dimensions and properties waiting to be flushed
//!
//! A [MetricsContext] has a single owner and no internal synchronization, the
//! [MetricsLogger](super::MetricsLogger) keeps it behind a mutex and swaps in a
//! [snapshot](MetricsContext::snapshot) on every flush.

use super::error::ValidationError;
use super::units::{StorageResolution, Unit};
use super::validation;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_NAMESPACE: &str = "aws-embedded-metrics";

/// Dimension name to dimension value
pub type DimensionSet = BTreeMap<String, String>;

/// Samples recorded for one metric name
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValues {
    pub values: Vec<f64>,
    pub unit: Unit,
    pub storage_resolution: StorageResolution,
}

#[derive(Debug, Clone)]
pub struct MetricsContext {
    namespace: String,
    properties: BTreeMap<String, String>,
    metrics: BTreeMap<String, MetricValues>,
    meta: BTreeMap<String, Value>,
    dimensions: Vec<DimensionSet>,
    default_dimensions: Option<DimensionSet>,
    use_default_dimensions: bool,
    /// Explicitly set via [MetricsContext::set_timestamp]
    timestamp: Option<u64>,
    created_at: u64,
    resolutions: HashMap<String, StorageResolution>,
}

impl Default for MetricsContext {
    fn default() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }
}

/// Milliseconds since the unix epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Trim surrounding whitespace from every dimension value
fn trimmed(dimension_set: DimensionSet) -> DimensionSet {
    dimension_set
        .into_iter()
        .map(|(key, value)| {
            let value = value.trim().to_owned();
            (key, value)
        })
        .collect()
}

fn same_keys(a: &DimensionSet, b: &DimensionSet) -> bool {
    a.len() == b.len() && a.keys().eq(b.keys())
}

impl MetricsContext {
    /// An empty context, the namespace is not validated here
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            properties: BTreeMap::new(),
            metrics: BTreeMap::new(),
            meta: BTreeMap::new(),
            dimensions: Vec::new(),
            default_dimensions: None,
            use_default_dimensions: true,
            timestamp: None,
            created_at: now_millis(),
            resolutions: HashMap::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<(), ValidationError> {
        let namespace = namespace.into();
        validation::validate_namespace(&namespace)?;
        self.namespace = namespace;
        Ok(())
    }

    /// Properties are free-form and never validated
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Resolved timestamp in epoch milliseconds, the explicit one or the creation time
    pub fn timestamp(&self) -> u64 {
        self.timestamp.unwrap_or(self.created_at)
    }

    pub fn set_timestamp(&mut self, timestamp: u64) -> Result<(), ValidationError> {
        validation::validate_timestamp(timestamp, now_millis())?;
        self.timestamp = Some(timestamp);
        Ok(())
    }

    /// Metadata written into the `_aws` envelope, e.g. the destination log group
    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    /// `Timestamp` and `CloudWatchMetrics` are written by the serializer and cannot be set here,
    /// use [MetricsContext::set_timestamp] for the former
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), ValidationError> {
        let key = key.into();
        validation::validate_meta_key(&key)?;
        self.meta.insert(key, value.into());
        Ok(())
    }

    /// Environment supplied dimensions, merged under every custom dimension set
    pub fn set_default_dimensions(&mut self, dimensions: DimensionSet) {
        self.default_dimensions = Some(dimensions);
    }

    pub fn default_dimensions(&self) -> Option<&DimensionSet> {
        self.default_dimensions.as_ref()
    }

    /// Add a dimension set, replacing any existing set with exactly the same keys
    ///
    /// The new set always ends up last
    pub fn put_dimensions(&mut self, dimension_set: DimensionSet) -> Result<(), ValidationError> {
        validation::validate_dimension_set(&dimension_set)?;
        let dimension_set = trimmed(dimension_set);

        self.dimensions.retain(|existing| !same_keys(existing, &dimension_set));
        self.dimensions.push(dimension_set);
        Ok(())
    }

    /// Replace every custom dimension set, nothing changes if any set is invalid
    pub fn set_dimensions(
        &mut self,
        dimension_sets: Vec<DimensionSet>,
        use_default: bool,
    ) -> Result<(), ValidationError> {
        for dimension_set in &dimension_sets {
            validation::validate_dimension_set(dimension_set)?;
        }
        self.use_default_dimensions = use_default;
        self.dimensions = dimension_sets.into_iter().map(trimmed).collect();
        Ok(())
    }

    pub fn reset_dimensions(&mut self, use_default: bool) {
        self.use_default_dimensions = use_default;
        self.dimensions.clear();
    }

    pub fn uses_default_dimensions(&self) -> bool {
        self.use_default_dimensions
    }

    /// The dimension sets to emit, with the defaults merged in when enabled
    ///
    /// Custom values win over default values on key collisions
    pub fn dimensions(&self) -> Vec<DimensionSet> {
        let defaults = match &self.default_dimensions {
            Some(defaults) if self.use_default_dimensions && !defaults.is_empty() => defaults,
            _ => return self.dimensions.clone(),
        };

        if self.dimensions.is_empty() {
            return vec![defaults.clone()];
        }

        self.dimensions
            .iter()
            .map(|custom| {
                let mut merged = defaults.clone();
                merged.extend(custom.iter().map(|(k, v)| (k.clone(), v.clone())));
                merged
            })
            .collect()
    }

    /// Record a sample, samples for the same name accumulate in call order
    pub fn put_metric(
        &mut self,
        name: impl Into<String>,
        value: f64,
        unit: Unit,
        storage_resolution: StorageResolution,
    ) -> Result<(), ValidationError> {
        let name = name.into();
        validation::validate_metric(&name, storage_resolution, &self.resolutions)?;
        validation::validate_value(&name, value)?;

        self.resolutions.insert(name.clone(), storage_resolution);
        self.metrics
            .entry(name)
            .and_modify(|metric| metric.values.push(value))
            .or_insert_with(|| MetricValues {
                values: vec![value],
                unit,
                storage_resolution,
            });
        Ok(())
    }

    pub fn metrics(&self) -> &BTreeMap<String, MetricValues> {
        &self.metrics
    }

    /// Samples recorded so far for `name`
    pub fn samples(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|metric| metric.values.as_slice())
    }

    /// Build the context for the next flush cycle
    ///
    /// Metrics, properties and metadata always start over. Namespace and an explicit
    /// timestamp carry forward, dimension state only when `preserve_dimensions` is set.
    pub fn snapshot(&self, preserve_dimensions: bool) -> MetricsContext {
        let mut next = MetricsContext::with_namespace(self.namespace.clone());
        next.timestamp = self.timestamp;

        if preserve_dimensions {
            next.dimensions = self.dimensions.clone();
            next.default_dimensions = self.default_dimensions.clone();
            next.use_default_dimensions = self.use_default_dimensions;
        }

        next
    }
}
