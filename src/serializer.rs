//! # Serializer
//!
//! Packs a [MetricsContext] into as few EMF documents as the format limits allow
//!
//! Metrics with the most samples left are placed first. A document closes once it holds
//! [MAX_METRICS_PER_EVENT] metric definitions or nothing is left to place, and a metric
//! contributes at most [MAX_VALUES_PER_METRIC] samples to any one document.

use super::context::{MetricValues, MetricsContext};
use super::emf;
use super::error::Error;
use super::units::StorageResolution;
use super::validation::MAX_DIMENSION_SET_SIZE;
use serde_json::value::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

/// The Embedded Metric Format supports a maximum of 100 metrics per document
pub const MAX_METRICS_PER_EVENT: usize = 100;

/// The Embedded Metric Format supports a maximum of 100 values per key
pub const MAX_VALUES_PER_METRIC: usize = 100;

/// Everything that repeats in each document of one context
struct Envelope<'a> {
    namespace: &'a str,
    timestamp: u64,
    meta: &'a BTreeMap<String, Value>,
    dimensions: &'a [Vec<&'a str>],
    fields: &'a BTreeMap<&'a str, Value>,
}

#[derive(Default)]
struct Batch<'a> {
    metrics: Vec<emf::EmbeddedMetric<'a>>,
    values: BTreeMap<&'a str, Value>,
}

impl<'a> Batch<'a> {
    fn push(&mut self, name: &'a str, metric: &MetricValues, value: Value) {
        self.metrics.push(emf::EmbeddedMetric {
            name,
            unit: metric.unit,
            storage_resolution: (metric.storage_resolution == StorageResolution::High)
                .then(|| metric.storage_resolution.seconds()),
        });
        self.values.insert(name, value);
    }

    fn len(&self) -> usize {
        self.metrics.len()
    }
}

impl<'a> Envelope<'a> {
    fn render(&self, batch: Batch<'a>) -> Result<String, serde_json::Error> {
        let mut fields = self.fields.clone();
        fields.extend(batch.values);

        let document = emf::EmbeddedMetrics {
            aws: emf::EmbeddedMetricsAws {
                timestamp: self.timestamp,
                cloudwatch_metrics: [emf::EmbeddedNamespace {
                    namespace: self.namespace,
                    dimensions: self.dimensions,
                    metrics: batch.metrics,
                }],
                meta: self.meta,
            },
            fields,
        };

        serde_json::to_string(&document)
    }
}

/// Serialize a context into one or more EMF documents, without trailing newlines
///
/// Fails without producing anything if a dimension set, defaults included, is larger
/// than CloudWatch allows. A context without metrics still yields one document.
pub fn serialize(context: &MetricsContext) -> Result<Vec<String>, Error> {
    let dimension_sets = context.dimensions();

    let mut dimension_keys = Vec::with_capacity(dimension_sets.len());
    let mut fields: BTreeMap<&str, Value> = context
        .properties()
        .iter()
        .map(|(key, value)| (key.as_str(), Value::from(value.as_str())))
        .collect();

    for dimension_set in &dimension_sets {
        if dimension_set.len() > MAX_DIMENSION_SET_SIZE {
            return Err(Error::DimensionSetTooLarge {
                size: dimension_set.len(),
                max: MAX_DIMENSION_SET_SIZE,
            });
        }
        dimension_keys.push(dimension_set.keys().map(String::as_str).collect::<Vec<_>>());
        for (key, value) in dimension_set {
            fields.insert(key, Value::from(value.as_str()));
        }
    }

    let envelope = Envelope {
        namespace: context.namespace(),
        timestamp: context.timestamp(),
        meta: context.meta(),
        dimensions: &dimension_keys,
        fields: &fields,
    };

    let metrics: Vec<(&str, &MetricValues)> = context
        .metrics()
        .iter()
        .map(|(name, metric)| (name.as_str(), metric))
        .collect();

    // (samples left, Reverse(index)) so ties go to the earlier name
    let mut remaining: BinaryHeap<(usize, Reverse<usize>)> = metrics
        .iter()
        .enumerate()
        .map(|(index, (_, metric))| (metric.values.len(), Reverse(index)))
        .collect();
    // Metrics already placed in the open document wait here until it closes
    let mut deferred = Vec::new();

    let mut documents = Vec::new();
    let mut batch = Batch::default();

    while let Some((left, Reverse(index))) = remaining.pop() {
        let (name, metric) = metrics[index];
        let start = metric.values.len() - left;
        let end = (start + MAX_VALUES_PER_METRIC).min(metric.values.len());

        let value = if left == 1 {
            Value::from(metric.values[start])
        } else {
            Value::from(&metric.values[start..end])
        };
        batch.push(name, metric, value);

        if left > MAX_VALUES_PER_METRIC {
            deferred.push((left - MAX_VALUES_PER_METRIC, Reverse(index)));
        }

        if batch.len() == MAX_METRICS_PER_EVENT || remaining.is_empty() {
            documents.push(envelope.render(std::mem::take(&mut batch))?);
            remaining.extend(deferred.drain(..));
        }
    }

    if documents.is_empty() {
        documents.push(envelope.render(batch)?);
    }

    Ok(documents)
}
