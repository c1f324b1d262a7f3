//! # EMF
//!
//! Helpers for serializing CloudWatch Embedded Metrics via serde_json
//!
//! <https://docs.aws.amazon.com/AmazonCloudWatch/latest/monitoring/CloudWatch_Embedded_Metric_Format_Specification.html>

use super::units::Unit;
use serde::Serialize;
use serde_json::value::Value;
use std::collections::BTreeMap;

/// One EMF log event
///
/// Properties, dimension values and metric values are flattened into the top level and meta into
/// `_aws`, the layout CloudWatch reads. There are no nested `Properties`, `Dimensions` or `Meta` keys.
#[derive(Serialize)]
pub struct EmbeddedMetrics<'a> {
    #[serde(rename = "_aws")]
    pub aws: EmbeddedMetricsAws<'a>,
    /// Properties, dimension values and metric values share the top level
    #[serde(flatten)]
    pub fields: BTreeMap<&'a str, Value>,
}

#[derive(Serialize)]
pub struct EmbeddedMetricsAws<'a> {
    #[serde(rename = "Timestamp")]
    pub timestamp: u64,
    // A context only ever has one namespace
    #[serde(rename = "CloudWatchMetrics")]
    pub cloudwatch_metrics: [EmbeddedNamespace<'a>; 1],
    /// Sink supplied metadata such as LogGroupName
    #[serde(flatten)]
    pub meta: &'a BTreeMap<String, Value>,
}

#[derive(Serialize)]
pub struct EmbeddedNamespace<'a> {
    #[serde(rename = "Namespace")]
    pub namespace: &'a str,
    #[serde(rename = "Dimensions")]
    pub dimensions: &'a [Vec<&'a str>],
    #[serde(rename = "Metrics")]
    pub metrics: Vec<EmbeddedMetric<'a>>,
}

#[derive(Serialize)]
pub struct EmbeddedMetric<'a> {
    #[serde(rename = "Name")]
    pub name: &'a str,
    #[serde(rename = "Unit")]
    pub unit: Unit,
    /// Only written for high resolution metrics
    #[serde(rename = "StorageResolution")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_resolution: Option<u64>,
}
