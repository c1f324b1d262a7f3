//! # aws_embedded_metrics
//!
//! Client for the CloudWatch [Embedded Metric Format](https://docs.aws.amazon.com/AmazonCloudWatch/latest/monitoring/CloudWatch_Embedded_Metric_Format_Specification.html)
//!
//! Metrics, dimensions and properties accumulate in a [MetricsLogger] and are written as
//! structured log documents on [flush](MetricsLogger::flush). The hosting environment (Lambda,
//! ECS, EC2 or a plain host running the CloudWatch agent) is detected on first flush and
//! decides whether documents go to stdout or to the agent over TCP/UDP.
//!
//! ```no_run
//! use aws_embedded_metrics::{Builder, DimensionSet, Unit};
//!
//! let metrics = Builder::new().namespace("MyApplication").build().unwrap();
//!
//! metrics
//!     .put_dimensions(DimensionSet::from([("Operation".to_owned(), "GetItem".to_owned())]))
//!     .unwrap()
//!     .put_metric("Latency", 12.0, Unit::Milliseconds)
//!     .unwrap()
//!     .set_property("RequestId", "ABC123");
//!
//! metrics.flush().unwrap();
//! ```
//!
//! Settings come from `AWS_EMF_*` environment variables, see [Config]

pub use {
    builder::Builder,
    config::{Config, EnvironmentOverride},
    context::{DimensionSet, MetricValues, MetricsContext, DEFAULT_NAMESPACE},
    environment::{Environment, EnvironmentResolver},
    error::{Error, ValidationError},
    logger::MetricsLogger,
    sink::{AgentSink, ConsoleSink, Sink},
    transport::{Endpoint, Protocol},
    units::{StorageResolution, Unit},
};

mod builder;
pub mod config;
mod context;
mod emf;
pub mod environment;
mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
mod logger;
pub mod serializer;
mod sink;
pub mod transport;
mod units;
pub mod validation;
