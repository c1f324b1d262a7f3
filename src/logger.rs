//! # Logger
//!
//! Metrics accumulator + emitter returned from [Builder](super::Builder)

use super::config::Config;
use super::context::{DimensionSet, MetricsContext};
use super::environment::{Environment, EnvironmentResolver};
use super::error::{Error, ValidationError};
use super::units::{StorageResolution, Unit};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Embedded CloudWatch metrics logger
///
/// Use [Builder](super::Builder) to construct
///
/// # Example
/// ```no_run
/// use aws_embedded_metrics::{Builder, Unit};
///
/// let metrics = Builder::new()
///     .namespace("MyApplication")
///     .build()
///     .unwrap();
///
/// metrics
///     .set_property("RequestId", "ABC123")
///     .put_metric("Latency", 12.5, Unit::Milliseconds)
///     .unwrap();
///
/// metrics.flush().unwrap();
/// ```
pub struct MetricsLogger {
    context: Mutex<MetricsContext>,
    resolver: Arc<EnvironmentResolver>,
    config: Arc<Config>,
    /// Added to the default dimensions of every flush
    static_dimensions: DimensionSet,
    flush_preserve_dimensions: bool,
    #[cfg(feature = "lambda")]
    pub(crate) lambda: super::lambda::LambdaOptions,
}

impl MetricsLogger {
    pub(crate) fn new(
        context: MetricsContext,
        resolver: Arc<EnvironmentResolver>,
        config: Arc<Config>,
        static_dimensions: DimensionSet,
        flush_preserve_dimensions: bool,
        #[cfg(feature = "lambda")] lambda: super::lambda::LambdaOptions,
    ) -> Self {
        Self {
            context: Mutex::new(context),
            resolver,
            config,
            static_dimensions,
            flush_preserve_dimensions,
            #[cfg(feature = "lambda")]
            lambda,
        }
    }

    fn context(&self) -> MutexGuard<'_, MetricsContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Set a property to emit with the metrics
    /// * Properties only last until the next flush
    /// * Setting a property with same name multiple times will overwrite the previous value
    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.context().set_property(key, value);
        self
    }

    /// Add a dimension set, replacing an existing set with the same keys
    pub fn put_dimensions(&self, dimension_set: DimensionSet) -> Result<&Self, ValidationError> {
        self.context().put_dimensions(dimension_set)?;
        Ok(self)
    }

    /// Replace all dimension sets, `use_default` decides whether the default dimensions
    /// are merged into them
    pub fn set_dimensions(
        &self,
        dimension_sets: Vec<DimensionSet>,
        use_default: bool,
    ) -> Result<&Self, ValidationError> {
        self.context().set_dimensions(dimension_sets, use_default)?;
        Ok(self)
    }

    pub fn reset_dimensions(&self, use_default: bool) -> &Self {
        self.context().reset_dimensions(use_default);
        self
    }

    /// Record a standard resolution sample
    pub fn put_metric(&self, name: impl Into<String>, value: f64, unit: Unit) -> Result<&Self, ValidationError> {
        self.put_metric_with_resolution(name, value, unit, StorageResolution::Standard)
    }

    pub fn put_metric_with_resolution(
        &self,
        name: impl Into<String>,
        value: f64,
        unit: Unit,
        storage_resolution: StorageResolution,
    ) -> Result<&Self, ValidationError> {
        self.context().put_metric(name, value, unit, storage_resolution)?;
        Ok(self)
    }

    pub fn set_namespace(&self, namespace: impl Into<String>) -> Result<&Self, ValidationError> {
        self.context().set_namespace(namespace)?;
        Ok(self)
    }

    /// Pin the timestamp (milliseconds since the epoch) of every following document
    pub fn set_timestamp(&self, timestamp: u64) -> Result<&Self, ValidationError> {
        self.context().set_timestamp(timestamp)?;
        Ok(self)
    }

    /// The detected (or configured) environment, detecting it on first use
    pub fn environment(&self) -> Arc<Environment> {
        self.resolver.resolve()
    }

    /// Serialize and deliver everything recorded since the last flush
    ///
    /// The logger continues with a fresh context whether or not delivery succeeded, a
    /// failed batch is lost.
    pub fn flush(&self) -> Result<(), Error> {
        // Detection may block on the network, keep it outside the lock
        let environment = self.resolver.resolve();

        let mut context = {
            let mut current = self.context();
            let next = current.snapshot(self.flush_preserve_dimensions);
            std::mem::replace(&mut *current, next)
        };

        context.set_default_dimensions(self.default_dimensions(&environment));
        environment.configure_context(&mut context);

        let sink = environment.sink();
        debug!(sink = sink.name(), metrics = context.metrics().len(), "Flushing metrics");
        sink.accept(&mut context)
    }

    fn default_dimensions(&self, environment: &Environment) -> DimensionSet {
        let mut dimensions = DimensionSet::new();

        let log_group_name = environment.log_group_name();
        if !log_group_name.is_empty() {
            dimensions.insert("LogGroup".to_owned(), log_group_name);
        }

        let service_name = self.config.service_name.clone().unwrap_or_else(|| environment.name());
        dimensions.insert("ServiceName".to_owned(), service_name);

        let service_type = self
            .config
            .service_type
            .clone()
            .unwrap_or_else(|| environment.environment_type());
        dimensions.insert("ServiceType".to_owned(), service_type);

        dimensions.extend(self.static_dimensions.iter().map(|(k, v)| (k.clone(), v.clone())));
        dimensions
    }
}
