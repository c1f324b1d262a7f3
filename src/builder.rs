use super::config::{Config, EnvironmentOverride};
use super::context::{DimensionSet, MetricsContext};
use super::environment::EnvironmentResolver;
use super::error::Error;
use super::logger::MetricsLogger;
use super::validation;
use std::sync::Arc;

/// Builder for the [MetricsLogger]
///
/// Starts from [Config::from_env], every setter overrides the matching setting
///
/// # Example
/// ```no_run
///  let metrics = aws_embedded_metrics::Builder::new()
///      .namespace("MyApplication")
///      .service_name("Orders")
///      .build()
///      .unwrap();
/// ```
pub struct Builder {
    config: Config,
    dimensions: DimensionSet,
    flush_preserve_dimensions: bool,
    resolver: Option<Arc<EnvironmentResolver>>,
    #[cfg(feature = "lambda")]
    lambda: super::lambda::LambdaOptions,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::with_config(Config::from_env())
    }

    /// Start from an explicit configuration instead of the process environment
    pub fn with_config(config: Config) -> Self {
        Builder {
            config,
            dimensions: DimensionSet::new(),
            flush_preserve_dimensions: true,
            resolver: None,
            #[cfg(feature = "lambda")]
            lambda: Default::default(),
        }
    }

    /// Sets the CloudWatch namespace for all metrics
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.config.service_name = Some(service_name.into());
        self
    }

    pub fn service_type(mut self, service_type: impl Into<String>) -> Self {
        self.config.service_type = Some(service_type.into());
        self
    }

    pub fn log_group_name(mut self, log_group_name: impl Into<String>) -> Self {
        self.config.log_group_name = Some(log_group_name.into());
        self
    }

    pub fn log_stream_name(mut self, log_stream_name: impl Into<String>) -> Self {
        self.config.log_stream_name = Some(log_stream_name.into());
        self
    }

    /// `tcp://host:port` or `udp://host:port` of the CloudWatch agent
    pub fn agent_endpoint(mut self, agent_endpoint: impl Into<String>) -> Self {
        self.config.agent_endpoint = Some(agent_endpoint.into());
        self
    }

    pub fn environment_override(mut self, environment: EnvironmentOverride) -> Self {
        self.config.environment_override = Some(environment);
        self
    }

    /// Adds a static dimension (name, value), that will be sent with each document
    /// * This method can be called multiple times with distinct names
    /// * Counts against the 30 dimensions limit of every dimension set
    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }

    /// Keep dimension sets across flushes, on by default
    pub fn flush_preserve_dimensions(self, preserve: bool) -> Self {
        Self {
            flush_preserve_dimensions: preserve,
            ..self
        }
    }

    /// Share environment detection between loggers, or inject a fixed environment
    pub fn resolver(self, resolver: Arc<EnvironmentResolver>) -> Self {
        Self {
            resolver: Some(resolver),
            ..self
        }
    }

    /// Emits a cold start metric with the given name once to mark a cold start
    ///
    /// This is to mimic the behavior of lambda power tools
    #[cfg(feature = "lambda")]
    pub fn lambda_cold_start_metric(mut self, name: &'static str) -> Self {
        self.lambda.cold_start_metric = Some(name);
        self
    }

    /// Decorates every flush with request_id from the lambda request context as a property
    /// with the given name
    #[cfg(feature = "lambda")]
    pub fn with_lambda_request_id(mut self, name: &'static str) -> Self {
        self.lambda.request_id_property = Some(name);
        self
    }

    /// Decorates every flush with xray_trace_id from the lambda request context as a property
    /// with the given name
    #[cfg(feature = "lambda")]
    pub fn with_lambda_xray_trace_id(mut self, name: &'static str) -> Self {
        self.lambda.xray_trace_id_property = Some(name);
        self
    }

    /// Consume the builder into a logger, the namespace and static dimensions are validated
    pub fn build(self) -> Result<MetricsLogger, Error> {
        validation::validate_namespace(&self.config.namespace)?;
        if !self.dimensions.is_empty() {
            validation::validate_dimension_set(&self.dimensions)?;
        }

        let config = Arc::new(self.config);
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(EnvironmentResolver::new(config.clone())));

        Ok(MetricsLogger::new(
            MetricsContext::with_namespace(config.namespace.clone()),
            resolver,
            config,
            self.dimensions,
            self.flush_preserve_dimensions,
            #[cfg(feature = "lambda")]
            self.lambda,
        ))
    }

    /// Build a logger that lives for the rest of the program, as needed by the
    /// [lambda](super::lambda) helpers
    pub fn init(self) -> Result<&'static MetricsLogger, Error> {
        Ok(Box::leak(Box::new(self.build()?)))
    }
}
