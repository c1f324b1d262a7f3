//! # Environment
//!
//! Detection of the hosting environment, which decides naming, default dimensions and the
//! sink metrics are delivered to
//!
//! | environment | detected by | sink |
//! |---|---|---|
//! | [Lambda](Environment::Lambda) | `AWS_LAMBDA_FUNCTION_NAME` | console |
//! | [ECS](Environment::Ecs) | `ECS_CONTAINER_METADATA_URI` and its metadata document | agent |
//! | [EC2](Environment::Ec2) | instance metadata service | agent |
//! | [Local](Environment::Local) | override only | console |
//! | [Default](Environment::Default) | fallback, or the `Agent` override | agent |

use super::config::Config;
use super::context::MetricsContext;
use super::sink::{AgentSink, ConsoleSink, Sink};
use super::transport::Endpoint;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

mod ec2;
mod ecs;
mod resolver;

pub use ec2::{Ec2Environment, Ec2Metadata};
pub use ecs::{EcsEnvironment, EcsMetadata, EcsMetadataLabels};
pub use resolver::EnvironmentResolver;

const UNKNOWN: &str = "Unknown";

/// Timeout for each metadata request made while probing
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

const LAMBDA_FUNCTION_NAME: &str = "AWS_LAMBDA_FUNCTION_NAME";

/// Read an environment variable, treating empty as unset
pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Run a blocking metadata request on its own thread
///
/// reqwest's blocking client must not run on an async runtime thread, and detection
/// can be triggered from inside a Lambda handler
pub(crate) fn off_runtime<T: Send>(request: impl FnOnce() -> T + Send) -> Option<T> {
    thread::scope(|scope| scope.spawn(request).join().ok())
}

fn agent_sink(config: &Config, log_group_name: String, endpoint: Option<&str>) -> Sink {
    let endpoint = Endpoint::parse(endpoint.unwrap_or_default());
    Sink::Agent(AgentSink::new(
        Some(log_group_name),
        config.log_stream_name.clone(),
        endpoint,
    ))
}

pub enum Environment {
    Lambda(LambdaEnvironment),
    Ecs(EcsEnvironment),
    Ec2(Ec2Environment),
    Local(LocalEnvironment),
    Default(DefaultEnvironment),
}

impl Environment {
    /// Short label used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Environment::Lambda(_) => "Lambda",
            Environment::Ecs(_) => "ECS",
            Environment::Ec2(_) => "EC2",
            Environment::Local(_) => "Local",
            Environment::Default(_) => "Agent",
        }
    }

    /// Whether the process runs in this environment, may perform network I/O
    pub fn probe(&self) -> bool {
        match self {
            Environment::Lambda(environment) => environment.probe(),
            Environment::Ecs(environment) => environment.probe(),
            Environment::Ec2(environment) => environment.probe(),
            Environment::Local(_) => false,
            Environment::Default(_) => true,
        }
    }

    /// Service name used for the `ServiceName` default dimension
    pub fn name(&self) -> String {
        match self {
            Environment::Lambda(environment) => environment.name(),
            Environment::Ecs(environment) => environment.name(),
            Environment::Ec2(environment) => environment.name(),
            Environment::Local(environment) => environment.name(),
            Environment::Default(environment) => environment.name(),
        }
    }

    /// Service type used for the `ServiceType` default dimension
    pub fn environment_type(&self) -> String {
        match self {
            Environment::Lambda(_) => LambdaEnvironment::TYPE.to_owned(),
            Environment::Ecs(_) => EcsEnvironment::TYPE.to_owned(),
            Environment::Ec2(environment) => environment.environment_type(),
            Environment::Local(environment) => environment.environment_type(),
            Environment::Default(environment) => environment.environment_type(),
        }
    }

    /// Empty when something else owns log routing, e.g. a FireLens sidecar on ECS
    pub fn log_group_name(&self) -> String {
        match self {
            Environment::Lambda(environment) => environment.name(),
            Environment::Ecs(environment) => environment.log_group_name(),
            Environment::Ec2(environment) => environment.log_group_name(),
            Environment::Local(environment) => environment.log_group_name(),
            Environment::Default(environment) => environment.log_group_name(),
        }
    }

    /// Add environment specific properties (and for ECS with FireLens, dimensions)
    pub fn configure_context(&self, context: &mut MetricsContext) {
        match self {
            Environment::Lambda(environment) => environment.configure_context(context),
            Environment::Ecs(environment) => environment.configure_context(context),
            Environment::Ec2(environment) => environment.configure_context(context),
            Environment::Local(_) | Environment::Default(_) => {}
        }
    }

    /// The sink for this environment, created on first use and reused afterwards
    pub fn sink(&self) -> &Sink {
        match self {
            Environment::Lambda(environment) => environment.sink(),
            Environment::Ecs(environment) => environment.sink(),
            Environment::Ec2(environment) => environment.sink(),
            Environment::Local(environment) => environment.sink(),
            Environment::Default(environment) => environment.sink(),
        }
    }
}

/// Set a property only when the value is known
fn add_property(context: &mut MetricsContext, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        context.set_property(key, value);
    }
}

/// AWS Lambda, detected from the runtime's environment variables
#[derive(Default)]
pub struct LambdaEnvironment {
    sink: OnceLock<Sink>,
}

impl LambdaEnvironment {
    pub const TYPE: &'static str = "AWS::Lambda::Function";

    pub fn new() -> Self {
        Self::default()
    }

    /// Use a pre-built sink instead of stdout
    pub fn with_sink(sink: Sink) -> Self {
        Self {
            sink: OnceLock::from(sink),
        }
    }

    fn probe(&self) -> bool {
        env_var(LAMBDA_FUNCTION_NAME).is_some()
    }

    fn name(&self) -> String {
        env_var(LAMBDA_FUNCTION_NAME).unwrap_or_else(|| UNKNOWN.to_owned())
    }

    fn configure_context(&self, context: &mut MetricsContext) {
        add_property(context, "executionEnvironment", env_var("AWS_EXECUTION_ENV").as_deref());
        add_property(context, "memorySize", env_var("AWS_LAMBDA_FUNCTION_MEMORY_SIZE").as_deref());
        add_property(context, "functionVersion", env_var("AWS_LAMBDA_FUNCTION_VERSION").as_deref());
        add_property(context, "logStreamId", env_var("AWS_LAMBDA_LOG_STREAM_NAME").as_deref());

        // Only sampled traces are worth linking
        let trace_id = env_var("_X_AMZN_TRACE_ID").filter(|trace| trace.contains("Sampled=1"));
        add_property(context, "traceId", trace_id.as_deref());
    }

    fn sink(&self) -> &Sink {
        self.sink.get_or_init(|| Sink::Console(ConsoleSink::new()))
    }
}

/// Local development, only selected through the `Local` override
pub struct LocalEnvironment {
    config: Arc<Config>,
    sink: OnceLock<Sink>,
}

impl LocalEnvironment {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            sink: OnceLock::new(),
        }
    }

    /// Use a pre-built sink instead of stdout
    pub fn with_sink(config: Arc<Config>, sink: Sink) -> Self {
        Self {
            config,
            sink: OnceLock::from(sink),
        }
    }

    fn name(&self) -> String {
        self.config.service_name.clone().unwrap_or_else(|| UNKNOWN.to_owned())
    }

    fn environment_type(&self) -> String {
        self.config.service_type.clone().unwrap_or_else(|| UNKNOWN.to_owned())
    }

    fn log_group_name(&self) -> String {
        self.config
            .log_group_name
            .clone()
            .unwrap_or_else(|| format!("{}-metrics", self.name()))
    }

    fn sink(&self) -> &Sink {
        self.sink.get_or_init(|| Sink::Console(ConsoleSink::new()))
    }
}

/// Any host running the CloudWatch agent, the fallback when nothing else matched
pub struct DefaultEnvironment {
    config: Arc<Config>,
    sink: OnceLock<Sink>,
}

impl DefaultEnvironment {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            sink: OnceLock::new(),
        }
    }

    fn name(&self) -> String {
        self.config.service_name.clone().unwrap_or_else(|| UNKNOWN.to_owned())
    }

    fn environment_type(&self) -> String {
        self.config.service_type.clone().unwrap_or_else(|| UNKNOWN.to_owned())
    }

    fn log_group_name(&self) -> String {
        self.config
            .log_group_name
            .clone()
            .unwrap_or_else(|| format!("{}-metrics", self.name()))
    }

    fn sink(&self) -> &Sink {
        self.sink
            .get_or_init(|| agent_sink(&self.config, self.log_group_name(), self.config.agent_endpoint.as_deref()))
    }
}
