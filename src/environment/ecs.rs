use super::{add_property, agent_sink, env_var, off_runtime, PROBE_TIMEOUT, UNKNOWN};
use crate::config::Config;
use crate::context::{DimensionSet, MetricsContext};
use crate::sink::Sink;
use crate::transport::DEFAULT_AGENT_PORT;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONTAINER_METADATA_URI: &str = "ECS_CONTAINER_METADATA_URI";
const FLUENT_HOST: &str = "FLUENT_HOST";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EcsMetadataLabels {
    #[serde(rename = "com.amazonaws.ecs.cluster")]
    pub cluster: String,
    #[serde(rename = "com.amazonaws.ecs.container-name")]
    pub container_name: String,
    #[serde(rename = "com.amazonaws.ecs.task-arn")]
    pub task_arn: String,
    #[serde(rename = "com.amazonaws.ecs.task-definition-family")]
    pub task_definition_family: String,
    #[serde(rename = "com.amazonaws.ecs.task-definition-version")]
    pub task_definition_version: String,
}

/// Subset of the container metadata (v3/v4) document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EcsMetadata {
    pub name: String,
    pub docker_id: String,
    pub docker_name: String,
    pub image: String,
    #[serde(rename = "ImageID")]
    pub image_id: String,
    pub labels: EcsMetadataLabels,
    pub created_at: String,
    pub started_at: String,
}

impl EcsMetadata {
    /// Image name without its repository, `repo/app:1.0` gives `app:1.0`
    pub fn image_name(&self) -> Option<&str> {
        match self.image.rsplit('/').next() {
            Some(name) if !name.is_empty() => Some(name),
            _ => None,
        }
    }
}

fn fetch_metadata(uri: &str, timeout: Duration) -> Result<EcsMetadata, reqwest::Error> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()?
        .get(uri)
        .send()?
        .error_for_status()?
        .json()
}

/// A container on ECS, optionally shipping logs through a FireLens (Fluent Bit) sidecar
pub struct EcsEnvironment {
    config: Arc<Config>,
    timeout: Duration,
    metadata: OnceLock<EcsMetadata>,
    fluent_bit_endpoint: OnceLock<String>,
    sink: OnceLock<Sink>,
}

impl EcsEnvironment {
    pub const TYPE: &'static str = "AWS::ECS::Container";

    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            timeout: PROBE_TIMEOUT,
            metadata: OnceLock::new(),
            fluent_bit_endpoint: OnceLock::new(),
            sink: OnceLock::new(),
        }
    }

    pub fn metadata(&self) -> Option<&EcsMetadata> {
        self.metadata.get()
    }

    /// Set when `FLUENT_HOST` pointed at a sidecar and no agent endpoint was configured
    pub fn fluent_bit_endpoint(&self) -> Option<&str> {
        self.fluent_bit_endpoint.get().map(String::as_str)
    }

    pub(super) fn probe(&self) -> bool {
        let Some(uri) = env_var(CONTAINER_METADATA_URI) else {
            return false;
        };

        if let Some(host) = env_var(FLUENT_HOST) {
            if self.config.agent_endpoint.is_none() {
                let endpoint = format!("tcp://{host}:{DEFAULT_AGENT_PORT}");
                info!(%endpoint, "Using FireLens sidecar as the agent endpoint");
                let _ = self.fluent_bit_endpoint.set(endpoint);
            }
        }

        match off_runtime(|| fetch_metadata(&uri, self.timeout)) {
            Some(Ok(metadata)) => {
                debug!(name = %metadata.name, "Fetched ECS container metadata");
                let _ = self.metadata.set(metadata);
                true
            }
            Some(Err(error)) => {
                warn!(%uri, %error, "Failed to collect ECS container metadata");
                false
            }
            None => {
                warn!(%uri, "ECS metadata request panicked");
                false
            }
        }
    }

    pub(super) fn name(&self) -> String {
        if let Some(service_name) = &self.config.service_name {
            return service_name.clone();
        }
        self.metadata
            .get()
            .and_then(EcsMetadata::image_name)
            .unwrap_or(UNKNOWN)
            .to_owned()
    }

    /// Empty with a FireLens sidecar, which routes logs itself
    pub(super) fn log_group_name(&self) -> String {
        if self.fluent_bit_endpoint.get().is_some() {
            return String::new();
        }
        self.config
            .log_group_name
            .clone()
            .unwrap_or_else(|| format!("{}-metrics", self.name()))
    }

    pub(super) fn configure_context(&self, context: &mut MetricsContext) {
        add_property(context, "containerId", env_var("HOSTNAME").as_deref());

        if let Some(metadata) = self.metadata.get() {
            add_property(context, "createdAt", Some(metadata.created_at.as_str()));
            add_property(context, "startedAt", Some(metadata.started_at.as_str()));
            add_property(context, "image", Some(metadata.image.as_str()));
            add_property(context, "cluster", Some(metadata.labels.cluster.as_str()));
            add_property(context, "taskArn", Some(metadata.labels.task_arn.as_str()));
        }

        // Without a log group the sidecar needs the identity as dimensions
        if self.fluent_bit_endpoint.get().is_some() {
            context.set_default_dimensions(DimensionSet::from([
                ("ServiceName".to_owned(), self.name()),
                ("ServiceType".to_owned(), Self::TYPE.to_owned()),
            ]));
        }
    }

    pub(super) fn sink(&self) -> &Sink {
        self.sink.get_or_init(|| {
            let endpoint = self
                .config
                .agent_endpoint
                .as_deref()
                .or_else(|| self.fluent_bit_endpoint.get().map(String::as_str));
            agent_sink(&self.config, self.log_group_name(), endpoint)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::transport::Protocol;
    use rusty_fork::rusty_fork_test;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const METADATA: &str = r#"{
        "DockerId": "43481a6ce4842eec8fe72fc28500c6b52edcc0917f105b83379f88cac1ff3946",
        "Name": "nginx-curl",
        "DockerName": "ecs-nginx-5-nginx-curl-ccccb9f49db0dfe0d901",
        "Image": "nrdlngr/nginx-curl",
        "ImageID": "sha256:2e00ae64383cfc865ba0a2ba37f61b50a120d2d9378559dcd458dc0de47bc165",
        "Labels": {
            "com.amazonaws.ecs.cluster": "default",
            "com.amazonaws.ecs.container-name": "nginx-curl",
            "com.amazonaws.ecs.task-arn": "arn:aws:ecs:us-east-2:012345678910:task/9781c248-0edd-4cdb-9a93-f63cb662a5d3",
            "com.amazonaws.ecs.task-definition-family": "nginx",
            "com.amazonaws.ecs.task-definition-version": "5"
        },
        "CreatedAt": "2018-02-01T20:55:10.554941919Z",
        "StartedAt": "2018-02-01T20:55:11.064236631Z",
        "Networks": [{"NetworkMode": "awsvpc", "IPv4Addresses": ["10.0.2.106"]}]
    }"#;

    /// Serve the container metadata document and point the probe at it
    async fn metadata_endpoint() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(METADATA, "application/json"))
            .mount(&server)
            .await;
        std::env::set_var("ECS_CONTAINER_METADATA_URI", format!("{}/v3", server.uri()));
        server
    }

    #[test]
    fn image_names() {
        let metadata = |image: &str| EcsMetadata {
            image: image.to_owned(),
            ..EcsMetadata::default()
        };
        assert_eq!(metadata("nrdlngr/nginx-curl").image_name(), Some("nginx-curl"));
        assert_eq!(
            metadata("123.dkr.ecr.us-west-2.amazonaws.com/team/app:1.0").image_name(),
            Some("app:1.0")
        );
        assert_eq!(metadata("app").image_name(), Some("app"));
        assert_eq!(metadata("").image_name(), None);
    }

    #[test]
    fn probe_without_metadata_uri() {
        let ecs = EcsEnvironment::new(Arc::new(Config::default()));
        assert!(!ecs.probe());
        assert_eq!(ecs.name(), "Unknown");
        assert_eq!(ecs.log_group_name(), "Unknown-metrics");
        assert_eq!(ecs.sink().name(), "AgentSink");
    }

    rusty_fork_test! {
        #[test]
        fn probe_reads_container_metadata() {
            std::env::set_var("HOSTNAME", "abc123");
            let environment = crate::test::block_on(async {
                let _server = metadata_endpoint().await;
                let environment = Environment::Ecs(EcsEnvironment::new(Arc::new(Config::default())));
                tokio::task::spawn_blocking(move || {
                    assert!(environment.probe());
                    environment
                })
                .await
                .unwrap()
            });

            assert_eq!(environment.name(), "nginx-curl");
            assert_eq!(environment.environment_type(), "AWS::ECS::Container");
            assert_eq!(environment.log_group_name(), "nginx-curl-metrics");

            let mut context = MetricsContext::default();
            environment.configure_context(&mut context);
            let properties = context.properties();
            assert_eq!(properties["containerId"], "abc123");
            assert_eq!(properties["createdAt"], "2018-02-01T20:55:10.554941919Z");
            assert_eq!(properties["startedAt"], "2018-02-01T20:55:11.064236631Z");
            assert_eq!(properties["image"], "nrdlngr/nginx-curl");
            assert_eq!(properties["cluster"], "default");
            assert!(properties["taskArn"].starts_with("arn:aws:ecs:"));
            assert!(context.default_dimensions().is_none());
        }

        #[test]
        fn fluent_bit_sidecar() {
            std::env::set_var("FLUENT_HOST", "10.0.0.5");
            let ecs = crate::test::block_on(async {
                let _server = metadata_endpoint().await;
                let ecs = EcsEnvironment::new(Arc::new(Config::default()));
                tokio::task::spawn_blocking(move || {
                    assert!(ecs.probe());
                    ecs
                })
                .await
                .unwrap()
            });
            assert_eq!(ecs.fluent_bit_endpoint(), Some("tcp://10.0.0.5:25888"));
            assert_eq!(ecs.log_group_name(), "");

            let mut context = MetricsContext::default();
            ecs.configure_context(&mut context);
            assert_eq!(
                context.default_dimensions(),
                Some(&DimensionSet::from([
                    ("ServiceName".to_owned(), "nginx-curl".to_owned()),
                    ("ServiceType".to_owned(), "AWS::ECS::Container".to_owned()),
                ]))
            );

            let Sink::Agent(sink) = ecs.sink() else {
                panic!("expected an agent sink");
            };
            assert_eq!(sink.endpoint().host, "10.0.0.5");
            assert_eq!(sink.endpoint().protocol, Protocol::Tcp);
            assert_eq!(ecs.sink().log_group_name(), None);
        }

        #[test]
        fn configured_agent_endpoint_beats_fluent_host() {
            std::env::set_var("ECS_CONTAINER_METADATA_URI", "http://127.0.0.1:1/v3");
            std::env::set_var("FLUENT_HOST", "10.0.0.5");

            let config = Config {
                agent_endpoint: Some("udp://127.0.0.1:4000".into()),
                ..Config::default()
            };
            let ecs = EcsEnvironment::new(Arc::new(config));
            assert!(!ecs.probe());
            assert_eq!(ecs.fluent_bit_endpoint(), None);

            let Sink::Agent(sink) = ecs.sink() else {
                panic!("expected an agent sink");
            };
            assert_eq!(sink.endpoint().protocol, Protocol::Udp);
            assert_eq!(sink.endpoint().port, 4000);
        }
    }
}
