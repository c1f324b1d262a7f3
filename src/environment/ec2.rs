use super::{add_property, agent_sink, off_runtime, PROBE_TIMEOUT, UNKNOWN};
use crate::config::Config;
use crate::context::MetricsContext;
use crate::sink::Sink;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Instance metadata service, link-local on every EC2 instance
pub const INSTANCE_METADATA_HOST: &str = "http://169.254.169.254";

const TOKEN_PATH: &str = "/latest/api/token";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_TTL_SECONDS: &str = "21600";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";

/// Subset of the instance identity document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ec2Metadata {
    pub image_id: String,
    pub availability_zone: String,
    pub private_ip: String,
    pub instance_id: String,
    pub instance_type: String,
}

/// Fetch a session token and then the identity document (IMDSv2)
///
/// Metadata endpoints are link-local, proxies are never used
fn fetch_metadata(base_url: &str, timeout: Duration) -> Result<Ec2Metadata, reqwest::Error> {
    let client = reqwest::blocking::Client::builder().timeout(timeout).no_proxy().build()?;

    let token = client
        .put(format!("{base_url}{TOKEN_PATH}"))
        .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
        .send()?
        .error_for_status()?
        .text()?;

    client
        .get(format!("{base_url}{DOCUMENT_PATH}"))
        .header(TOKEN_HEADER, token)
        .send()?
        .error_for_status()?
        .json()
}

pub struct Ec2Environment {
    config: Arc<Config>,
    base_url: String,
    timeout: Duration,
    metadata: OnceLock<Ec2Metadata>,
    sink: OnceLock<Sink>,
}

impl Ec2Environment {
    pub const TYPE: &'static str = "AWS::EC2::Instance";

    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            base_url: INSTANCE_METADATA_HOST.to_owned(),
            timeout: PROBE_TIMEOUT,
            metadata: OnceLock::new(),
            sink: OnceLock::new(),
        }
    }

    /// Query a different metadata service, e.g. a local stub
    pub fn with_metadata_endpoint(mut self, base_url: impl Into<String>, timeout: Duration) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self.timeout = timeout;
        self
    }

    pub fn metadata(&self) -> Option<&Ec2Metadata> {
        self.metadata.get()
    }

    pub(super) fn probe(&self) -> bool {
        if self.metadata.get().is_some() {
            return true;
        }

        let result = off_runtime(|| fetch_metadata(&self.base_url, self.timeout));
        match result {
            Some(Ok(metadata)) => {
                debug!(instance_id = %metadata.instance_id, "Fetched EC2 instance metadata");
                let _ = self.metadata.set(metadata);
                true
            }
            Some(Err(error)) => {
                debug!(%error, "Unable to fetch EC2 instance metadata");
                false
            }
            None => {
                warn!("EC2 metadata request panicked");
                false
            }
        }
    }

    pub(super) fn name(&self) -> String {
        self.config.service_name.clone().unwrap_or_else(|| UNKNOWN.to_owned())
    }

    /// Only reported as an instance once metadata was retrieved
    pub(super) fn environment_type(&self) -> String {
        match self.metadata.get() {
            Some(_) => Self::TYPE.to_owned(),
            None => UNKNOWN.to_owned(),
        }
    }

    pub(super) fn log_group_name(&self) -> String {
        self.config
            .log_group_name
            .clone()
            .unwrap_or_else(|| format!("{}-metrics", self.name()))
    }

    pub(super) fn configure_context(&self, context: &mut MetricsContext) {
        if let Some(metadata) = self.metadata.get() {
            add_property(context, "imageId", Some(metadata.image_id.as_str()));
            add_property(context, "instanceId", Some(metadata.instance_id.as_str()));
            add_property(context, "instanceType", Some(metadata.instance_type.as_str()));
            add_property(context, "privateIP", Some(metadata.private_ip.as_str()));
            add_property(context, "availabilityZone", Some(metadata.availability_zone.as_str()));
        }
    }

    pub(super) fn sink(&self) -> &Sink {
        self.sink
            .get_or_init(|| agent_sink(&self.config, self.log_group_name(), self.config.agent_endpoint.as_deref()))
    }
}
