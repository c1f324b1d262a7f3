//! # Config
//!
//! Settings read from the process environment
//!
//! Every key is looked up with the `AWS_EMF_` prefix first and then without it, so
//! `AWS_EMF_SERVICE_NAME` wins over `SERVICE_NAME`. Empty values count as unset.

use super::context::DEFAULT_NAMESPACE;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

const ENV_VAR_PREFIX: &str = "AWS_EMF";

pub const SERVICE_NAME: &str = "SERVICE_NAME";
pub const SERVICE_TYPE: &str = "SERVICE_TYPE";
pub const LOG_GROUP_NAME: &str = "LOG_GROUP_NAME";
pub const LOG_STREAM_NAME: &str = "LOG_STREAM_NAME";
pub const AGENT_ENDPOINT: &str = "AGENT_ENDPOINT";
pub const ENVIRONMENT_OVERRIDE: &str = "ENVIRONMENT_OVERRIDE";
pub const NAMESPACE: &str = "NAMESPACE";

/// Hosting environments that can be forced instead of detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentOverride {
    Local,
    Lambda,
    Agent,
    Ec2,
    Ecs,
}

impl FromStr for EnvironmentOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(EnvironmentOverride::Local),
            "lambda" => Ok(EnvironmentOverride::Lambda),
            "agent" => Ok(EnvironmentOverride::Agent),
            "ec2" => Ok(EnvironmentOverride::Ec2),
            "ecs" => Ok(EnvironmentOverride::Ecs),
            _ => Err(format!("unknown environment {s:?}")),
        }
    }
}

impl fmt::Display for EnvironmentOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnvironmentOverride::Local => "Local",
            EnvironmentOverride::Lambda => "Lambda",
            EnvironmentOverride::Agent => "Agent",
            EnvironmentOverride::Ec2 => "EC2",
            EnvironmentOverride::Ecs => "ECS",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub service_name: Option<String>,
    pub service_type: Option<String>,
    pub log_group_name: Option<String>,
    pub log_stream_name: Option<String>,
    pub agent_endpoint: Option<String>,
    pub environment_override: Option<EnvironmentOverride>,
    pub namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: None,
            service_type: None,
            log_group_name: None,
            log_stream_name: None,
            agent_endpoint: None,
            environment_override: None,
            namespace: DEFAULT_NAMESPACE.to_owned(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, used with a map in tests
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(&format!("{ENV_VAR_PREFIX}_{key}"))
                .filter(|value| !value.is_empty())
                .or_else(|| lookup(key).filter(|value| !value.is_empty()))
        };

        let environment_override = get(ENVIRONMENT_OVERRIDE).and_then(|value| match value.parse() {
            Ok(environment) => Some(environment),
            Err(error) => {
                warn!(%error, "Invalid environment override, falling back to auto-discovery");
                None
            }
        });

        Self {
            service_name: get(SERVICE_NAME),
            service_type: get(SERVICE_TYPE),
            log_group_name: get(LOG_GROUP_NAME),
            log_stream_name: get(LOG_STREAM_NAME),
            agent_endpoint: get(AGENT_ENDPOINT),
            environment_override,
            namespace: get(NAMESPACE).unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_fork::rusty_fork_test;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        assert_eq!(config(&[]), Config::default());
        assert_eq!(Config::default().namespace, "aws-embedded-metrics");
    }

    #[test]
    fn prefixed_keys_win() {
        let config = config(&[
            ("SERVICE_NAME", "plain"),
            ("AWS_EMF_SERVICE_NAME", "prefixed"),
            ("SERVICE_TYPE", "plain-type"),
            ("AWS_EMF_SERVICE_TYPE", ""),
            ("AWS_EMF_AGENT_ENDPOINT", "udp://127.0.0.1:1234"),
            ("LOG_GROUP_NAME", "group"),
            ("LOG_STREAM_NAME", "stream"),
            ("NAMESPACE", "MyApp"),
        ]);
        assert_eq!(config.service_name.as_deref(), Some("prefixed"));
        assert_eq!(config.service_type.as_deref(), Some("plain-type"));
        assert_eq!(config.agent_endpoint.as_deref(), Some("udp://127.0.0.1:1234"));
        assert_eq!(config.log_group_name.as_deref(), Some("group"));
        assert_eq!(config.log_stream_name.as_deref(), Some("stream"));
        assert_eq!(config.namespace, "MyApp");
    }

    #[test]
    fn environment_overrides() {
        assert_eq!(
            config(&[("AWS_EMF_ENVIRONMENT_OVERRIDE", "ECS")]).environment_override,
            Some(EnvironmentOverride::Ecs)
        );
        assert_eq!(
            config(&[("ENVIRONMENT_OVERRIDE", "lambda")]).environment_override,
            Some(EnvironmentOverride::Lambda)
        );
        assert_eq!(config(&[("ENVIRONMENT_OVERRIDE", "Mainframe")]).environment_override, None);
        assert_eq!(EnvironmentOverride::Ec2.to_string(), "EC2");
    }

    rusty_fork_test! {
        #[test]
        fn reads_the_process_environment() {
            std::env::set_var("AWS_EMF_LOG_GROUP_NAME", "from-env");
            std::env::set_var("AWS_EMF_ENVIRONMENT_OVERRIDE", "Local");
            let config = Config::from_env();
            assert_eq!(config.log_group_name.as_deref(), Some("from-env"));
            assert_eq!(config.environment_override, Some(EnvironmentOverride::Local));
        }
    }
}
