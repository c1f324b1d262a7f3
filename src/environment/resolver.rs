use super::{DefaultEnvironment, Ec2Environment, EcsEnvironment, Environment, LambdaEnvironment, LocalEnvironment};
use crate::config::{Config, EnvironmentOverride};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Detects the hosting environment once and hands the result to every flush
///
/// Detection runs under the lock, so concurrent first flushes wait for a single probe
/// sequence instead of racing their own.
pub struct EnvironmentResolver {
    config: Arc<Config>,
    resolved: Mutex<Option<Arc<Environment>>>,
}

impl EnvironmentResolver {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            resolved: Mutex::new(None),
        }
    }

    /// A resolver that skips detection and always returns `environment`
    pub fn fixed(config: Arc<Config>, environment: Environment) -> Self {
        Self {
            config,
            resolved: Mutex::new(Some(Arc::new(environment))),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn resolve(&self) -> Arc<Environment> {
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(environment) = resolved.as_ref() {
            return environment.clone();
        }

        let environment = Arc::new(self.detect());
        info!(environment = environment.kind(), "Resolved environment");
        *resolved = Some(environment.clone());
        environment
    }

    /// Forget the cached environment, the next [resolve](Self::resolve) detects again
    pub fn reset(&self) {
        *self.resolved.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn detect(&self) -> Environment {
        if let Some(environment_override) = self.config.environment_override {
            debug!(%environment_override, "Environment override supplied");
            return self.from_override(environment_override);
        }

        let lambda = Environment::Lambda(LambdaEnvironment::new());
        if lambda.probe() {
            return lambda;
        }

        let ecs = Environment::Ecs(EcsEnvironment::new(self.config.clone()));
        if ecs.probe() {
            return ecs;
        }

        let ec2 = Environment::Ec2(Ec2Environment::new(self.config.clone()));
        if ec2.probe() {
            return ec2;
        }

        debug!("No environment detected, using the default agent environment");
        Environment::Default(DefaultEnvironment::new(self.config.clone()))
    }

    fn from_override(&self, environment_override: EnvironmentOverride) -> Environment {
        let config = self.config.clone();
        match environment_override {
            EnvironmentOverride::Local => Environment::Local(LocalEnvironment::new(config)),
            EnvironmentOverride::Lambda => Environment::Lambda(LambdaEnvironment::new()),
            EnvironmentOverride::Agent => Environment::Default(DefaultEnvironment::new(config)),
            EnvironmentOverride::Ec2 => Environment::Ec2(Ec2Environment::new(config)),
            EnvironmentOverride::Ecs => {
                // Metadata and the sidecar endpoint are still wanted when forced
                let ecs = EcsEnvironment::new(config);
                ecs.probe();
                Environment::Ecs(ecs)
            }
        }
    }
}
