//! Facade bundling the public job-server operations.
//!
//! Mirrors the surface the hosting framework wires up: context creation,
//! deletion, existence checks and job execution against one job-server.
//! Each service instance owns its registry, so tests (and multi-server
//! deployments) can run isolated managers side by side.

use std::sync::Arc;

use crate::client::{HttpJobserverClient, JobserverApi};
use crate::config::JobserverConfig;
use crate::error::ContextError;
use crate::jobs::{JobCoordinator, JobRequest, JobResult};
use crate::manager::ContextManager;
use crate::registry::{ContextRegistry, ContextSpec};

/// Client for one Spark job-server: context lifecycle plus job execution.
pub struct SparkContextService {
    manager: ContextManager,
    coordinator: JobCoordinator,
}

impl SparkContextService {
    /// Connect to a job-server over HTTP.
    pub fn new(config: JobserverConfig) -> Self {
        let client: Arc<dyn JobserverApi> = Arc::new(HttpJobserverClient::new(&config));
        Self::with_client(config, client)
    }

    /// Build the service on top of an injected API implementation.
    pub fn with_client(config: JobserverConfig, api: Arc<dyn JobserverApi>) -> Self {
        let registry = Arc::new(ContextRegistry::new());
        let manager = ContextManager::new(Arc::clone(&api), Arc::clone(&registry));
        let coordinator = JobCoordinator::new(api, registry, &config);
        Self {
            manager,
            coordinator,
        }
    }

    /// Create a named context (idempotent; deduplicates concurrent calls).
    pub async fn create_context(
        &self,
        spec: ContextSpec,
        run_async: bool,
    ) -> Result<bool, ContextError> {
        self.manager.create_context(spec, run_async).await
    }

    /// Delete a named context; unknown names are a no-op success.
    pub async fn delete_context(&self, name: &str) -> Result<bool, ContextError> {
        self.manager.delete_context(name).await
    }

    /// Whether the context exists on the job-server (authoritative).
    pub async fn context_exists(&self, name: &str) -> Result<bool, ContextError> {
        self.manager.context_exists(name).await
    }

    /// Execute a job against a READY context.
    pub async fn execute_job(&self, request: &JobRequest) -> Result<JobResult, ContextError> {
        self.coordinator.execute(request).await
    }

    /// Stop scheduled evictions. Call before dropping the service.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}
