//! Job execution against a READY context.
//!
//! The coordinator gates every submission on the registry's view of the
//! target context, then either waits the job out (synchronous mode) or
//! hands back a pending handle (asynchronous mode). Concurrent executions
//! against the same context are independent submissions; scheduling within
//! a shared context is the job-server's business.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{JobStatus, JobStatusReport, JobserverApi};
use crate::config::JobserverConfig;
use crate::error::{ContextError, RemoteError};
use crate::registry::{ContextRegistry, ContextState};

/// One job submission. Transient; built per call.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Application (binary/jar) name registered on the job-server.
    pub app_name: String,
    /// Fully qualified class to run.
    pub class_path: String,
    /// Name of the READY context to run on.
    pub context_name: String,
    /// Opaque job arguments, passed through as the request body.
    pub args: String,
    /// Submit and return immediately instead of waiting for completion.
    pub run_async: bool,
}

impl JobRequest {
    pub fn new(
        app_name: impl Into<String>,
        class_path: impl Into<String>,
        context_name: impl Into<String>,
        args: impl Into<String>,
        run_async: bool,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            class_path: class_path.into(),
            context_name: context_name.into(),
            args: args.into(),
            run_async,
        }
    }
}

/// Outcome of a job execution.
///
/// Asynchronous submissions come back with `success = false` and a
/// `job_id`: the job is pending, not failed, and callers poll the status
/// endpoint for the terminal outcome.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub success: bool,
    pub job_id: Option<String>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// Submits jobs and tracks them to completion in synchronous mode.
pub struct JobCoordinator {
    api: Arc<dyn JobserverApi>,
    registry: Arc<ContextRegistry>,
    sync_timeout: Duration,
    poll_interval: Duration,
}

impl JobCoordinator {
    pub fn new(
        api: Arc<dyn JobserverApi>,
        registry: Arc<ContextRegistry>,
        config: &JobserverConfig,
    ) -> Self {
        Self {
            api,
            registry,
            sync_timeout: config.sync_timeout,
            poll_interval: config.poll_interval,
        }
    }

    /// Execute a job against a READY context.
    ///
    /// Fails fast without touching the server when the context is unknown
    /// or not READY.
    pub async fn execute(&self, request: &JobRequest) -> Result<JobResult, ContextError> {
        let descriptor = self
            .registry
            .snapshot(&request.context_name)
            .await
            .ok_or_else(|| ContextError::NotFound {
                name: request.context_name.clone(),
            })?;

        if descriptor.state != ContextState::Ready {
            return Err(ContextError::NotReady {
                name: request.context_name.clone(),
                state: descriptor.state,
            });
        }

        info!(
            "submitting job {} ({}) to context {}",
            request.app_name, request.class_path, request.context_name
        );
        let submission = self.api.submit_job(request).await?;

        if request.run_async {
            debug!(
                "job {} accepted on context {}",
                submission.job_id.as_deref().unwrap_or("<unknown>"),
                request.context_name
            );
            return Ok(JobResult {
                success: false,
                job_id: submission.job_id,
                output: None,
                error: None,
            });
        }

        // Some server versions answer a terminal status inline.
        if submission.status.is_terminal() {
            return Ok(terminal_result(
                submission.job_id,
                JobStatusReport {
                    status: submission.status,
                    result: submission.result,
                },
            ));
        }

        let job_id = submission
            .job_id
            .ok_or_else(|| RemoteError::Malformed {
                reason: "submission acknowledged without a job id".to_string(),
            })
            .map_err(ContextError::from)?;

        let deadline = Instant::now() + self.sync_timeout;
        loop {
            let report = self.api.job_status(&job_id).await?;
            if report.status.is_terminal() {
                return Ok(terminal_result(Some(job_id), report));
            }
            if Instant::now() >= deadline {
                warn!(
                    "job {} still running after {:?}; giving up the wait",
                    job_id, self.sync_timeout
                );
                return Err(RemoteError::Timeout(self.sync_timeout).into());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn terminal_result(job_id: Option<String>, report: JobStatusReport) -> JobResult {
    match report.status {
        JobStatus::Finished => JobResult {
            success: true,
            job_id,
            output: report.result,
            error: None,
        },
        _ => JobResult {
            success: false,
            job_id,
            error: report.error_message(),
            output: None,
        },
    }
}
