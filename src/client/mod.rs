//! Remote job-server API: the trait seam plus the reqwest-backed client.

mod http;
mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::jobs::JobRequest;
use crate::registry::ContextDescriptor;

pub use http::HttpJobserverClient;
pub use types::{JobStatus, JobStatusReport, JobSubmission};

/// Operations the job-server exposes over HTTP.
///
/// Implementations perform exactly one round trip per call and translate
/// failures into [`RemoteError`]; they never retry. Retry policy belongs
/// to the lifecycle manager and its callers.
#[async_trait]
pub trait JobserverApi: Send + Sync {
    /// Create a named context. The server rejects duplicate names.
    async fn create_context(&self, descriptor: &ContextDescriptor) -> Result<(), RemoteError>;

    /// Whether a context with this name currently exists on the server.
    async fn context_exists(&self, name: &str) -> Result<bool, RemoteError>;

    /// Delete a named context. `Ok(false)` means the server did not know
    /// the name; callers treat that as a no-op success.
    async fn delete_context(&self, name: &str) -> Result<bool, RemoteError>;

    /// Submit a job for execution on a context.
    async fn submit_job(&self, request: &JobRequest) -> Result<JobSubmission, RemoteError>;

    /// Fetch the current status of a submitted job.
    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, RemoteError>;
}
