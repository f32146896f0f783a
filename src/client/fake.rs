//! In-memory job-server double for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::JobserverApi;
use crate::client::types::{JobStatus, JobStatusReport, JobSubmission};
use crate::error::RemoteError;
use crate::jobs::JobRequest;
use crate::registry::ContextDescriptor;

/// Counts every call and mimics the server's context/job semantics.
#[derive(Default)]
pub(crate) struct FakeJobserver {
    contexts: Mutex<HashSet<String>>,
    /// Remaining status polls before each job reports terminal.
    jobs: Mutex<HashMap<String, u32>>,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    create_delay_ms: AtomicU64,
    pub fail_creates: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_jobs: AtomicBool,
    pub polls_before_finish: AtomicU32,
    next_job_id: AtomicUsize,
}

impl FakeJobserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.create_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn has_context(&self, name: &str) -> bool {
        self.contexts.lock().await.contains(name)
    }

    /// Simulate a deletion performed by another manager instance.
    pub async fn drop_context(&self, name: &str) {
        self.contexts.lock().await.remove(name);
    }
}

#[async_trait]
impl JobserverApi for FakeJobserver {
    async fn create_context(&self, descriptor: &ContextDescriptor) -> Result<(), RemoteError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let delay = Duration::from_millis(self.create_delay_ms.load(Ordering::SeqCst));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected {
                status: 500,
                body: "context init failed".to_string(),
            });
        }

        let mut contexts = self.contexts.lock().await;
        if !contexts.insert(descriptor.name.clone()) {
            return Err(RemoteError::Rejected {
                status: 400,
                body: format!("context {} exists", descriptor.name),
            });
        }
        Ok(())
    }

    async fn context_exists(&self, name: &str) -> Result<bool, RemoteError> {
        Ok(self.contexts.lock().await.contains(name))
    }

    async fn delete_context(&self, name: &str) -> Result<bool, RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable {
                reason: "connection reset".to_string(),
            });
        }

        Ok(self.contexts.lock().await.remove(name))
    }

    async fn submit_job(&self, request: &JobRequest) -> Result<JobSubmission, RemoteError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);

        if !self.contexts.lock().await.contains(&request.context_name) {
            return Err(RemoteError::Rejected {
                status: 404,
                body: format!("context {} not found", request.context_name),
            });
        }

        let id = format!("job-{}", self.next_job_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.jobs
            .lock()
            .await
            .insert(id.clone(), self.polls_before_finish.load(Ordering::SeqCst));

        Ok(JobSubmission {
            job_id: Some(id),
            status: JobStatus::Running,
            result: None,
        })
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, RemoteError> {
        let mut jobs = self.jobs.lock().await;
        let Some(remaining) = jobs.get_mut(job_id) else {
            return Err(RemoteError::Rejected {
                status: 404,
                body: format!("job {} not found", job_id),
            });
        };

        if *remaining > 0 {
            *remaining -= 1;
            return Ok(JobStatusReport {
                status: JobStatus::Running,
                result: None,
            });
        }

        if self.fail_jobs.load(Ordering::SeqCst) {
            Ok(JobStatusReport {
                status: JobStatus::Error,
                result: Some(serde_json::json!("job failed on the cluster")),
            })
        } else {
            Ok(JobStatusReport {
                status: JobStatus::Finished,
                result: Some(serde_json::json!({"a": 2, "b": 2, "c": 1, "see": 1})),
            })
        }
    }
}
