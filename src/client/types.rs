//! Wire types for the spark-jobserver REST API.
//!
//! The job-server wraps most responses in a `{ "status": ..., "result":
//! ... }` envelope; older releases nest the job id inside `result`, newer
//! ones put it at the top level. The parsing here accepts both.

use serde::Deserialize;
use serde_json::Value;

/// Remote phase of a submitted job, collapsed to what the coordinator
/// distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted or executing.
    Running,
    /// Terminated successfully.
    Finished,
    /// Terminated with an error or was killed.
    Error,
}

impl JobStatus {
    /// Map the job-server's status strings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "STARTED" | "RUNNING" => Some(Self::Running),
            "FINISHED" | "OK" | "SUCCESS" => Some(Self::Finished),
            "ERROR" | "KILLED" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Acknowledgement of a job submission.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub job_id: Option<String>,
    pub status: JobStatus,
    pub result: Option<Value>,
}

/// A point-in-time report of a job's remote state.
#[derive(Debug, Clone)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub result: Option<Value>,
}

impl JobStatusReport {
    /// Human-readable detail for a failed job, if the server sent any.
    pub fn error_message(&self) -> Option<String> {
        self.result.as_ref().map(|value| match value {
            Value::String(message) => message.clone(),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        })
    }
}

/// Raw response envelope for the `/jobs` endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct JobEnvelope {
    pub status: Option<String>,
    pub result: Option<Value>,
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

impl JobEnvelope {
    /// Job id, wherever this server version put it.
    pub(crate) fn job_id(&self) -> Option<String> {
        if let Some(id) = &self.job_id {
            return Some(id.clone());
        }
        self.result
            .as_ref()?
            .get("jobId")?
            .as_str()
            .map(str::to_string)
    }
}
