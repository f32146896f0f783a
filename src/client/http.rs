//! HTTP implementation of the job-server API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::client::JobserverApi;
use crate::client::types::{JobEnvelope, JobStatus, JobStatusReport, JobSubmission};
use crate::config::JobserverConfig;
use crate::error::RemoteError;
use crate::jobs::JobRequest;
use crate::registry::{ContextDescriptor, ContextType};

/// Thin request/response mapping to the job-server's REST endpoints.
///
/// Every method is a single round trip bounded by the configured request
/// timeout. Non-success statuses become [`RemoteError::Rejected`],
/// transport failures [`RemoteError::Unreachable`], expired deadlines
/// [`RemoteError::Timeout`], and undecodable bodies
/// [`RemoteError::Malformed`].
pub struct HttpJobserverClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpJobserverClient {
    pub fn new(config: &JobserverConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn send_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.request_timeout)
        } else {
            RemoteError::Unreachable {
                reason: err.to_string(),
            }
        }
    }

    async fn rejected(response: reqwest::Response) -> RemoteError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        RemoteError::Rejected { status, body }
    }
}

/// Context-factory class the job-server needs for non-default contexts.
fn context_factory(context_type: ContextType) -> Option<&'static str> {
    match context_type {
        ContextType::SparkContext => None,
        ContextType::SqlContext => Some("spark.jobserver.context.SQLContextFactory"),
        ContextType::StreamingContext => Some("spark.jobserver.context.StreamingContextFactory"),
    }
}

async fn parse_envelope(response: reqwest::Response) -> Result<JobEnvelope, RemoteError> {
    let body = response.text().await.map_err(|e| RemoteError::Malformed {
        reason: e.to_string(),
    })?;
    serde_json::from_str(&body).map_err(|e| RemoteError::Malformed {
        reason: format!("{}; body: {}", e, body),
    })
}

fn envelope_status(envelope: &JobEnvelope) -> Result<JobStatus, RemoteError> {
    match &envelope.status {
        Some(raw) => JobStatus::parse(raw).ok_or_else(|| RemoteError::Malformed {
            reason: format!("unknown job status {}", raw),
        }),
        // A missing status on a success response means the job was accepted.
        None => Ok(JobStatus::Running),
    }
}

#[async_trait]
impl JobserverApi for HttpJobserverClient {
    async fn create_context(&self, descriptor: &ContextDescriptor) -> Result<(), RemoteError> {
        let url = self.url(&format!("contexts/{}", descriptor.name));
        let mut query = vec![
            (
                "num-cpu-cores".to_string(),
                descriptor.cores_per_executor.to_string(),
            ),
            (
                "memory-per-node".to_string(),
                descriptor.memory_per_node.clone(),
            ),
            (
                "spark.executor.instances".to_string(),
                descriptor.executor_count.to_string(),
            ),
        ];
        if let Some(factory) = context_factory(descriptor.context_type) {
            query.push(("context-factory".to_string(), factory.to_string()));
        }
        if descriptor.timeout_seconds > 0 {
            query.push((
                "timeout".to_string(),
                descriptor.timeout_seconds.to_string(),
            ));
        }

        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(())
    }

    async fn context_exists(&self, name: &str) -> Result<bool, RemoteError> {
        let url = self.url("contexts");
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        // The server answers with the full list of context names.
        let names: Vec<String> = response.json().await.map_err(|e| RemoteError::Malformed {
            reason: e.to_string(),
        })?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn delete_context(&self, name: &str) -> Result<bool, RemoteError> {
        let url = self.url(&format!("contexts/{}", name));
        debug!("DELETE {}", url);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(true)
    }

    async fn submit_job(&self, request: &JobRequest) -> Result<JobSubmission, RemoteError> {
        let url = self.url("jobs");
        let query = [
            ("appName", request.app_name.as_str()),
            ("classPath", request.class_path.as_str()),
            ("context", request.context_name.as_str()),
            ("sync", "false"),
        ];

        debug!("POST {} (context {})", url, request.context_name);
        let response = self
            .client
            .post(&url)
            .query(&query)
            .body(request.args.clone())
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let envelope = parse_envelope(response).await?;
        let status = envelope_status(&envelope)?;
        let job_id = envelope.job_id();
        Ok(JobSubmission {
            job_id,
            status,
            result: envelope.result,
        })
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, RemoteError> {
        let url = self.url(&format!("jobs/{}", job_id));
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let envelope = parse_envelope(response).await?;
        let status = envelope_status(&envelope)?;
        Ok(JobStatusReport {
            status,
            result: envelope.result,
        })
    }
}
