//! Inbound configuration supplied by the hosting framework.
//!
//! Validation happens at construction time: the base URL must parse as an
//! HTTP(S) endpoint with a host, and all timeouts are plain second counts.

use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

/// Connection settings for a Spark job-server.
#[derive(Debug, Clone)]
pub struct JobserverConfig {
    /// Base URL of the job-server REST API (e.g. `http://localhost:8089`).
    pub base_url: Url,
    /// How long a synchronous job execution may run before giving up.
    pub sync_timeout: Duration,
    /// Per-request deadline for individual HTTP round trips.
    pub request_timeout: Duration,
    /// Interval between job status polls in synchronous mode.
    pub poll_interval: Duration,
}

impl JobserverConfig {
    /// Validate and build a configuration.
    ///
    /// `sync_timeout_secs` bounds synchronous job execution; `0` makes
    /// synchronous calls fail on the first poll past submission.
    pub fn new(base_url: &str, sync_timeout_secs: u64) -> Result<Self, ConfigError> {
        let url = Url::parse(base_url).map_err(|e| ConfigError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::UnsupportedScheme {
                    scheme: other.to_string(),
                });
            }
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                url: base_url.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self {
            base_url: url,
            sync_timeout: Duration::from_secs(sync_timeout_secs),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Set the per-request HTTP deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the interval between job status polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
