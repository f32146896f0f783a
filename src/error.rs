//! Error types for the job-server client and context lifecycle.

use std::time::Duration;

use crate::registry::ContextState;

/// Errors from a single HTTP round trip against the job-server.
///
/// The client performs no retries; callers decide whether a failed round
/// trip is worth repeating.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Network-level failure: connection refused, DNS, broken transport.
    #[error("job-server unreachable: {reason}")]
    Unreachable { reason: String },

    /// The request did not complete within the configured request timeout.
    #[error("job-server request timed out after {0:?}")]
    Timeout(Duration),

    /// The job-server answered with a non-success status.
    #[error("job-server rejected request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("malformed job-server response: {reason}")]
    Malformed { reason: String },
}

/// Errors from context lifecycle and job execution operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContextError {
    /// The operation requires a context in the READY state.
    #[error("context {name} is not ready (state: {state:?})")]
    NotReady { name: String, state: ContextState },

    /// No context with this name is known to the manager.
    #[error("context {name} not found")]
    NotFound { name: String },

    /// The underlying remote call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Errors raised while validating inbound configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The job-server base URL did not parse.
    #[error("invalid job-server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The job-server base URL uses a scheme other than http/https.
    #[error("unsupported job-server URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },
}
