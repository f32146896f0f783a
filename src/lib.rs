//! Client and lifecycle manager for long-running Spark job-server contexts.
//!
//! A Spark job-server hosts named, long-lived compute contexts that accept
//! job submissions without per-job startup cost. This crate is the client
//! half of that arrangement:
//!
//! - [`client`] — HTTP mapping to the job-server's REST endpoints
//! - [`registry`] — process-local context bookkeeping and creation dedup
//! - [`manager`] — lifecycle orchestration and timeout eviction
//! - [`jobs`] — synchronous and asynchronous job execution
//! - [`service`] — a facade bundling the public operations
//!
//! Concurrent creations of the same context name collapse into a single
//! remote call whose outcome every caller shares. A context created with a
//! timeout is deleted automatically, locally and on the server, once that
//! lifetime elapses.
//!
//! ```no_run
//! use spark_contexts::{ContextSpec, JobRequest, JobserverConfig, SparkContextService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = JobserverConfig::new("http://localhost:8089", 600)?;
//! let service = SparkContextService::new(config);
//!
//! service
//!     .create_context(
//!         ContextSpec::new("etl").executors(2).memory_per_node("1g"),
//!         false,
//!     )
//!     .await?;
//!
//! let result = service
//!     .execute_job(&JobRequest::new(
//!         "wordcount",
//!         "spark.jobserver.WordCountExample",
//!         "etl",
//!         "input.string = a b c a b see",
//!         false,
//!     ))
//!     .await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod jobs;
pub mod manager;
pub mod registry;
pub mod service;

pub use client::{HttpJobserverClient, JobStatus, JobStatusReport, JobSubmission, JobserverApi};
pub use config::JobserverConfig;
pub use error::{ConfigError, ContextError, RemoteError};
pub use jobs::{JobCoordinator, JobRequest, JobResult};
pub use manager::ContextManager;
pub use registry::{
    ContextDescriptor, ContextRegistry, ContextSpec, ContextState, ContextType,
    ReservationOutcome, Settled, StateWatcher,
};
pub use service::SparkContextService;
