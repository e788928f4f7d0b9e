//! Manager error model.

use std::time::Duration;

use thiserror::Error;

use jobq_core::JobId;
use jobq_store::StoreError;

use crate::config::ConfigError;

/// Errors surfaced by the manager's public API.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Invalid configuration; fatal to construction.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A store operation failed. Not retried; retries are a caller
    /// responsibility.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A job document or progress record could not be (de)serialized.
    #[error("malformed job document: {0}")]
    Codec(#[from] serde_json::Error),

    /// No document exists (or it has expired) for the requested job.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// A synchronous wait exceeded its bound. The job keeps running in the
    /// store and can still be retrieved later with `get_job`.
    #[error("timed out after {timeout:?} waiting for job {id}")]
    Timeout { id: JobId, timeout: Duration },

    /// The manager shut down while the call was in flight.
    #[error("manager is shutting down")]
    Terminated,
}
