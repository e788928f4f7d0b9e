//! `jobq-manager` — the job-queue manager.
//!
//! A [`Manager`] binds a configuration to one backing store and exposes the
//! producer, worker, and retrieval surfaces of the queue:
//!
//! - `start` brings up the readiness monitor (client mode); `start_worker`
//!   additionally runs the consumer loop (worker mode).
//! - Producers call [`Manager::add_job`] (fire-and-forget) or
//!   [`Manager::add_job_and_wait`] (block until the job finishes, with a
//!   bounded timeout).
//! - Anyone may read back documents with [`Manager::get_job`] or follow a
//!   job's progress stream with [`Manager::get_job_progress`].
//!
//! Every store-touching path gates on the readiness monitor, so a dropped
//! store connection makes callers block (not error) until connectivity
//! returns.

pub mod config;
pub mod error;
pub mod manager;
pub mod readiness;
pub mod shutdown;

pub use config::{BACKEND_REDIS, Config, ConfigError};
pub use error::ManagerError;
pub use manager::Manager;
pub use readiness::Readiness;
pub use shutdown::Shutdown;

pub use jobq_core::{
    Artefact, HookContext, Job, JobDocument, JobId, JobState, PROGRESS_DONE, ProgressRecord,
    ProgressUpdate,
};
