//! `jobq-core` — job-queue domain building blocks.
//!
//! This crate contains the **pure domain** pieces of the queue (no store or
//! threading concerns): the job capability contract, identifiers, the job
//! document model, progress records/cursors, and the hook context.

pub mod document;
pub mod error;
pub mod hooks;
pub mod id;
pub mod job;
pub mod progress;
pub mod state;

pub use document::{JobDocument, PROGRESS_DONE};
pub use error::CoreError;
pub use hooks::HookContext;
pub use id::JobId;
pub use job::Job;
pub use progress::{Artefact, ProgressRecord, ProgressUpdate};
pub use state::JobState;
