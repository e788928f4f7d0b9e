//! Job capability contract.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::hooks::HookContext;

/// A caller-defined unit of work.
///
/// Implementors own their payload fields; the manager wraps them in a
/// [`crate::JobDocument`] that carries the queue metadata (state, progress,
/// error, timestamps). Once enqueued, the serialized form in the store is
/// authoritative — the worker deserializes a fresh instance, executes it,
/// and persists whatever the execution mutated, so callers get results
/// back through `get_job` or `add_job_and_wait`.
pub trait Job: Serialize + DeserializeOwned + Send + 'static {
    /// Execute the job. Field mutations made here end up in the terminal
    /// document and are visible to retrieval callers.
    fn execute(&mut self) -> anyhow::Result<()>;

    /// Runs on the worker after the document is loaded, before execution.
    fn on_creation(&mut self, _ctx: &HookContext) {}

    /// Runs on the worker after the terminal document is persisted, before
    /// the completion event is published.
    fn on_completion(&mut self, _ctx: &HookContext) {}
}
