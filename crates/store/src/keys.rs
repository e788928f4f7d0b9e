//! Namespaced key schema.

use jobq_core::JobId;

/// Key layout for one namespace.
///
/// - document:   `<ns>:<id>`
/// - work queue: `<ns>:queue`
/// - completion: `<ns>:<id>:done`
/// - progress:   `<ns>:<id>:progress`
#[derive(Debug, Clone)]
pub struct Keyspace {
    namespace: String,
}

impl Keyspace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key of a job's document.
    pub fn document(&self, id: JobId) -> String {
        format!("{}:{}", self.namespace, id)
    }

    /// Key of the pending-job queue.
    pub fn queue(&self) -> String {
        format!("{}:queue", self.namespace)
    }

    /// Per-job completion channel.
    pub fn completion(&self, id: JobId) -> String {
        format!("{}:{}:done", self.namespace, id)
    }

    /// Per-job progress stream.
    pub fn progress(&self, id: JobId) -> String {
        format!("{}:{}:progress", self.namespace, id)
    }
}
