//! The serialized job document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::JobId;
use crate::state::JobState;

/// Progress ceiling; `mark_completed` pins progress here.
pub const PROGRESS_DONE: u32 = 100;

/// A job's stored representation: manager metadata plus the job's own
/// fields flattened alongside it.
///
/// Stored as JSON under `<namespace>:<id>`. The document expires after the
/// configured TTL counted from creation, whether or not the job ever
/// reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDocument<T> {
    pub id: JobId,
    pub state: JobState,
    /// Progress in `[0, 100]`.
    pub progress: u32,
    /// Error message recorded when the job fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub job: T,
}

impl<T> JobDocument<T> {
    /// Wrap `job` in a fresh pending document.
    pub fn new(id: JobId, job: T) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Pending,
            progress: 0,
            error: None,
            created_at: now,
            updated_at: now,
            job,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = JobState::Running;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.state = JobState::Completed;
        self.progress = PROGRESS_DONE;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        input: String,
        attempts: u32,
    }

    #[test]
    fn job_fields_flatten_into_the_document() {
        let doc = JobDocument::new(
            JobId::new(),
            Payload {
                input: "abc".into(),
                attempts: 3,
            },
        );

        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&doc).unwrap()).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["progress"], 0);
        assert_eq!(json["input"], "abc");
        assert_eq!(json["attempts"], 3);
        // No error field until a failure is recorded.
        assert!(json.get("error").is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let doc = JobDocument::new(
            JobId::new(),
            Payload {
                input: "x".into(),
                attempts: 0,
            },
        );
        let decoded: JobDocument<Payload> =
            serde_json::from_str(&serde_json::to_string(&doc).unwrap()).unwrap();
        assert_eq!(decoded.id, doc.id);
        assert_eq!(decoded.state, JobState::Pending);
        assert_eq!(decoded.job, doc.job);
    }

    #[test]
    fn state_transitions_update_metadata() {
        let mut doc = JobDocument::new(
            JobId::new(),
            Payload {
                input: String::new(),
                attempts: 0,
            },
        );

        doc.mark_running();
        assert_eq!(doc.state, JobState::Running);

        doc.mark_completed();
        assert_eq!(doc.state, JobState::Completed);
        assert_eq!(doc.progress, PROGRESS_DONE);
        assert!(doc.error.is_none());

        let mut failed = JobDocument::new(
            JobId::new(),
            Payload {
                input: String::new(),
                attempts: 0,
            },
        );
        failed.mark_failed("boom");
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
