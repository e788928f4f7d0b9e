//! Progress records and the read cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::PROGRESS_DONE;
use crate::state::JobState;

/// Opaque cursor into a job's progress stream.
///
/// The default artefact reads from the beginning. Callers pass the
/// artefact returned by the previous read into the next call, which
/// delivers each record exactly once, in order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Artefact(u64);

impl Artefact {
    /// Cursor positioned at the start of the stream.
    pub fn start() -> Self {
        Self(0)
    }

    pub fn at(offset: u64) -> Self {
        Self(offset)
    }

    pub fn offset(&self) -> u64 {
        self.0
    }

    /// Cursor past one more record.
    pub fn advanced(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// One entry in a job's progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub state: JobState,
    pub progress: u32,
    pub recorded_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Build a record, clamping `progress` into `[0, 100]`.
    pub fn new(state: JobState, progress: u32) -> Self {
        Self {
            state,
            progress: progress.min(PROGRESS_DONE),
            recorded_at: Utc::now(),
        }
    }
}

/// Result of a progress read: the observed state/progress plus the cursor
/// to pass on the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub state: JobState,
    pub progress: u32,
    pub artefact: Artefact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artefact_advances_one_record_at_a_time() {
        let a = Artefact::start();
        assert_eq!(a.offset(), 0);
        assert_eq!(a.advanced().offset(), 1);
        assert_eq!(a.advanced().advanced(), Artefact::at(2));
    }

    #[test]
    fn progress_is_clamped() {
        let record = ProgressRecord::new(JobState::Running, 250);
        assert_eq!(record.progress, PROGRESS_DONE);
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = ProgressRecord::new(JobState::Completed, 100);
        let decoded: ProgressRecord =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }
}
