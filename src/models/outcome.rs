use serde::{Deserialize, Serialize};

/// Terminal disposition of a single job execution.
///
/// Exactly one of these is produced per dequeued message. `Requeued` carries
/// the delay and failure reason so the queue consumer can push a successor
/// envelope with an incremented attempt count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Success, remove the message from the queue.
    Acknowledged,
    /// Permanent failure, remove the message and log.
    Rejected,
    /// Transient failure, re-enqueue after `delay_seconds`.
    Requeued { delay_seconds: u64, reason: String },
}

impl JobOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, JobOutcome::Acknowledged)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, JobOutcome::Rejected)
    }
}
