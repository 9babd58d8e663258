//! Claim outcome events.
//!
//! Every cycle publishes one event per claimed document (and one per pinned
//! id that could not be claimed) onto a broadcast channel, so the task
//! executor and metrics collectors can each hold their own subscription.
//! Events are not buffered beyond the channel capacity; a subscriber that
//! falls behind sees `Lagged` from the receiver, which is its problem to
//! handle.

use thiserror::Error;
use tokio::sync::broadcast;

use super::ids::TaskId;
use super::task::TaskInstance;

/// Why a requested task did not come back from a claim cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskClaimFailure {
    #[error("task was not claimed by this cycle")]
    NotClaimed,
}

/// One claim outcome, keyed by task id.
#[derive(Debug, Clone)]
pub struct ClaimEvent {
    pub task_id: TaskId,
    pub outcome: Result<TaskInstance, TaskClaimFailure>,
}

impl ClaimEvent {
    pub fn claimed(task: TaskInstance) -> Self {
        Self {
            task_id: task.id,
            outcome: Ok(task),
        }
    }

    pub fn not_claimed(task_id: TaskId) -> Self {
        Self {
            task_id,
            outcome: Err(TaskClaimFailure::NotClaimed),
        }
    }
}

/// Single-producer emission point with multi-subscriber fan-out.
pub struct ClaimEvents {
    tx: broadcast::Sender<ClaimEvent>,
}

impl ClaimEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClaimEvent> {
        self.tx.subscribe()
    }

    /// Best-effort: with no live subscribers the event is dropped, never an
    /// error.
    pub(crate) fn emit(&self, event: ClaimEvent) {
        let _ = self.tx.send(event);
    }
}
