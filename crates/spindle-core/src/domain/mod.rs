//! Domain model (IDs, task documents, claim events).

pub mod events;
pub mod ids;
pub mod task;

pub use events::{ClaimEvent, ClaimEvents, TaskClaimFailure};
pub use ids::{TaskId, WorkerId};
pub use task::{TaskInstance, TaskSchedule, TaskStatus, TaskType};
