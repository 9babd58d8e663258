//! Capacity source port.
//!
//! The claimer asks how many claim slots are open right now; the answer
//! usually reflects in-flight counts tracked elsewhere in the process (a
//! worker pool, a rate limiter). Queried once per task type per cycle.

use crate::domain::TaskType;

pub trait CapacitySource: Send + Sync {
    /// Open claim slots for `task_type`; `None` asks for the pooled figure
    /// shared by all unlimited-concurrency types.
    fn capacity(&self, task_type: Option<&TaskType>) -> u32;
}

impl<F> CapacitySource for F
where
    F: Fn(Option<&TaskType>) -> u32 + Send + Sync,
{
    fn capacity(&self, task_type: Option<&TaskType>) -> u32 {
        self(task_type)
    }
}

/// The same capacity for every task type. Convenient for demos and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedCapacity(pub u32);

impl CapacitySource for FixedCapacity {
    fn capacity(&self, _task_type: Option<&TaskType>) -> u32 {
        self.0
    }
}
