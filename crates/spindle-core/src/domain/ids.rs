//! Domain identifiers (strongly-typed IDs).
//!
//! IDs are ULID-backed: sortable by creation time, generatable on any node
//! without coordination, UUID-sized. A single generic `Id<T>` carries the
//! shared implementation while the `T` marker keeps `TaskId` and `WorkerId`
//! distinct types at compile time; the marker is `PhantomData` and costs
//! nothing at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for each ID type.
///
/// Provides the prefix used by `Display` (`"task-"`, `"worker-"`).
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ID type.
///
/// # Example
/// ```ignore
/// let task_id: TaskId = Ulid::new().into();
/// let worker_id: WorkerId = Ulid::new().into();
/// // distinct types, cannot be mixed up
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker type for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Marker type for worker processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl IdMarker for Worker {
    fn prefix() -> &'static str {
        "worker-"
    }
}

/// Identifier of a task document in the shared store.
pub type TaskId = Id<Task>;

/// Identifier of one worker process competing for tasks.
pub type WorkerId = Id<Worker>;
