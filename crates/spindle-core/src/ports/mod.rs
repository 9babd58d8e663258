//! Ports - interfaces to the collaborators outside this crate.
//!
//! The task store is network-accessed; the clock and capacity source are
//! in-process callbacks. Each trait hides its implementation so tests can
//! substitute recording mocks and frozen clocks.

pub mod capacity;
pub mod clock;
pub mod task_store;

pub use capacity::{CapacitySource, FixedCapacity};
pub use clock::{Clock, FixedClock, SystemClock};
pub use task_store::{
    FetchResult, SearchQuery, StoreError, TaskStore, UpdateByQuery, UpdateByQueryResult,
};
