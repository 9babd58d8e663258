//! spindle-core
//!
//! Task-claiming core of a distributed background-job scheduler: many
//! symmetric worker processes compete for pending task documents in one
//! shared store, with no lock manager and no leader. Mutual exclusion comes
//! from the store's optimistic-concurrency check; fairness between task
//! types comes from per-cycle batch shuffling; crash recovery comes from
//! leases that self-expire.
//!
//! # Module layout
//! - **domain**: task documents, IDs, claim events
//! - **registry**: task type definitions (concurrency limits, attempt
//!   ceilings, priorities)
//! - **queries**: the clause AST and the mark-as-claimed query builders
//! - **claim**: batch planning and the cycle executor
//! - **ports**: TaskStore / Clock / CapacitySource interfaces
//! - **impls**: in-memory store for development and tests

pub mod claim;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queries;
pub mod registry;

pub use claim::{
    BatchShuffler, ClaimOwnershipOptions, ClaimOwnershipResult, ClaimStats, NoShuffle,
    SeededShuffler, TaskClaiming, TaskClaimingOpts, ThreadRngShuffler,
};
pub use domain::{ClaimEvent, TaskClaimFailure, TaskId, TaskInstance, TaskStatus, TaskType, WorkerId};
pub use error::SpindleError;
pub use ports::{CapacitySource, Clock, FixedCapacity, FixedClock, SystemClock, TaskStore};
pub use registry::{TaskDefinition, TaskPriority, TaskTypeRegistry};
