//! Claiming: batch planning plus the cycle executor.

pub mod batches;
pub mod claiming;

pub use batches::{
    BatchShuffler, NoShuffle, SeededShuffler, TaskClaimingBatch, ThreadRngShuffler,
    partition_into_claiming_batches,
};
pub use claiming::{
    ClaimOwnershipOptions, ClaimOwnershipResult, ClaimStats, TaskClaiming, TaskClaimingOpts,
};
