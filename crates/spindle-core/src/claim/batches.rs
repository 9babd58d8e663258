//! Batch planning: which task types claim together, and in what order.
//!
//! All unlimited-concurrency types share one pooled batch; every limited
//! type gets its own batch so its concurrency ceiling can bound `max_docs`
//! independently. The relative order of batches is re-randomized every
//! cycle - a fixed order would let whichever type ran first drain the
//! pooled capacity and starve the rest.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Mutex;

use crate::domain::TaskType;
use crate::registry::TaskTypeRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskClaimingBatch {
    /// All unlimited types, claimed together against the pooled capacity.
    Unlimited(Vec<TaskType>),
    /// One limited type, claimed against its own concurrency ceiling.
    Limited(TaskType),
}

impl TaskClaimingBatch {
    pub fn task_types(&self) -> impl Iterator<Item = &TaskType> {
        match self {
            TaskClaimingBatch::Unlimited(types) => types.iter(),
            TaskClaimingBatch::Limited(ty) => std::slice::from_ref(ty).iter(),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, TaskClaimingBatch::Unlimited(_))
    }
}

/// Partition registered, non-excluded task types into claiming batches.
///
/// Types with a concurrency limit of zero are disabled: they appear in no
/// batch and can never be claimed. An empty unlimited group emits no batch
/// at all.
pub fn partition_into_claiming_batches(
    registry: &TaskTypeRegistry,
    excluded_task_types: &[TaskType],
) -> Vec<TaskClaimingBatch> {
    let mut unlimited = Vec::new();
    let mut limited = Vec::new();

    for task_type in registry.task_types() {
        if excluded_task_types.contains(task_type) {
            continue;
        }
        match registry.limit(task_type) {
            None => unlimited.push(task_type.clone()),
            Some(0) => {}
            Some(_) => limited.push(task_type.clone()),
        }
    }

    let mut batches = Vec::with_capacity(1 + limited.len());
    if !unlimited.is_empty() {
        batches.push(TaskClaimingBatch::Unlimited(unlimited));
    }
    batches.extend(limited.into_iter().map(TaskClaimingBatch::Limited));
    batches
}

/// Per-cycle permutation of the batch order. Injectable so tests can pin the
/// order or the seed and assert exact sequences.
pub trait BatchShuffler: Send + Sync {
    fn shuffle(&self, batches: &mut [TaskClaimingBatch]);
}

/// Uniform random permutation from the thread-local generator. Production
/// default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngShuffler;

impl BatchShuffler for ThreadRngShuffler {
    fn shuffle(&self, batches: &mut [TaskClaimingBatch]) {
        batches.shuffle(&mut rand::thread_rng());
    }
}

/// Deterministic permutation sequence from a fixed seed.
#[derive(Debug)]
pub struct SeededShuffler {
    rng: Mutex<StdRng>,
}

impl SeededShuffler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl BatchShuffler for SeededShuffler {
    fn shuffle(&self, batches: &mut [TaskClaimingBatch]) {
        batches.shuffle(&mut *self.rng.lock().unwrap());
    }
}

/// Keeps the planner's order. For tests that assert batch-by-batch results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoShuffle;

impl BatchShuffler for NoShuffle {
    fn shuffle(&self, _batches: &mut [TaskClaimingBatch]) {}
}
