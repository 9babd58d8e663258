//! Claim executor: drives one claiming cycle against the task store.
//!
//! A cycle runs the planned batches strictly in sequence, because every
//! batch's `max_docs` depends on how much pooled capacity the batches before
//! it actually consumed. Across worker processes there is no coordination at
//! all; the store's optimistic-concurrency check resolves races, and losing
//! a race is ordinary contention reported through `tasks_conflicted`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::claim::batches::{
    BatchShuffler, TaskClaimingBatch, partition_into_claiming_batches,
};
use crate::domain::{ClaimEvent, ClaimEvents, TaskId, TaskInstance, TaskType, WorkerId};
use crate::error::SpindleError;
use crate::ports::capacity::CapacitySource;
use crate::ports::task_store::{SearchQuery, TaskStore, UpdateByQuery};
use crate::queries::mark_claimed::{
    ClaimUpdateScript, FieldUpdates, available_tasks_filter, claim_sort, tasks_claimed_by_owner,
};
use crate::queries::clauses::TaskSort;
use crate::registry::TaskTypeRegistry;

const EVENTS_CHANNEL_CAPACITY: usize = 1024;

/// Caller-facing options for one claim cycle.
#[derive(Debug, Clone)]
pub struct ClaimOwnershipOptions {
    /// Lease deadline written to every claimed document; the claim
    /// self-expires once this passes.
    pub claim_ownership_until: DateTime<Utc>,

    /// Specific tasks to claim this cycle regardless of their scheduling
    /// state. Unclaimed pins surface as `NotClaimed` events.
    pub claim_tasks_by_id: Vec<TaskId>,
}

impl ClaimOwnershipOptions {
    pub fn until(claim_ownership_until: DateTime<Utc>) -> Self {
        Self {
            claim_ownership_until,
            claim_tasks_by_id: Vec::new(),
        }
    }

    pub fn with_tasks_by_id(mut self, task_ids: Vec<TaskId>) -> Self {
        self.claim_tasks_by_id = task_ids;
        self
    }
}

/// Per-batch claim statistics.
///
/// `tasks_conflicted` is bounded by the batch's requestable capacity:
/// conflicts beyond `max_docs - updated` could not have cost this batch a
/// claim, so they are not reported against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimStats {
    pub tasks_updated: u32,
    pub tasks_conflicted: u32,
    pub tasks_claimed: u32,
}

/// Outcome of one batch: the claimed documents plus statistics.
#[derive(Debug, Clone, Default)]
pub struct ClaimOwnershipResult {
    pub docs: Vec<TaskInstance>,
    pub stats: ClaimStats,
}

/// Everything a `TaskClaiming` needs wired in.
pub struct TaskClaimingOpts {
    pub registry: Arc<TaskTypeRegistry>,
    pub store: Arc<dyn TaskStore>,
    pub worker_id: WorkerId,
    /// Retry ceiling for types without their own `max_attempts`.
    pub max_attempts: u32,
    pub capacity: Arc<dyn CapacitySource>,
    pub excluded_task_types: Vec<TaskType>,
    /// Types no longer registered anywhere in the deployment; the store
    /// marks their documents `unrecognized` during claim updates.
    pub unused_task_types: Vec<TaskType>,
    pub shuffler: Arc<dyn BatchShuffler>,
}

/// The task-claiming core: competes for eligible task documents on behalf
/// of one worker process.
pub struct TaskClaiming {
    registry: Arc<TaskTypeRegistry>,
    store: Arc<dyn TaskStore>,
    worker_id: WorkerId,
    default_max_attempts: u32,
    capacity: Arc<dyn CapacitySource>,
    unused_task_types: Vec<TaskType>,
    batches: Vec<TaskClaimingBatch>,
    shuffler: Arc<dyn BatchShuffler>,
    events: ClaimEvents,
}

impl TaskClaiming {
    pub fn new(opts: TaskClaimingOpts) -> Self {
        let batches =
            partition_into_claiming_batches(&opts.registry, &opts.excluded_task_types);
        Self {
            registry: opts.registry,
            store: opts.store,
            worker_id: opts.worker_id,
            default_max_attempts: opts.max_attempts,
            capacity: opts.capacity,
            unused_task_types: opts.unused_task_types,
            batches,
            shuffler: opts.shuffler,
            events: ClaimEvents::new(EVENTS_CHANNEL_CAPACITY),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Subscribe to per-task claim outcomes.
    pub fn events(&self) -> broadcast::Receiver<ClaimEvent> {
        self.events.subscribe()
    }

    /// Run one claim cycle: one claim-and-fetch round trip per planned
    /// batch, in this cycle's shuffled order. Returns one result per
    /// executed batch, in execution order.
    ///
    /// A store failure ends the cycle; batches that already completed stay
    /// claimed (their ownership writes are not rolled back) and the next
    /// cycle competes for whatever is left.
    pub async fn claim_available_tasks(
        &self,
        opts: ClaimOwnershipOptions,
    ) -> Result<Vec<ClaimOwnershipResult>, SpindleError> {
        let initial_capacity = self.capacity.capacity(None);
        let mut remaining_capacity = initial_capacity;
        let mut pinned_ids = opts.claim_tasks_by_id.clone();
        let mut results = Vec::new();

        for batch in self.claiming_batches() {
            let batch_capacity = match &batch {
                TaskClaimingBatch::Unlimited(_) => self.capacity.capacity(None),
                TaskClaimingBatch::Limited(ty) => self.capacity.capacity(Some(ty)),
            };
            let max_docs = remaining_capacity.min(batch_capacity);
            if max_docs == 0 {
                debug!(?batch, "skipping batch with no capacity");
                continue;
            }

            let claimable: Vec<TaskType> = batch.task_types().cloned().collect();
            if claimable.is_empty() {
                continue;
            }

            // Pins ride the first batch that actually executes.
            let batch_pins = std::mem::take(&mut pinned_ids);
            let result = self
                .execute_batch(&claimable, max_docs, &opts, &batch_pins)
                .await?;

            remaining_capacity = remaining_capacity.saturating_sub(result.stats.tasks_updated);
            results.push(result);
        }

        debug!(
            batches = results.len(),
            claimed = results.iter().map(|r| r.stats.tasks_claimed).sum::<u32>(),
            initial_capacity,
            remaining_capacity,
            "claim cycle complete"
        );
        Ok(results)
    }

    /// This cycle's batch order: the static partition, freshly permuted.
    fn claiming_batches(&self) -> Vec<TaskClaimingBatch> {
        let mut batches = self.batches.clone();
        self.shuffler.shuffle(&mut batches);
        batches
    }

    fn max_attempts_for(&self, task_type: &TaskType) -> u32 {
        self.registry
            .max_attempts(task_type)
            .unwrap_or(self.default_max_attempts)
    }

    fn claim_script(
        &self,
        claimable: &[TaskType],
        pinned_keys: &[String],
        claim_ownership_until: DateTime<Utc>,
    ) -> ClaimUpdateScript {
        let task_max_attempts: BTreeMap<TaskType, u32> = claimable
            .iter()
            .map(|ty| (ty.clone(), self.max_attempts_for(ty)))
            .collect();
        let skipped_task_types: Vec<TaskType> = self
            .registry
            .task_types()
            .filter(|ty| !claimable.contains(ty))
            .cloned()
            .collect();

        ClaimUpdateScript {
            field_updates: FieldUpdates {
                owner_id: self.worker_id,
                retry_at: claim_ownership_until,
            },
            claimable_task_types: claimable.to_vec(),
            skipped_task_types,
            unused_task_types: self.unused_task_types.clone(),
            claim_tasks_by_id: pinned_keys.to_vec(),
            task_max_attempts,
        }
    }

    async fn execute_batch(
        &self,
        claimable: &[TaskType],
        max_docs: u32,
        opts: &ClaimOwnershipOptions,
        pinned_ids: &[TaskId],
    ) -> Result<ClaimOwnershipResult, SpindleError> {
        let pinned_keys = self.store.convert_ids_to_store_keys(pinned_ids);

        let update = UpdateByQuery {
            query: available_tasks_filter(claimable, &self.unused_task_types, &pinned_keys),
            script: self.claim_script(claimable, &pinned_keys, opts.claim_ownership_until),
            sort: claim_sort(&pinned_keys, self.registry.priority_map()),
            max_docs,
        };
        let update_result = self.store.update_by_query(update).await?;

        let tasks_updated = update_result.updated;
        // Conflicts beyond the requested ceiling could not have counted
        // against this batch's max_docs; don't report them against it.
        let tasks_conflicted = update_result
            .version_conflicts
            .min(max_docs.saturating_sub(tasks_updated));

        // Best-effort re-read of what we now own. The ownership writes above
        // already happened; a failure here still fails the cycle, but cannot
        // un-claim anything.
        let fetched = if tasks_updated > 0 {
            self.store
                .fetch(SearchQuery {
                    query: tasks_claimed_by_owner(self.worker_id, claimable, &pinned_keys),
                    sort: vec![TaskSort::ByUrgency],
                    size: tasks_updated,
                })
                .await?
                .docs
        } else {
            Vec::new()
        };

        let mut docs = Vec::with_capacity(fetched.len());
        for doc in fetched {
            if self.registry.contains(&doc.task_type) {
                docs.push(doc);
            } else {
                warn!(
                    task_id = %doc.id,
                    task_type = %doc.task_type,
                    "fetched a claimed task with an unrecognized task type"
                );
            }
        }
        if (docs.len() as u32) < tasks_updated {
            warn!(
                updated = tasks_updated,
                resolved = docs.len(),
                "claimed tasks missing from the ownership fetch"
            );
        }

        for doc in &docs {
            self.events.emit(ClaimEvent::claimed(doc.clone()));
        }
        for pinned in pinned_ids {
            if !docs.iter().any(|doc| doc.id == *pinned) {
                self.events.emit(ClaimEvent::not_claimed(*pinned));
            }
        }

        let stats = ClaimStats {
            tasks_updated,
            tasks_conflicted,
            tasks_claimed: docs.len() as u32,
        };
        debug!(?stats, claimable = claimable.len(), max_docs, "claim batch complete");
        Ok(ClaimOwnershipResult { docs, stats })
    }
}
