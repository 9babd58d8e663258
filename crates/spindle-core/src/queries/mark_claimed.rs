//! Query fragments for marking available tasks as claimed.
//!
//! Pure builders: given a batch's task types and the worker's identity they
//! produce the filter, update-script parameters, sort, and post-claim fetch
//! filter that the claim executor sends to the store. No store round trip
//! happens here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{TaskStatus, TaskType, WorkerId};
use crate::queries::clauses::{
    QueryClause, RangeBound, TaskField, TaskSort, TimeRef, filter_down_by, ids, must_be_all_of,
    range, should_be_one_of, status_term, term,
};

/// Field writes applied to every document claimed by the update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdates {
    pub owner_id: WorkerId,
    /// Lease deadline: the claim self-expires once this passes.
    pub retry_at: DateTime<Utc>,
}

/// Parameters of the store-side claim script.
///
/// The script claims documents of a claimable type that are still under
/// their attempt ceiling (or were pinned by store key), marks documents of
/// an unused type as `unrecognized`, and leaves everything else untouched.
/// `skipped_task_types` is purely diagnostic: registered types that this
/// batch chose not to claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimUpdateScript {
    pub field_updates: FieldUpdates,
    pub claimable_task_types: Vec<TaskType>,
    pub skipped_task_types: Vec<TaskType>,
    pub unused_task_types: Vec<TaskType>,
    pub claim_tasks_by_id: Vec<String>,
    pub task_max_attempts: BTreeMap<TaskType, u32>,
}

/// `status = idle` and the scheduled run time has arrived.
pub fn idle_task_with_expired_run_at() -> QueryClause {
    must_be_all_of([
        status_term(TaskStatus::Idle),
        range(TaskField::RunAt, RangeBound::Lte(TimeRef::Now)),
    ])
}

/// `status = running | claiming` whose lease has lapsed: the owning worker
/// crashed or stalled, so the task is up for grabs again.
pub fn running_or_claiming_task_with_expired_retry_at() -> QueryClause {
    must_be_all_of([
        should_be_one_of([
            status_term(TaskStatus::Running),
            status_term(TaskStatus::Claiming),
        ]),
        range(TaskField::RetryAt, RangeBound::Lte(TimeRef::Now)),
    ])
}

pub fn enabled_task() -> QueryClause {
    must_be_all_of([term(TaskField::Enabled, true)])
}

/// Defensive exclusion of anything still under an active lease, regardless
/// of what the eligibility clauses matched.
pub fn inactive_tasks() -> QueryClause {
    QueryClause::Bool(crate::queries::clauses::BoolClause {
        must_not: vec![QueryClause::Bool(crate::queries::clauses::BoolClause {
            should: vec![
                status_term(TaskStatus::Running),
                status_term(TaskStatus::Claiming),
            ],
            must: vec![range(TaskField::RetryAt, RangeBound::Gt(TimeRef::Now))],
            ..Default::default()
        })],
        ..Default::default()
    })
}

pub fn one_of_task_types(task_types: &[TaskType]) -> QueryClause {
    should_be_one_of(
        task_types
            .iter()
            .map(|ty| term(TaskField::TaskType, ty.as_str())),
    )
}

/// The claim filter: enabled, of a type this batch's update script acts on,
/// and either idle-and-due or holding an expired lease.
///
/// The type gate admits the batch's claimable types, unused types (so the
/// script can mark their documents `unrecognized`), and pinned store keys;
/// pins also bypass the eligibility gate, so an operator can pull a document
/// of any registered type forward.
pub fn available_tasks_filter(
    claimable_task_types: &[TaskType],
    unused_task_types: &[TaskType],
    pinned_keys: &[String],
) -> QueryClause {
    let mut of_this_batch = vec![one_of_task_types(claimable_task_types)];
    if !unused_task_types.is_empty() {
        of_this_batch.push(one_of_task_types(unused_task_types));
    }
    let mut eligible = vec![
        idle_task_with_expired_run_at(),
        running_or_claiming_task_with_expired_retry_at(),
    ];
    if !pinned_keys.is_empty() {
        of_this_batch.push(ids(pinned_keys.to_vec()));
        eligible.push(ids(pinned_keys.to_vec()));
    }

    filter_down_by(
        must_be_all_of([
            enabled_task(),
            should_be_one_of(of_this_batch),
            should_be_one_of(eligible),
        ]),
        inactive_tasks(),
    )
}

/// Sort for the claiming update: pinned ids first, then configured type
/// priority descending, then soonest-due first.
pub fn claim_sort(pinned_keys: &[String], priority_map: BTreeMap<TaskType, u8>) -> Vec<TaskSort> {
    let mut sort = Vec::with_capacity(3);
    if !pinned_keys.is_empty() {
        sort.push(TaskSort::PinnedIds {
            keys: pinned_keys.to_vec(),
        });
    }
    sort.push(TaskSort::ByPriority { priority_map });
    sort.push(TaskSort::ByUrgency);
    sort
}

/// Post-claim fetch filter: documents this worker just took ownership of.
pub fn tasks_claimed_by_owner(
    owner_id: WorkerId,
    task_types: &[TaskType],
    pinned_keys: &[String],
) -> QueryClause {
    let mut claimed_from = vec![one_of_task_types(task_types)];
    if !pinned_keys.is_empty() {
        claimed_from.push(ids(pinned_keys.to_vec()));
    }

    must_be_all_of([
        term(TaskField::OwnerId, owner_id.to_string()),
        status_term(TaskStatus::Claiming),
        should_be_one_of(claimed_from),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::clauses::BoolClause;
    use ulid::Ulid;

    fn types(names: &[&str]) -> Vec<TaskType> {
        names.iter().map(|n| TaskType::new(*n)).collect()
    }

    #[test]
    fn available_tasks_filter_has_the_expected_shape() {
        let claimable = types(&["report", "yawn"]);
        let clause = available_tasks_filter(&claimable, &[], &[]);

        let QueryClause::Bool(bool_clause) = clause else {
            panic!("expected a bool clause");
        };

        // must: [enabled, one-of-types, one-of-eligibility],
        // filter: [inactive exclusion]
        assert_eq!(bool_clause.must.len(), 3);
        assert_eq!(bool_clause.must[0], enabled_task());
        assert_eq!(
            bool_clause.must[1],
            should_be_one_of([one_of_task_types(&claimable)])
        );
        assert_eq!(
            bool_clause.must[2],
            should_be_one_of([
                idle_task_with_expired_run_at(),
                running_or_claiming_task_with_expired_retry_at(),
            ])
        );
        assert_eq!(bool_clause.filter, vec![inactive_tasks()]);
        assert!(bool_clause.should.is_empty());
        assert!(bool_clause.must_not.is_empty());
    }

    #[test]
    fn unused_types_pass_the_type_gate_for_sanitation() {
        let claimable = types(&["report"]);
        let unused = types(&["retiredType"]);
        let clause = available_tasks_filter(&claimable, &unused, &[]);

        let QueryClause::Bool(bool_clause) = clause else {
            panic!("expected a bool clause");
        };
        let QueryClause::Bool(BoolClause { should: of_batch, .. }) = &bool_clause.must[1] else {
            panic!("expected the type alternatives");
        };
        assert_eq!(of_batch.len(), 2);
        assert_eq!(of_batch[1], one_of_task_types(&unused));
    }

    #[test]
    fn pinned_keys_bypass_both_the_type_and_eligibility_gates() {
        let claimable = types(&["report"]);
        let keys = vec!["task:aaa".to_string()];
        let clause = available_tasks_filter(&claimable, &[], &keys);

        let QueryClause::Bool(bool_clause) = clause else {
            panic!("expected a bool clause");
        };
        let QueryClause::Bool(BoolClause { should: of_batch, .. }) = &bool_clause.must[1] else {
            panic!("expected the type alternatives");
        };
        assert_eq!(of_batch.len(), 2);
        assert_eq!(of_batch[1], ids(keys.clone()));

        let QueryClause::Bool(BoolClause { should: eligible, .. }) = &bool_clause.must[2] else {
            panic!("expected the eligibility alternatives");
        };
        assert_eq!(eligible.len(), 3);
        assert_eq!(eligible[2], ids(keys));
    }

    #[test]
    fn inactive_tasks_excludes_only_ongoing_leases() {
        let QueryClause::Bool(outer) = inactive_tasks() else {
            panic!("expected a bool clause");
        };
        assert_eq!(outer.must_not.len(), 1);

        let QueryClause::Bool(inner) = &outer.must_not[0] else {
            panic!("expected the lease clause");
        };
        assert_eq!(inner.should.len(), 2);
        assert_eq!(
            inner.must,
            vec![range(TaskField::RetryAt, RangeBound::Gt(TimeRef::Now))]
        );
    }

    #[test]
    fn claim_sort_orders_pins_then_priority_then_urgency() {
        let keys = vec!["task:aaa".to_string()];
        let sort = claim_sort(&keys, BTreeMap::new());
        assert_eq!(sort.len(), 3);
        assert!(matches!(sort[0], TaskSort::PinnedIds { .. }));
        assert!(matches!(sort[1], TaskSort::ByPriority { .. }));
        assert!(matches!(sort[2], TaskSort::ByUrgency));

        let sort = claim_sort(&[], BTreeMap::new());
        assert_eq!(sort.len(), 2);
        assert!(matches!(sort[0], TaskSort::ByPriority { .. }));
    }

    #[test]
    fn fetch_filter_is_scoped_to_owner_status_and_types() {
        let owner = WorkerId::from_ulid(Ulid::new());
        let clause = tasks_claimed_by_owner(owner, &types(&["report", "yawn"]), &[]);

        let QueryClause::Bool(bool_clause) = clause else {
            panic!("expected a bool clause");
        };
        assert_eq!(bool_clause.must.len(), 3);
        assert_eq!(bool_clause.must[0], term(TaskField::OwnerId, owner.to_string()));
        assert_eq!(bool_clause.must[1], status_term(TaskStatus::Claiming));
        assert_eq!(
            bool_clause.must[2],
            should_be_one_of([one_of_task_types(&types(&["report", "yawn"]))])
        );
    }

    #[test]
    fn claim_script_serializes_with_store_parameter_names() {
        let script = ClaimUpdateScript {
            field_updates: FieldUpdates {
                owner_id: WorkerId::from_ulid(Ulid::new()),
                retry_at: chrono::Utc::now(),
            },
            claimable_task_types: types(&["report"]),
            skipped_task_types: types(&["backfill"]),
            unused_task_types: vec![],
            claim_tasks_by_id: vec![],
            task_max_attempts: BTreeMap::from([(TaskType::new("report"), 5)]),
        };

        let json = serde_json::to_value(&script).unwrap();
        assert_eq!(json["claimableTaskTypes"][0], "report");
        assert_eq!(json["skippedTaskTypes"][0], "backfill");
        assert_eq!(json["taskMaxAttempts"]["report"], 5);
        assert!(json["fieldUpdates"]["ownerId"].is_string());
    }
}
