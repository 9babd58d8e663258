//! Composable query clauses for the task store.
//!
//! The store is an external collaborator reached over the network, so query
//! fragments are a small typed AST rather than a wire format; a store adapter
//! renders them into whatever its query DSL looks like, and the in-memory
//! store evaluates them directly. All clauses serialize for diagnostics.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{TaskInstance, TaskStatus};

/// Filterable fields of the task document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskField {
    #[serde(rename = "task.enabled")]
    Enabled,
    #[serde(rename = "task.status")]
    Status,
    #[serde(rename = "task.taskType")]
    TaskType,
    #[serde(rename = "task.runAt")]
    RunAt,
    #[serde(rename = "task.retryAt")]
    RetryAt,
    #[serde(rename = "task.ownerId")]
    OwnerId,
}

impl TaskField {
    pub fn path(self) -> &'static str {
        match self {
            TaskField::Enabled => "task.enabled",
            TaskField::Status => "task.status",
            TaskField::TaskType => "task.taskType",
            TaskField::RunAt => "task.runAt",
            TaskField::RetryAt => "task.retryAt",
            TaskField::OwnerId => "task.ownerId",
        }
    }

    fn value_of(self, task: &TaskInstance) -> serde_json::Value {
        match self {
            TaskField::Enabled => serde_json::Value::Bool(task.enabled),
            TaskField::Status => serde_json::Value::String(task.status.as_str().to_string()),
            TaskField::TaskType => serde_json::Value::String(task.task_type.as_str().to_string()),
            TaskField::OwnerId => task
                .owner_id
                .map(|owner| serde_json::Value::String(owner.to_string()))
                .unwrap_or(serde_json::Value::Null),
            // Date fields are matched through Range, not Term.
            TaskField::RunAt => serde_json::Value::Null,
            TaskField::RetryAt => serde_json::Value::Null,
        }
    }

    fn date_of(self, task: &TaskInstance) -> Option<DateTime<Utc>> {
        match self {
            TaskField::RunAt => Some(task.run_at),
            TaskField::RetryAt => task.retry_at,
            _ => None,
        }
    }
}

/// A point in time inside a range clause. `Now` is resolved by the store at
/// execution time, so a cycle's clauses stay pure values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeRef {
    Now,
    At(DateTime<Utc>),
}

impl TimeRef {
    fn resolve(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeRef::Now => now,
            TimeRef::At(t) => t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RangeBound {
    Lte(TimeRef),
    Gt(TimeRef),
}

/// Boolean combinator over clauses.
///
/// Matching follows the store's convention for `should`: a `should` list
/// on its own requires at least one match, but alongside `must`/`filter`
/// entries it is optional and only influences scoring (which claiming does
/// not use).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BoolClause {
    pub must: Vec<QueryClause>,
    pub should: Vec<QueryClause>,
    pub must_not: Vec<QueryClause>,
    pub filter: Vec<QueryClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryClause {
    Term {
        field: TaskField,
        value: serde_json::Value,
    },
    Range {
        field: TaskField,
        bound: RangeBound,
    },
    /// Matches documents by store key (see
    /// [`TaskStore::convert_ids_to_store_keys`](crate::ports::TaskStore::convert_ids_to_store_keys)).
    Ids {
        keys: Vec<String>,
    },
    Bool(BoolClause),
}

impl QueryClause {
    /// Evaluate this clause against one task document.
    ///
    /// `store_key` identifies the document for `Ids` clauses; `now` resolves
    /// `TimeRef::Now`. A range over a missing date field never matches.
    pub fn matches(&self, task: &TaskInstance, store_key: &str, now: DateTime<Utc>) -> bool {
        match self {
            QueryClause::Term { field, value } => field.value_of(task) == *value,
            QueryClause::Range { field, bound } => match field.date_of(task) {
                Some(date) => match bound {
                    RangeBound::Lte(t) => date <= t.resolve(now),
                    RangeBound::Gt(t) => date > t.resolve(now),
                },
                None => false,
            },
            QueryClause::Ids { keys } => keys.iter().any(|key| key == store_key),
            QueryClause::Bool(bool_clause) => {
                let hit = |clause: &QueryClause| clause.matches(task, store_key, now);

                if !bool_clause.must.iter().all(hit) {
                    return false;
                }
                if !bool_clause.filter.iter().all(hit) {
                    return false;
                }
                if bool_clause.must_not.iter().any(hit) {
                    return false;
                }
                // should is only binding when it stands alone
                if !bool_clause.should.is_empty()
                    && bool_clause.must.is_empty()
                    && bool_clause.filter.is_empty()
                    && !bool_clause.should.iter().any(hit)
                {
                    return false;
                }
                true
            }
        }
    }
}

pub fn term(field: TaskField, value: impl Into<serde_json::Value>) -> QueryClause {
    QueryClause::Term {
        field,
        value: value.into(),
    }
}

pub fn range(field: TaskField, bound: RangeBound) -> QueryClause {
    QueryClause::Range { field, bound }
}

pub fn ids(keys: Vec<String>) -> QueryClause {
    QueryClause::Ids { keys }
}

/// All of the given clauses must match.
pub fn must_be_all_of(clauses: impl IntoIterator<Item = QueryClause>) -> QueryClause {
    QueryClause::Bool(BoolClause {
        must: clauses.into_iter().collect(),
        ..Default::default()
    })
}

/// At least one of the given clauses must match.
pub fn should_be_one_of(clauses: impl IntoIterator<Item = QueryClause>) -> QueryClause {
    QueryClause::Bool(BoolClause {
        should: clauses.into_iter().collect(),
        ..Default::default()
    })
}

/// Constrain `clause` by a non-scoring `filter` entry.
pub fn filter_down_by(clause: QueryClause, filter: QueryClause) -> QueryClause {
    match clause {
        QueryClause::Bool(mut bool_clause) => {
            bool_clause.filter.push(filter);
            QueryClause::Bool(bool_clause)
        }
        other => QueryClause::Bool(BoolClause {
            must: vec![other],
            filter: vec![filter],
            ..Default::default()
        }),
    }
}

/// Sort key for store queries over task documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TaskSort {
    /// Configured type priority, highest rank first; types missing from the
    /// map rank at [`TaskPriority::Normal`](crate::registry::TaskPriority).
    ByPriority {
        priority_map: std::collections::BTreeMap<crate::domain::TaskType, u8>,
    },
    /// The earlier of `retryAt`/`runAt`, soonest due first.
    ByUrgency,
    /// Requested documents before everything else, in request order.
    PinnedIds { keys: Vec<String> },
}

/// Convenience for building status terms.
pub fn status_term(status: TaskStatus) -> QueryClause {
    term(TaskField::Status, status.as_str())
}
