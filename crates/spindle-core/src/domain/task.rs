//! Task document model.
//!
//! `TaskInstance` mirrors the document shape held by the shared task store
//! (camelCase field names on the wire). Claiming reads the scheduling fields
//! and writes ownership fields; everything else is pass-through payload owned
//! by the task's producer and consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{TaskId, WorkerId};

/// Key into the task type registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Task status as stored in the task document.
///
/// Claimable states:
/// - `Idle` with `run_at` in the past.
/// - `Running`/`Claiming` with an expired `retry_at` lease (abandoned by a
///   crashed or stalled worker).
///
/// `Unrecognized` is written by the store-side claim script for task types
/// that were removed from the deployment; such documents are never claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Claiming,
    Running,
    Failed,
    Unrecognized,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Claiming => "claiming",
            TaskStatus::Running => "running",
            TaskStatus::Failed => "failed",
            TaskStatus::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recurrence rule, opaque to claiming (interpreted by the scheduling
/// producer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub interval: String,
}

fn default_enabled() -> bool {
    true
}

/// One unit of work in the shared store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    pub id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,

    /// Earliest time the task is eligible to run.
    pub run_at: DateTime<Utc>,

    /// Lease deadline. While in the future the task is owned by some worker;
    /// once past, a `Running`/`Claiming` task becomes claimable again.
    #[serde(default)]
    pub retry_at: Option<DateTime<Utc>>,

    /// Claim/execution attempts so far. Incremented by the executor, not by
    /// claiming.
    #[serde(default)]
    pub attempts: u32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Worker that currently owns the task, set atomically by a claim.
    #[serde(default)]
    pub owner_id: Option<WorkerId>,

    // Pass-through payload, untouched by claiming.
    #[serde(default)]
    pub schedule: Option<TaskSchedule>,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub state: serde_json::Value,
    #[serde(default)]
    pub scope: Option<Vec<String>>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub traceparent: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Optimistic-concurrency token, managed by the store. A conditional
    /// update only applies when the stored token still matches.
    #[serde(default)]
    pub sequence_number: u64,
    #[serde(default)]
    pub primary_term: u64,
}

impl TaskInstance {
    /// A freshly scheduled idle task with empty payload fields.
    pub fn new(id: TaskId, task_type: TaskType, run_at: DateTime<Utc>) -> Self {
        Self {
            id,
            task_type,
            status: TaskStatus::Idle,
            run_at,
            retry_at: None,
            attempts: 0,
            enabled: true,
            owner_id: None,
            schedule: None,
            params: serde_json::Value::Null,
            state: serde_json::Value::Null,
            scope: None,
            user: None,
            traceparent: None,
            scheduled_at: run_at,
            started_at: None,
            sequence_number: 0,
            primary_term: 1,
        }
    }

    /// The moment this task becomes (or became) due: the lease deadline when
    /// one is set, the scheduled run time otherwise. Soonest-due tasks sort
    /// first within a type's capacity window.
    pub fn urgency(&self) -> DateTime<Utc> {
        self.retry_at.unwrap_or(self.run_at)
    }
}
