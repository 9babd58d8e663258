//! TaskStore port - the shared persistent store all workers compete over.
//!
//! The store is the only shared mutable resource in the system. All mutation
//! goes through [`TaskStore::update_by_query`], whose optimistic-concurrency
//! check (the document's sequence token) is what stands in for a lock
//! manager: two workers racing for the same document produce one winner and
//! one version conflict, never a double claim.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{TaskId, TaskInstance};
use crate::queries::clauses::{QueryClause, TaskSort};
use crate::queries::mark_claimed::ClaimUpdateScript;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed task store response: {0}")]
    InvalidResponse(String),
}

/// Read-only search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: QueryClause,
    pub sort: Vec<TaskSort>,
    pub size: u32,
}

/// Conditional bulk update request. The store is instructed to proceed past
/// version conflicts: conflicting documents are skipped and counted, never
/// fatal.
#[derive(Debug, Clone)]
pub struct UpdateByQuery {
    pub query: QueryClause,
    pub script: ClaimUpdateScript,
    pub sort: Vec<TaskSort>,
    pub max_docs: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateByQueryResult {
    pub updated: u32,
    pub version_conflicts: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub docs: Vec<TaskInstance>,
    pub total: u32,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn fetch(&self, query: SearchQuery) -> Result<FetchResult, StoreError>;

    async fn update_by_query(
        &self,
        update: UpdateByQuery,
    ) -> Result<UpdateByQueryResult, StoreError>;

    /// Map task ids onto the keys the store files their documents under.
    fn convert_ids_to_store_keys(&self, task_ids: &[TaskId]) -> Vec<String> {
        task_ids
            .iter()
            .map(|id| format!("task:{}", id.as_ulid()))
            .collect()
    }
}
