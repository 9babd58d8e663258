//! InMemoryTaskStore - 開発・テスト用のタスクストア
//!
//! 本番ではネットワーク越しのストアアダプタを使う想定。この実装は
//! クエリ AST をそのまま評価して、claim スクリプトの意味論（claimable
//! 判定・attempts 上限・pinned key・unused type の sanitation）を再現する。
//!
//! # 実装詳細
//! - `BTreeMap<String, TaskInstance>` をストアキー順に保持
//! - `tokio::sync::Mutex` で排他制御（ロック跨ぎ await はしない）
//! - 書き込みのたびに `sequence_number` を進める
//!
//! Single-writer by construction, so `version_conflicts` is always zero
//! here; contention accounting is exercised against a mock store instead.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{TaskId, TaskInstance, TaskStatus};
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::task_store::{
    FetchResult, SearchQuery, StoreError, TaskStore, UpdateByQuery, UpdateByQueryResult,
};
use crate::queries::clauses::{QueryClause, TaskSort};
use crate::registry::TaskPriority;

#[derive(Default)]
struct StoreState {
    docs: BTreeMap<String, TaskInstance>,
}

/// In-memory task store implementation.
pub struct InMemoryTaskStore {
    state: Arc<tokio::sync::Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(tokio::sync::Mutex::new(StoreState::default())),
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Store key a task document is filed under. Matches
    /// [`TaskStore::convert_ids_to_store_keys`].
    fn store_key(task_id: &TaskId) -> String {
        format!("task:{}", task_id.as_ulid())
    }

    pub async fn insert(&self, task: TaskInstance) {
        let mut state = self.state.lock().await;
        state.docs.insert(Self::store_key(&task.id), task);
    }

    pub async fn insert_all(&self, tasks: impl IntoIterator<Item = TaskInstance>) {
        let mut state = self.state.lock().await;
        for task in tasks {
            state.docs.insert(Self::store_key(&task.id), task);
        }
    }

    pub async fn get(&self, task_id: TaskId) -> Option<TaskInstance> {
        let state = self.state.lock().await;
        state.docs.get(&Self::store_key(&task_id)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.docs.is_empty()
    }
}

fn pin_rank(keys: &[String], store_key: &str) -> usize {
    keys.iter()
        .position(|key| key == store_key)
        .unwrap_or(usize::MAX)
}

fn compare_tasks(
    a: (&str, &TaskInstance),
    b: (&str, &TaskInstance),
    sort: &[TaskSort],
) -> Ordering {
    for key in sort {
        let ord = match key {
            TaskSort::PinnedIds { keys } => pin_rank(keys, a.0).cmp(&pin_rank(keys, b.0)),
            TaskSort::ByPriority { priority_map } => {
                let rank = |task: &TaskInstance| {
                    priority_map
                        .get(&task.task_type)
                        .copied()
                        .unwrap_or(TaskPriority::Normal.rank())
                };
                // highest rank first
                rank(b.1).cmp(&rank(a.1))
            }
            TaskSort::ByUrgency => a.1.urgency().cmp(&b.1.urgency()),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn matching_keys(
    state: &StoreState,
    query: &QueryClause,
    sort: &[TaskSort],
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut keys: Vec<String> = state
        .docs
        .iter()
        .filter(|(key, doc)| query.matches(doc, key, now))
        .map(|(key, _)| key.clone())
        .collect();
    keys.sort_by(|a, b| {
        compare_tasks(
            (a.as_str(), &state.docs[a]),
            (b.as_str(), &state.docs[b]),
            sort,
        )
    });
    keys
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn fetch(&self, query: SearchQuery) -> Result<FetchResult, StoreError> {
        let now = self.clock.now();
        let state = self.state.lock().await;

        let keys = matching_keys(&state, &query.query, &query.sort, now);
        let total = keys.len() as u32;
        let docs = keys
            .into_iter()
            .take(query.size as usize)
            .map(|key| state.docs[&key].clone())
            .collect();

        Ok(FetchResult { docs, total })
    }

    async fn update_by_query(
        &self,
        update: UpdateByQuery,
    ) -> Result<UpdateByQueryResult, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let keys = matching_keys(&state, &update.query, &update.sort, now);
        let total = keys.len() as u32;

        let script = &update.script;
        let mut updated = 0u32;
        for key in keys {
            if updated >= update.max_docs {
                break;
            }
            let Some(doc) = state.docs.get_mut(&key) else {
                continue;
            };

            if script.claimable_task_types.contains(&doc.task_type) {
                let ceiling = script
                    .task_max_attempts
                    .get(&doc.task_type)
                    .copied()
                    .unwrap_or(0);
                let pinned = script.claim_tasks_by_id.iter().any(|k| k == &key);
                if doc.attempts < ceiling || pinned {
                    doc.status = TaskStatus::Claiming;
                    doc.owner_id = Some(script.field_updates.owner_id);
                    doc.retry_at = Some(script.field_updates.retry_at);
                    doc.sequence_number += 1;
                    updated += 1;
                }
            } else if script.unused_task_types.contains(&doc.task_type) {
                doc.status = TaskStatus::Unrecognized;
                doc.sequence_number += 1;
                updated += 1;
            }
            // every other type: not this batch's business, leave untouched
        }

        Ok(UpdateByQueryResult {
            updated,
            version_conflicts: 0,
            total,
        })
    }
}
