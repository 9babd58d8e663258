//! Task type registry: name -> concurrency limit, retry ceiling, priority.
//!
//! Design:
//! - Built during initialization (mutable).
//! - Used during claim cycles (immutable).
//! This avoids locks and keeps a cycle's view of the registry stable.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::domain::TaskType;

/// Sort rank of a task type when competing for claim capacity.
///
/// The claim sort orders candidates by rank descending before tie-breaking
/// on urgency, so `High` types fill a batch's window first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl TaskPriority {
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Normal => 50,
            TaskPriority::High => 100,
        }
    }
}

/// Static configuration of one task type.
///
/// - `max_concurrency`: `None` = unlimited, `Some(0)` = disabled (never
///   claimable), `Some(n)` = at most `n` claimed per batch.
/// - `max_attempts`: per-type retry ceiling; falls back to the claimer-wide
///   default when `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDefinition {
    pub max_concurrency: Option<u32>,
    pub max_attempts: Option<u32>,
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("task definition for task_type={0} is already registered")]
    AlreadyRegistered(TaskType),

    #[error("unrecognized task type {0}")]
    Unregistered(TaskType),
}

/// Registry of task definitions (task_type -> definition).
///
/// Registration order is preserved: skipped-type lists and batch plans are
/// reported in the order operators declared the types, which keeps
/// diagnostics stable across cycles.
#[derive(Debug, Default)]
pub struct TaskTypeRegistry {
    definitions: HashMap<TaskType, TaskDefinition>,
    order: Vec<TaskType>,
}

impl TaskTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        task_type: TaskType,
        definition: TaskDefinition,
    ) -> Result<(), RegistryError> {
        if self.definitions.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(task_type));
        }
        self.order.push(task_type.clone());
        self.definitions.insert(task_type, definition);
        Ok(())
    }

    pub fn get(&self, task_type: &TaskType) -> Option<&TaskDefinition> {
        self.definitions.get(task_type)
    }

    /// Like [`get`](Self::get), but an unregistered type is an error rather
    /// than an absence. Unregistered types are always excluded from claiming.
    pub fn definition(&self, task_type: &TaskType) -> Result<&TaskDefinition, RegistryError> {
        self.definitions
            .get(task_type)
            .ok_or_else(|| RegistryError::Unregistered(task_type.clone()))
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.definitions.contains_key(task_type)
    }

    /// Registered types, in registration order.
    pub fn task_types(&self) -> impl Iterator<Item = &TaskType> {
        self.order.iter()
    }

    /// Configured concurrency limit; `None` when the type is unregistered or
    /// unlimited.
    pub fn limit(&self, task_type: &TaskType) -> Option<u32> {
        self.get(task_type)?.max_concurrency
    }

    pub fn max_attempts(&self, task_type: &TaskType) -> Option<u32> {
        self.get(task_type)?.max_attempts
    }

    pub fn priority(&self, task_type: &TaskType) -> TaskPriority {
        self.get(task_type)
            .and_then(|def| def.priority)
            .unwrap_or_default()
    }

    /// Ranks of all types with a non-default priority. Types absent from the
    /// map sort at `TaskPriority::Normal.rank()`.
    pub fn priority_map(&self) -> BTreeMap<TaskType, u8> {
        self.order
            .iter()
            .filter_map(|ty| {
                let priority = self.get(ty).and_then(|def| def.priority)?;
                (priority != TaskPriority::Normal).then(|| (ty.clone(), priority.rank()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(n: u32) -> TaskDefinition {
        TaskDefinition {
            max_concurrency: Some(n),
            ..Default::default()
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = TaskTypeRegistry::new();
        registry
            .register(TaskType::new("report"), TaskDefinition::default())
            .unwrap();
        registry.register(TaskType::new("backfill"), limited(2)).unwrap();

        assert!(registry.contains(&TaskType::new("report")));
        assert_eq!(registry.limit(&TaskType::new("report")), None);
        assert_eq!(registry.limit(&TaskType::new("backfill")), Some(2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = TaskTypeRegistry::new();
        registry
            .register(TaskType::new("report"), TaskDefinition::default())
            .unwrap();

        let err = registry
            .register(TaskType::new("report"), limited(1))
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered(TaskType::new("report")));
    }

    #[test]
    fn unregistered_type_is_an_error() {
        let registry = TaskTypeRegistry::new();
        let err = registry.definition(&TaskType::new("ghost")).unwrap_err();
        assert_eq!(err, RegistryError::Unregistered(TaskType::new("ghost")));
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut registry = TaskTypeRegistry::new();
        for name in ["zebra", "apple", "mango"] {
            registry
                .register(TaskType::new(name), TaskDefinition::default())
                .unwrap();
        }

        let order: Vec<&str> = registry.task_types().map(TaskType::as_str).collect();
        assert_eq!(order, vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn priority_defaults_to_normal_and_map_omits_default() {
        let mut registry = TaskTypeRegistry::new();
        registry
            .register(TaskType::new("report"), TaskDefinition::default())
            .unwrap();
        registry
            .register(
                TaskType::new("cleanup"),
                TaskDefinition {
                    priority: Some(TaskPriority::Low),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(registry.priority(&TaskType::new("report")), TaskPriority::Normal);
        assert_eq!(registry.priority(&TaskType::new("cleanup")), TaskPriority::Low);

        let map = registry.priority_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&TaskType::new("cleanup")), Some(&1));
    }
}
