use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use spindle_core::claim::{ClaimOwnershipOptions, TaskClaiming, TaskClaimingOpts, ThreadRngShuffler};
use spindle_core::domain::{TaskId, TaskInstance, TaskStatus, TaskType, WorkerId};
use spindle_core::error::SpindleError;
use spindle_core::impls::InMemoryTaskStore;
use spindle_core::ports::TaskStore;
use spindle_core::registry::{TaskDefinition, TaskPriority, TaskTypeRegistry};

fn seed_task(task_type: &str, minutes_overdue: i64) -> TaskInstance {
    let mut task = TaskInstance::new(
        TaskId::from_ulid(Ulid::new()),
        TaskType::new(task_type),
        Utc::now() - Duration::minutes(minutes_overdue),
    );
    task.params = serde_json::json!({ "demo": true });
    task
}

fn demo_registry() -> Result<TaskTypeRegistry, SpindleError> {
    let mut registry = TaskTypeRegistry::new();
    registry.register(TaskType::new("report"), TaskDefinition::default())?;
    registry.register(
        TaskType::new("notification"),
        TaskDefinition {
            max_concurrency: Some(2),
            priority: Some(TaskPriority::High),
            ..Default::default()
        },
    )?;
    registry.register(
        TaskType::new("cleanup"),
        TaskDefinition {
            max_concurrency: Some(1),
            priority: Some(TaskPriority::Low),
            ..Default::default()
        },
    )?;
    Ok(registry)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();
    tracing::info!("spindle claim demo starting");

    // (A) タスク型を登録（無制限 / 上限つき / 優先度つき）
    let registry = demo_registry().expect("demo types are distinct");

    // (B) ストアに仕事を入れる（期限切れ lease の再回収も 1 件混ぜる）
    let store = Arc::new(InMemoryTaskStore::with_system_clock());
    store
        .insert_all([
            seed_task("report", 5),
            seed_task("report", 3),
            seed_task("report", 1),
            seed_task("notification", 4),
            seed_task("notification", 2),
            seed_task("notification", 1),
            seed_task("cleanup", 10),
            seed_task("cleanup", 8),
        ])
        .await;

    let mut abandoned = seed_task("report", 30);
    abandoned.status = TaskStatus::Running;
    abandoned.owner_id = Some(WorkerId::from_ulid(Ulid::new()));
    abandoned.retry_at = Some(Utc::now() - Duration::minutes(10)); // lease expired
    store.insert(abandoned).await;

    let mut not_yet_due = seed_task("report", 0);
    not_yet_due.run_at = Utc::now() + Duration::hours(1);
    store.insert(not_yet_due).await;

    // (C) claimer を組み立てる
    let claiming = Arc::new(TaskClaiming::new(TaskClaimingOpts {
        registry: Arc::new(registry),
        store: Arc::clone(&store) as Arc<dyn TaskStore>,
        worker_id: WorkerId::from_ulid(Ulid::new()),
        max_attempts: 5,
        capacity: Arc::new(|ty: Option<&TaskType>| match ty.map(TaskType::as_str) {
            Some("notification") => 2,
            Some("cleanup") => 1,
            _ => 8,
        }),
        excluded_task_types: Vec::new(),
        unused_task_types: Vec::new(),
        shuffler: Arc::new(ThreadRngShuffler),
    }));
    println!("worker: {}", claiming.worker_id());

    // (D) イベント購読（executor / metrics の代役）
    let mut events = claiming.events();
    let subscriber = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.outcome {
                Ok(task) => println!(
                    "  event: claimed {} ({}) params={}",
                    event.task_id, task.task_type, task.params
                ),
                Err(err) => println!("  event: {} -> {err}", event.task_id),
            }
        }
    });

    // (E) claim サイクルを 2 回まわす（2 回目はほぼ空振りになるはず）
    for cycle in 1..=2 {
        let results = claiming
            .claim_available_tasks(ClaimOwnershipOptions::until(
                Utc::now() + Duration::seconds(30),
            ))
            .await
            .expect("in-memory store does not fail");

        println!("cycle {cycle}:");
        for (index, batch) in results.iter().enumerate() {
            println!(
                "  batch {index}: updated={} conflicted={} claimed={}",
                batch.stats.tasks_updated, batch.stats.tasks_conflicted, batch.stats.tasks_claimed
            );
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    // デモなのでここで止める（本番は graceful shutdown を設計する）
    subscriber.abort();
}
