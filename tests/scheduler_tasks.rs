// Argus Host Monitoring Service - Scheduler Integration Tests
// Built-in runners wired through the dispatcher and execution repository

use argus::clock::{Clock, SystemClock};
use argus::metrics::{
    CollectorConfig, CpuMetrics, MemoryMetrics, MetricsCollector, MetricsError, NetworkMetrics,
    ProcessRecord, SystemProbe,
};
use argus::tasks::{
    ExecutionRepository, RunnerRegistry, SchedulerConfig, TaskConfig, TaskScheduler, TaskStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::tempdir;

struct StaticProbe;

#[async_trait]
impl SystemProbe for StaticProbe {
    async fn sample_cpu(&self) -> Result<CpuMetrics, MetricsError> {
        Ok(CpuMetrics {
            usage_percent: 12.0,
            load1: 0.4,
            load5: 0.3,
            load15: 0.2,
        })
    }

    async fn sample_memory(&self) -> Result<MemoryMetrics, MetricsError> {
        Ok(MemoryMetrics {
            total: 16 << 30,
            used: 4 << 30,
            free: 12 << 30,
            used_percent: 25.0,
        })
    }

    async fn sample_network(&self) -> Result<NetworkMetrics, MetricsError> {
        Ok(NetworkMetrics::default())
    }

    async fn sample_processes(&self) -> Result<Vec<ProcessRecord>, MetricsError> {
        Ok(vec![ProcessRecord {
            pid: 1,
            name: "init".to_string(),
            cpu_percent: 0.1,
            mem_percent: 0.1,
        }])
    }
}

async fn scheduler_fixture(
    root: &std::path::Path,
) -> (Arc<TaskScheduler>, Arc<TaskStore>, Arc<MetricsCollector>) {
    let collector = Arc::new(MetricsCollector::new(
        CollectorConfig::default(),
        Arc::new(StaticProbe),
        Arc::new(SystemClock),
    ));
    collector.sample_once().await;

    let store = Arc::new(TaskStore::open(root.join("tasks")).await.unwrap());
    let executions = Arc::new(ExecutionRepository::open(root.join("tasks")).await.unwrap());
    let runners = Arc::new(RunnerRegistry::with_builtins(Arc::clone(&collector)));

    let scheduler = Arc::new(TaskScheduler::new(
        SchedulerConfig::default(),
        Arc::clone(&store),
        executions,
        runners,
        Arc::new(SystemClock) as Arc<dyn Clock>,
    ));

    (scheduler, store, collector)
}

fn one_time(id: &str, task_type: argus::tasks::TaskType, params: &[(&str, &str)]) -> TaskConfig {
    TaskConfig {
        id: id.to_string(),
        name: format!("{id} task"),
        task_type,
        enabled: true,
        schedule: argus::tasks::TaskSchedule {
            cron_expression: None,
            one_time: true,
            next_run_time: Some(Utc::now()),
        },
        parameters: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_cleanup_task_end_to_end() {
    let dir = tempdir().unwrap();
    let (scheduler, store, _collector) = scheduler_fixture(dir.path()).await;

    let junk = dir.path().join("junk");
    tokio::fs::create_dir_all(&junk).await.unwrap();
    tokio::fs::write(junk.join("stale.tmp"), b"x").await.unwrap();

    store
        .create(&one_time(
            "tidy",
            argus::tasks::TaskType::SystemCleanup,
            &[("path", junk.to_str().unwrap()), ("max_age_hours", "0")],
        ))
        .await
        .unwrap();

    let execution = scheduler.run_task_now("tidy").await.unwrap();
    assert_eq!(execution.status, argus::tasks::ExecutionStatus::Completed);
    assert!(execution.output.contains("removed 1"));
    assert!(!junk.join("stale.tmp").exists());

    // Execution persisted under executions/<task_id>/.
    let listed = scheduler.executions("tidy", 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].execution_id, execution.execution_id);
    assert!(dir
        .path()
        .join("tasks")
        .join("executions")
        .join("tidy")
        .join(format!("{}.json", execution.execution_id))
        .exists());
}

#[tokio::test]
async fn test_health_check_task_against_live_collector() {
    let dir = tempdir().unwrap();
    let (scheduler, store, _collector) = scheduler_fixture(dir.path()).await;

    store
        .create(&one_time(
            "health",
            argus::tasks::TaskType::HealthCheck,
            &[("probe_path", dir.path().to_str().unwrap())],
        ))
        .await
        .unwrap();

    let execution = scheduler.run_task_now("health").await.unwrap();
    assert_eq!(execution.status, argus::tasks::ExecutionStatus::Completed);
    assert_eq!(execution.output, "healthy");
}

#[tokio::test]
async fn test_metrics_aggregation_task_writes_snapshot() {
    let dir = tempdir().unwrap();
    let (scheduler, store, _collector) = scheduler_fixture(dir.path()).await;

    let out = dir.path().join("metrics.json");
    store
        .create(&one_time(
            "aggregate",
            argus::tasks::TaskType::MetricsAggregation,
            &[("output_path", out.to_str().unwrap())],
        ))
        .await
        .unwrap();

    let execution = scheduler.run_task_now("aggregate").await.unwrap();
    assert_eq!(execution.status, argus::tasks::ExecutionStatus::Completed);

    let written = tokio::fs::read_to_string(&out).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed["cpu"]["data"]["usage_percent"], 12.0);
    assert_eq!(parsed["memory"]["data"]["used_percent"], 25.0);
}

#[tokio::test]
async fn test_failed_execution_recorded_with_error() {
    let dir = tempdir().unwrap();
    let (scheduler, store, _collector) = scheduler_fixture(dir.path()).await;

    // log_rotation without its required parameter fails inside the runner.
    store
        .create(&one_time(
            "rotate",
            argus::tasks::TaskType::LogRotation,
            &[],
        ))
        .await
        .unwrap();

    let execution = scheduler.run_task_now("rotate").await.unwrap();
    assert_eq!(execution.status, argus::tasks::ExecutionStatus::Failed);
    assert!(execution
        .error
        .as_ref()
        .unwrap()
        .contains("missing required parameter"));
    assert!(execution.end_time.unwrap() >= execution.start_time);

    let listed = scheduler.executions("rotate", 10).await.unwrap();
    assert_eq!(listed[0].status, argus::tasks::ExecutionStatus::Failed);
}
