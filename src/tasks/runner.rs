// Argus Host Monitoring Service - Task Runners
// Built-in maintenance behaviors dispatched by task type

use super::{TaskConfig, TaskType};
use crate::metrics::MetricsCollector;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Executable behavior behind a task type.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Type this runner serves in the registry.
    fn task_type(&self) -> TaskType;

    /// Run the task; the returned string becomes the execution's output.
    async fn execute(&self, task: &TaskConfig) -> Result<String>;
}

/// Task type to runner mapping.
#[derive(Default)]
pub struct RunnerRegistry {
    runners: HashMap<TaskType, Arc<dyn TaskRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all four built-in runners.
    pub fn with_builtins(collector: Arc<MetricsCollector>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LogRotationRunner));
        registry.register(Arc::new(MetricsAggregationRunner::new(Arc::clone(
            &collector,
        ))));
        registry.register(Arc::new(HealthCheckRunner::new(collector)));
        registry.register(Arc::new(SystemCleanupRunner));
        registry
    }

    pub fn register(&mut self, runner: Arc<dyn TaskRunner>) {
        debug!(task_type = %runner.task_type(), "Registered task runner");
        self.runners.insert(runner.task_type(), runner);
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskRunner>> {
        self.runners.get(&task_type).cloned()
    }
}

/// Rotates a log file once it exceeds a size threshold.
///
/// Parameters: `path` (required), `max_size_mb` (default 100),
/// `retain` (default 5 rotated generations).
pub struct LogRotationRunner;

#[async_trait]
impl TaskRunner for LogRotationRunner {
    fn task_type(&self) -> TaskType {
        TaskType::LogRotation
    }

    async fn execute(&self, task: &TaskConfig) -> Result<String> {
        let path = required_param(task, "path")?;
        let max_size_mb: u64 = optional_param(task, "max_size_mb", 100)?;
        let retain: u32 = optional_param(task, "retain", 5)?;
        if retain == 0 {
            bail!("retain must be at least 1");
        }

        let path = PathBuf::from(path);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(format!("{} does not exist, nothing to rotate", path.display()));
            }
            Err(e) => return Err(e).context(format!("inspecting {}", path.display())),
        };

        let size = metadata.len();
        if size < max_size_mb * 1024 * 1024 {
            return Ok(format!(
                "{} is {size} bytes, below the {max_size_mb} MiB threshold",
                path.display()
            ));
        }

        // Shift older generations up, dropping the oldest.
        for generation in (1..retain).rev() {
            let from = rotated_name(&path, generation);
            let to = rotated_name(&path, generation + 1);
            if tokio::fs::metadata(&from).await.is_ok() {
                tokio::fs::rename(&from, &to)
                    .await
                    .context(format!("rotating {}", from.display()))?;
            }
        }
        tokio::fs::rename(&path, rotated_name(&path, 1))
            .await
            .context(format!("rotating {}", path.display()))?;
        tokio::fs::write(&path, b"")
            .await
            .context(format!("recreating {}", path.display()))?;

        info!(path = %path.display(), size, "Rotated log file");
        Ok(format!("rotated {} ({size} bytes)", path.display()))
    }
}

fn rotated_name(path: &Path, generation: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Summarises the collector's current view into a JSON document.
///
/// Parameters: `output_path` (optional; summary is written there as well as
/// returned as the execution output).
pub struct MetricsAggregationRunner {
    collector: Arc<MetricsCollector>,
}

impl MetricsAggregationRunner {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl TaskRunner for MetricsAggregationRunner {
    fn task_type(&self) -> TaskType {
        TaskType::MetricsAggregation
    }

    async fn execute(&self, task: &TaskConfig) -> Result<String> {
        let combined = self.collector.combined().await;
        let summary =
            serde_json::to_string_pretty(&combined).context("serializing metrics summary")?;

        if let Some(output_path) = task.parameters.get("output_path") {
            tokio::fs::write(output_path, summary.as_bytes())
                .await
                .context(format!("writing summary to {output_path}"))?;
        }

        Ok(summary)
    }
}

/// Verifies the collector is fresh and the data directory is writable.
///
/// Parameters: `probe_path` (optional directory to probe with a write/read
/// round trip).
pub struct HealthCheckRunner {
    collector: Arc<MetricsCollector>,
}

impl HealthCheckRunner {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl TaskRunner for HealthCheckRunner {
    fn task_type(&self) -> TaskType {
        TaskType::HealthCheck
    }

    async fn execute(&self, task: &TaskConfig) -> Result<String> {
        if !self.collector.is_healthy().await {
            bail!("metrics collector is stale");
        }

        if let Some(dir) = task.parameters.get("probe_path") {
            let probe = Path::new(dir).join(".argus-health-probe");
            tokio::fs::write(&probe, b"ok")
                .await
                .context(format!("writing probe file in {dir}"))?;
            let read_back = tokio::fs::read(&probe)
                .await
                .context(format!("reading probe file in {dir}"))?;
            let _ = tokio::fs::remove_file(&probe).await;
            if read_back != b"ok" {
                bail!("probe file in {dir} read back corrupted");
            }
        }

        Ok("healthy".to_string())
    }
}

/// Deletes stale files from a directory.
///
/// Parameters: `path` (required), `max_age_hours` (default 24). Only plain
/// files are touched; subdirectories are left alone.
pub struct SystemCleanupRunner;

#[async_trait]
impl TaskRunner for SystemCleanupRunner {
    fn task_type(&self) -> TaskType {
        TaskType::SystemCleanup
    }

    async fn execute(&self, task: &TaskConfig) -> Result<String> {
        let dir = required_param(task, "path")?;
        let max_age_hours: u64 = optional_param(task, "max_age_hours", 24)?;
        let cutoff = Duration::from_secs(max_age_hours * 3600);

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .context(format!("reading {dir}"))?;
        let mut removed = 0usize;
        let mut kept = 0usize;

        while let Some(entry) = entries.next_entry().await.context("iterating directory")? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
                .unwrap_or(Duration::ZERO);

            if age >= cutoff {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => debug!("Could not remove {}: {e}", entry.path().display()),
                }
            } else {
                kept += 1;
            }
        }

        info!(dir, removed, kept, "System cleanup finished");
        Ok(format!("removed {removed} files, kept {kept}"))
    }
}

fn required_param<'a>(task: &'a TaskConfig, key: &str) -> Result<&'a str> {
    task.parameters
        .get(key)
        .map(String::as_str)
        .with_context(|| format!("task {} is missing required parameter {key:?}", task.id))
}

fn optional_param<T: std::str::FromStr>(task: &TaskConfig, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match task.parameters.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("parameter {key:?} of task {}: {e}", task.id)),
        None => Ok(default),
    }
}
