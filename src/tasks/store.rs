// Argus Host Monitoring Service - Task Store
// File-backed task configurations and append-only execution records

use super::{TaskConfig, TaskError, TaskExecution};
use crate::pool::{buffer_pool, BufferPool};
use std::path::{Path, PathBuf};
use tracing::warn;

/// File-backed store of task configurations.
///
/// Layout: `<root>/<id>.json`, atomic replace on write.
pub struct TaskStore {
    root: PathBuf,
    buffers: BufferPool,
}

impl TaskStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, TaskError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| TaskError::Storage(format!("creating {}: {e}", root.display())))?;
        Ok(Self {
            root,
            buffers: buffer_pool(4),
        })
    }

    pub async fn list(&self) -> Result<Vec<TaskConfig>, TaskError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| TaskError::Storage(format!("reading {}: {e}", self.root.display())))?;

        let mut tasks = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TaskError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_task(&path).await {
                Ok(task) => tasks.push(task),
                Err(e) => warn!("Skipping unreadable task document {}: {e}", path.display()),
            }
        }

        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    pub async fn get(&self, id: &str) -> Result<TaskConfig, TaskError> {
        validate_id(id)?;
        let path = self.path_for(id);
        if !path.exists() {
            return Err(TaskError::NotFound(id.to_string()));
        }
        read_task(&path).await
    }

    pub async fn create(&self, task: &TaskConfig) -> Result<(), TaskError> {
        task.validate()?;
        validate_id(&task.id)?;
        if self.path_for(&task.id).exists() {
            return Err(TaskError::Validation(format!(
                "task {} already exists",
                task.id
            )));
        }
        self.write_atomic(task).await
    }

    pub async fn update(&self, task: &TaskConfig) -> Result<(), TaskError> {
        task.validate()?;
        validate_id(&task.id)?;
        if !self.path_for(&task.id).exists() {
            return Err(TaskError::NotFound(task.id.clone()));
        }
        self.write_atomic(task).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), TaskError> {
        validate_id(id)?;
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TaskError::NotFound(id.to_string()))
            }
            Err(e) => Err(TaskError::Storage(e.to_string())),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn write_atomic(&self, task: &TaskConfig) -> Result<(), TaskError> {
        let path = self.path_for(&task.id);
        let tmp = self.root.join(format!("{}.json.tmp", task.id));

        let mut buf = self.buffers.acquire();
        let result = write_json(&mut buf, task, &tmp, &path).await;
        self.buffers.release(buf);
        result
    }
}

/// Append-only execution records under `executions/<task_id>/<execution_id>.json`.
///
/// Lifecycle transitions re-write the same document; terminal records are
/// never touched again.
pub struct ExecutionRepository {
    root: PathBuf,
    buffers: BufferPool,
}

impl ExecutionRepository {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, TaskError> {
        let root = root.into().join("executions");
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| TaskError::Storage(format!("creating {}: {e}", root.display())))?;
        Ok(Self {
            root,
            buffers: buffer_pool(4),
        })
    }

    /// Persist the execution's current state.
    pub async fn record(&self, execution: &TaskExecution) -> Result<(), TaskError> {
        validate_id(&execution.task_id)?;
        let dir = self.root.join(&execution.task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| TaskError::Storage(format!("creating {}: {e}", dir.display())))?;

        let path = dir.join(format!("{}.json", execution.execution_id));
        let tmp = dir.join(format!("{}.json.tmp", execution.execution_id));

        let mut buf = self.buffers.acquire();
        let result = write_json(&mut buf, execution, &tmp, &path).await;
        self.buffers.release(buf);
        result
    }

    /// Most recent executions of a task, newest first.
    pub async fn list(&self, task_id: &str, limit: usize) -> Result<Vec<TaskExecution>, TaskError> {
        validate_id(task_id)?;
        let dir = self.root.join(task_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TaskError::Storage(e.to_string())),
        };

        let mut executions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TaskError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = tokio::fs::read(&path)
                .await
                .map_err(|e| TaskError::Storage(e.to_string()))?;
            match serde_json::from_slice::<TaskExecution>(&raw) {
                Ok(execution) => executions.push(execution),
                Err(e) => warn!(
                    "Skipping unreadable execution record {}: {e}",
                    path.display()
                ),
            }
        }

        executions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        executions.truncate(limit);
        Ok(executions)
    }
}

async fn write_json<T: serde::Serialize>(
    buf: &mut Vec<u8>,
    value: &T,
    tmp: &Path,
    path: &Path,
) -> Result<(), TaskError> {
    serde_json::to_writer_pretty(&mut *buf, value)
        .map_err(|e| TaskError::Serialization(e.to_string()))?;
    tokio::fs::write(tmp, &buf)
        .await
        .map_err(|e| TaskError::Storage(format!("writing {}: {e}", tmp.display())))?;
    tokio::fs::rename(tmp, path)
        .await
        .map_err(|e| TaskError::Storage(format!("replacing {}: {e}", path.display())))
}

fn validate_id(id: &str) -> Result<(), TaskError> {
    if id.is_empty() {
        return Err(TaskError::Validation("task id must not be empty".to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(TaskError::Validation(format!(
            "task id {id:?} contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

async fn read_task(path: &Path) -> Result<TaskConfig, TaskError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| TaskError::Storage(format!("reading {}: {e}", path.display())))?;
    serde_json::from_slice(&raw).map_err(|e| TaskError::Serialization(e.to_string()))
}
