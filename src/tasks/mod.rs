// Argus Host Monitoring Service - Task Module
// Maintenance task definitions, schedules and execution records

pub mod cron;
pub mod runner;
pub mod scheduler;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub use runner::{RunnerRegistry, TaskRunner};
pub use scheduler::TaskScheduler;
pub use store::{ExecutionRepository, TaskStore};

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Dispatcher poll interval in seconds
    pub check_interval_secs: u64,

    /// Per-task execution timeout in seconds
    pub default_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            default_timeout_secs: 3600,
        }
    }
}

/// Built-in maintenance task types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    LogRotation,
    MetricsAggregation,
    HealthCheck,
    SystemCleanup,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::LogRotation => write!(f, "log_rotation"),
            TaskType::MetricsAggregation => write!(f, "metrics_aggregation"),
            TaskType::HealthCheck => write!(f, "health_check"),
            TaskType::SystemCleanup => write!(f, "system_cleanup"),
        }
    }
}

/// When a task runs.
///
/// Cron tasks recur; one-time tasks fire once at `next_run_time` and are
/// then deactivated by clearing it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSchedule {
    /// Standard five-field cron expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,

    /// Run exactly once at `next_run_time`
    #[serde(default)]
    pub one_time: bool,

    /// Next due instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_time: Option<DateTime<Utc>>,
}

/// A user-defined maintenance task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Runner selecting the task's behavior
    #[serde(rename = "type")]
    pub task_type: TaskType,

    /// Disabled tasks are never dispatched
    pub enabled: bool,

    pub schedule: TaskSchedule,

    /// Runner parameters
    #[serde(default)]
    pub parameters: HashMap<String, String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskConfig {
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.id.trim().is_empty() {
            return Err(TaskError::Validation("task id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(TaskError::Validation(
                "task name must not be empty".to_string(),
            ));
        }
        if self.schedule.cron_expression.is_none() && !self.schedule.one_time {
            return Err(TaskError::Validation(
                "task needs a cron expression or one_time".to_string(),
            ));
        }
        if let Some(expression) = &self.schedule.cron_expression {
            cron::parse(expression)?;
        }
        Ok(())
    }
}

/// Execution lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Record of one task run. Terminal records are never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub execution_id: String,
    pub task_id: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub output: String,
    pub error: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl TaskExecution {
    /// Fresh pending record for a task.
    pub fn pending(task_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            status: ExecutionStatus::Pending,
            start_time: now,
            end_time: None,
            output: String::new(),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Running;
        self.start_time = now;
    }

    pub fn mark_completed(&mut self, output: String, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Completed;
        self.output = output;
        self.end_time = Some(now);
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error);
        self.end_time = Some(now);
    }
}

/// Task subsystem errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Malformed task configuration
    Validation(String),

    /// Cron expression could not be parsed
    InvalidCron(String),

    /// No task with the given id
    NotFound(String),

    /// The task already has an instance running
    AlreadyRunning(String),

    /// No runner registered for the task type
    UnknownType(String),

    /// Persistence failure
    Storage(String),

    /// Record on disk could not be decoded
    Serialization(String),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Validation(msg) => write!(f, "invalid task configuration: {msg}"),
            TaskError::InvalidCron(msg) => write!(f, "invalid cron expression: {msg}"),
            TaskError::NotFound(id) => write!(f, "task not found: {id}"),
            TaskError::AlreadyRunning(id) => write!(f, "task already running: {id}"),
            TaskError::UnknownType(kind) => write!(f, "no runner for task type: {kind}"),
            TaskError::Storage(msg) => write!(f, "task storage error: {msg}"),
            TaskError::Serialization(msg) => write!(f, "task serialization error: {msg}"),
        }
    }
}

impl std::error::Error for TaskError {}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_task(id: &str) -> TaskConfig {
        TaskConfig {
            id: id.to_string(),
            name: format!("{id} task"),
            task_type: TaskType::HealthCheck,
            enabled: true,
            schedule: TaskSchedule {
                cron_expression: Some("*/5 * * * *".to_string()),
                one_time: false,
                next_run_time: None,
            },
            parameters: HashMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_task_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskType::LogRotation).unwrap(),
            r#""log_rotation""#
        );
        let kind: TaskType = serde_json::from_str(r#""system_cleanup""#).unwrap();
        assert_eq!(kind, TaskType::SystemCleanup);

        let unknown: Result<TaskType, _> = serde_json::from_str(r#""disk_defrag""#);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_validate_requires_some_schedule() {
        let mut task = sample_task("t");
        task.schedule.cron_expression = None;
        task.schedule.one_time = false;
        assert!(matches!(task.validate(), Err(TaskError::Validation(_))));

        task.schedule.one_time = true;
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_cron() {
        let mut task = sample_task("t");
        task.schedule.cron_expression = Some("not a cron".to_string());
        assert!(matches!(task.validate(), Err(TaskError::InvalidCron(_))));
    }

    #[test]
    fn test_execution_lifecycle_timestamps() {
        let start = Utc::now();
        let mut execution = TaskExecution::pending("t", start);
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert!(!execution.status.is_terminal());

        let running_at = start + chrono::Duration::seconds(1);
        execution.mark_running(running_at);
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(execution.start_time, running_at);

        let done_at = running_at + chrono::Duration::seconds(2);
        execution.mark_completed("ok".to_string(), done_at);
        assert!(execution.status.is_terminal());
        assert_eq!(execution.output, "ok");
        assert!(execution.end_time.unwrap() >= execution.start_time);
    }

    #[test]
    fn test_task_serialization_uses_type_field() {
        let task = sample_task("t");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "health_check");
        assert_eq!(json["schedule"]["cron_expression"], "*/5 * * * *");
    }
}
