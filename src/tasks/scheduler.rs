// Argus Host Monitoring Service - Task Scheduler
// Cron-driven dispatcher with overlap prevention and execution recording

use super::runner::RunnerRegistry;
use super::store::{ExecutionRepository, TaskStore};
use super::{cron, SchedulerConfig, TaskConfig, TaskError, TaskExecution};
use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Everything a worker needs to drive one execution to a terminal state.
#[derive(Clone)]
struct ExecutionEnv {
    timeout_secs: u64,
    executions: Arc<ExecutionRepository>,
    runners: Arc<RunnerRegistry>,
    clock: Arc<dyn Clock>,
}

impl ExecutionEnv {
    /// Full execution lifecycle: pending -> running -> completed | failed,
    /// each transition persisted. Persistence loss is logged and ignored.
    async fn execute_and_record(&self, task: TaskConfig, trigger: &'static str) -> TaskExecution {
        let mut execution = TaskExecution::pending(&task.id, self.clock.now());
        execution
            .metadata
            .insert("task_type".to_string(), task.task_type.to_string());
        execution
            .metadata
            .insert("trigger".to_string(), trigger.to_string());
        self.record(&execution).await;

        execution.mark_running(self.clock.now());
        self.record(&execution).await;

        match self.runners.get(task.task_type) {
            None => {
                execution.mark_failed(
                    TaskError::UnknownType(task.task_type.to_string()).to_string(),
                    self.clock.now(),
                );
            }
            Some(runner) => {
                let timeout = Duration::from_secs(self.timeout_secs.max(1));
                match tokio::time::timeout(timeout, runner.execute(&task)).await {
                    Ok(Ok(output)) => {
                        execution.mark_completed(output, self.clock.now());
                    }
                    Ok(Err(e)) => {
                        execution.mark_failed(format!("{e:#}"), self.clock.now());
                    }
                    Err(_) => {
                        execution.mark_failed(
                            format!("timed out after {}s", self.timeout_secs.max(1)),
                            self.clock.now(),
                        );
                    }
                }
            }
        }

        match &execution.error {
            None => info!(
                task_id = %execution.task_id,
                execution_id = %execution.execution_id,
                "Task execution completed"
            ),
            Some(error) => warn!(
                task_id = %execution.task_id,
                execution_id = %execution.execution_id,
                "Task execution failed: {error}"
            ),
        }

        self.record(&execution).await;
        execution
    }

    async fn record(&self, execution: &TaskExecution) {
        if let Err(e) = self.executions.record(execution).await {
            warn!(
                task_id = %execution.task_id,
                "Could not persist execution record: {e}"
            );
        }
    }
}

/// Dispatch state shared between the public handle and the loop task.
struct SchedCore {
    store: Arc<TaskStore>,
    clock: Arc<dyn Clock>,
    env: ExecutionEnv,
    running: Arc<Mutex<HashSet<String>>>,
    next_runs: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SchedCore {
    /// One dispatcher pass: compute due tasks and spawn their workers.
    async fn poll_once(&self) {
        let tasks = match self.store.list().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Task dispatch skipped, store unavailable: {e}");
                return;
            }
        };

        let now = self.clock.now();
        let live: HashSet<&str> = tasks
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.id.as_str())
            .collect();
        {
            let mut next_runs = self.next_runs.lock().await;
            next_runs.retain(|id, _| live.contains(id.as_str()));
        }

        for task in tasks.into_iter().filter(|t| t.enabled) {
            if let Err(e) = self.consider(task, now).await {
                error!("Dispatch failed: {e}");
            }
        }
    }

    /// Decide whether one task is due, and dispatch it if so.
    async fn consider(&self, task: TaskConfig, now: DateTime<Utc>) -> Result<(), TaskError> {
        if task.schedule.one_time {
            let Some(due_at) = task.schedule.next_run_time else {
                return Ok(());
            };
            if due_at > now {
                return Ok(());
            }

            // Deactivate before dispatch so later polls cannot re-run it.
            let mut spent = task.clone();
            spent.schedule.next_run_time = None;
            if let Err(e) = self.store.update(&spent).await {
                warn!(task_id = %task.id, "Could not clear one-time schedule: {e}");
            }

            self.dispatch(task, "scheduled").await;
            return Ok(());
        }

        let Some(expression) = task.schedule.cron_expression.clone() else {
            return Ok(());
        };

        let due_at = {
            let mut next_runs = self.next_runs.lock().await;
            match next_runs.get(&task.id) {
                Some(due_at) => *due_at,
                None => {
                    // First sight of this task: compute its slot and wait.
                    let Some(next) = cron::next_run(&expression, now)? else {
                        return Ok(());
                    };
                    next_runs.insert(task.id.clone(), next);
                    self.persist_next_run(&task, next).await;
                    return Ok(());
                }
            }
        };

        if due_at > now {
            return Ok(());
        }

        if let Some(next) = cron::next_run(&expression, now)? {
            self.next_runs.lock().await.insert(task.id.clone(), next);
            self.persist_next_run(&task, next).await;
        }

        self.dispatch(task, "scheduled").await;
        Ok(())
    }

    /// Record the computed next run on the stored config so readers see it.
    async fn persist_next_run(&self, task: &TaskConfig, next: DateTime<Utc>) {
        let mut updated = task.clone();
        updated.schedule.next_run_time = Some(next);
        if let Err(e) = self.store.update(&updated).await {
            warn!(task_id = %task.id, "Could not persist next run time: {e}");
        }
    }

    /// Spawn a worker for the task unless an instance is already running.
    async fn dispatch(&self, task: TaskConfig, trigger: &'static str) {
        {
            let mut running = self.running.lock().await;
            if !running.insert(task.id.clone()) {
                warn!(
                    task_id = %task.id,
                    "Skipping dispatch, previous instance still running"
                );
                return;
            }
        }

        let env = self.env.clone();
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let task_id = task.id.clone();
            env.execute_and_record(task, trigger).await;
            running.lock().await.remove(&task_id);
        });
    }

    /// Run one task on demand, bypassing the schedule but honouring the
    /// no-overlap rule. Returns the terminal execution record.
    async fn run_task_now(&self, id: &str) -> Result<TaskExecution, TaskError> {
        let task = self.store.get(id).await?;

        {
            let mut running = self.running.lock().await;
            if !running.insert(task.id.clone()) {
                return Err(TaskError::AlreadyRunning(task.id));
            }
        }

        let execution = self.env.execute_and_record(task, "manual").await;
        self.running.lock().await.remove(id);
        Ok(execution)
    }
}

/// Dispatches enabled tasks at their due instants.
///
/// One dispatcher loop; one worker task per running execution. Two
/// invocations of the same task never overlap: the dispatcher skips (and
/// `run_task_now` refuses) while a prior instance is still running.
pub struct TaskScheduler {
    config: SchedulerConfig,
    core: Arc<SchedCore>,
    started: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<TaskStore>,
        executions: Arc<ExecutionRepository>,
        runners: Arc<RunnerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let env = ExecutionEnv {
            timeout_secs: config.default_timeout_secs,
            executions,
            runners,
            clock: Arc::clone(&clock),
        };
        Self {
            config,
            core: Arc::new(SchedCore {
                store,
                clock,
                env,
                running: Arc::new(Mutex::new(HashSet::new())),
                next_runs: Mutex::new(HashMap::new()),
            }),
            started: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Start the dispatcher loop. Idempotent per instance.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Task scheduler already started");
            return;
        }

        info!(
            check_interval_secs = self.config.check_interval_secs,
            "Starting task scheduler"
        );

        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(tx);

        let core = Arc::clone(&self.core);
        let period = Duration::from_secs(self.config.check_interval_secs.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        core.poll_once().await;
                    }
                    _ = rx.changed() => {
                        debug!("Task scheduler loop exiting");
                        break;
                    }
                }
            }
        });
        *self.handle.lock().await = Some(handle);
    }

    /// Stop the dispatcher and wait for it to exit. Already-spawned workers
    /// finish on their own and record their executions.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Task scheduler loop join failed: {e}");
            }
        }
        info!("Task scheduler stopped");
    }

    /// One dispatcher pass, outside the periodic loop.
    pub async fn poll_once(&self) {
        self.core.poll_once().await;
    }

    /// Run one task on demand; conflicts while an instance is running.
    pub async fn run_task_now(&self, id: &str) -> Result<TaskExecution, TaskError> {
        self.core.run_task_now(id).await
    }

    /// Recent execution records for a task.
    pub async fn executions(&self, task_id: &str, limit: usize) -> Result<Vec<TaskExecution>, TaskError> {
        self.core.env.executions.list(task_id, limit).await
    }
}
