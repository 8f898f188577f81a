// Argus Host Monitoring Service - Alert Evaluator
// Periodic state machine driving alert transitions and emitting events

use super::store::AlertStore;
use super::{AlertConfig, AlertError, AlertEvent, AlertState, AlertStatus, EvaluatorConfig};
use crate::clock::Clock;
use crate::metrics::MetricSource;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Per-alert debounce bookkeeping, owned by the evaluation loop.
#[derive(Debug, Default, Clone)]
struct DebounceState {
    /// First tick at which the condition held while pending
    pending_since: Option<DateTime<Utc>>,

    /// Consecutive exceeding ticks, counted from the pending transition
    consecutive_exceeds: u32,

    /// Consecutive non-exceeding ticks while active
    resolve_count: u32,
}

/// Evaluation state shared between the public handle and the loop task.
struct EvalCore {
    config: EvaluatorConfig,
    store: Arc<AlertStore>,
    metrics: Arc<dyn MetricSource>,
    clock: Arc<dyn Clock>,
    statuses: RwLock<HashMap<String, AlertStatus>>,
    debounce: Mutex<HashMap<String, DebounceState>>,
    events: Mutex<Option<mpsc::Sender<AlertEvent>>>,
}

impl EvalCore {
    /// One pass over every enabled alert, honouring the shutdown signal
    /// between alerts.
    async fn evaluate_tick(&self, shutdown: &watch::Receiver<bool>) {
        let configs = match self.store.list().await {
            Ok(configs) => configs,
            Err(e) => {
                error!("Alert evaluation skipped, store unavailable: {e}");
                return;
            }
        };

        self.discard_deleted(&configs).await;

        for config in configs.iter().filter(|c| c.enabled) {
            if *shutdown.borrow() {
                debug!("Shutdown requested, stopping evaluation mid-tick");
                return;
            }
            self.evaluate_alert(config).await;
        }
    }

    /// Drop statuses of alerts that no longer exist.
    async fn discard_deleted(&self, configs: &[AlertConfig]) {
        let live: HashSet<&str> = configs.iter().map(|c| c.id.as_str()).collect();
        let mut statuses = self.statuses.write().await;
        statuses.retain(|id, _| live.contains(id.as_str()));
        let mut debounce = self.debounce.lock().await;
        debounce.retain(|id, _| live.contains(id.as_str()));
    }

    /// Advance one alert's state machine by a single tick.
    async fn evaluate_alert(&self, config: &AlertConfig) {
        let value = match self.metrics.current_value(&config.threshold.metric).await {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    alert_id = %config.id,
                    "Metric lookup failed, alert keeps prior state this tick: {e}"
                );
                return;
            }
        };

        let exceeded = config.threshold.operator.compare(value, config.threshold.value);
        let now = self.clock.now();

        let mut statuses = self.statuses.write().await;
        let mut debounce_map = self.debounce.lock().await;

        let status = statuses
            .entry(config.id.clone())
            .or_insert_with(|| AlertStatus::new(&config.id));
        let debounce = debounce_map.entry(config.id.clone()).or_default();

        let old_state = status.state;
        status.current_value = value;

        let transition = match (old_state, exceeded) {
            (AlertState::Inactive, true) => {
                debounce.pending_since = Some(now);
                debounce.consecutive_exceeds = 1;
                status.state = AlertState::Pending;
                status.message = format!(
                    "{}: value {:.2} breached threshold ({} {} {:.2})",
                    config.name,
                    value,
                    config.threshold.metric,
                    config.threshold.operator,
                    config.threshold.value
                );
                true
            }
            (AlertState::Inactive, false) => {
                debounce.pending_since = None;
                debounce.consecutive_exceeds = 0;
                false
            }
            (AlertState::Pending, false) => {
                debounce.pending_since = None;
                debounce.consecutive_exceeds = 0;
                status.state = AlertState::Inactive;
                status.message = format!(
                    "{}: value {:.2} recovered before activation",
                    config.name, value
                );
                true
            }
            (AlertState::Pending, true) => {
                debounce.consecutive_exceeds += 1;
                let activated =
                    if let Some(duration) = config.threshold.duration_secs.filter(|d| *d > 0) {
                        let since = debounce.pending_since.unwrap_or(now);
                        now - since >= ChronoDuration::seconds(duration as i64)
                    } else if let Some(needed) = config.threshold.sustained_for.filter(|n| *n > 0) {
                        debounce.consecutive_exceeds >= needed
                    } else {
                        true
                    };

                if activated {
                    debounce.resolve_count = 0;
                    status.state = AlertState::Active;
                    status.triggered_at = Some(now);
                    status.resolved_at = None;
                    status.message = format!(
                        "{}: value {:.2} sustained past threshold ({} {} {:.2})",
                        config.name,
                        value,
                        config.threshold.metric,
                        config.threshold.operator,
                        config.threshold.value
                    );
                }
                activated
            }
            (AlertState::Active, true) => {
                debounce.resolve_count = 0;
                false
            }
            (AlertState::Active, false) => {
                debounce.resolve_count += 1;
                if debounce.resolve_count >= self.config.alert_resolve_count.max(1) {
                    debounce.pending_since = None;
                    debounce.consecutive_exceeds = 0;
                    debounce.resolve_count = 0;
                    status.state = AlertState::Inactive;
                    status.resolved_at = Some(now);
                    status.triggered_at = None;
                    status.message =
                        format!("{}: value {:.2} back within threshold", config.name, value);
                    true
                } else {
                    false
                }
            }
        };

        if transition {
            let event = AlertEvent {
                alert_id: config.id.clone(),
                old_state,
                new_state: status.state,
                current_value: value,
                threshold: config.threshold.clone(),
                timestamp: now,
                message: status.message.clone(),
                config: config.clone(),
                status: status.clone(),
            };
            debug!(
                alert_id = %config.id,
                from = %old_state,
                to = %status.state,
                "Alert state transition"
            );
            drop(debounce_map);
            drop(statuses);
            self.emit(event).await;
        }
    }

    /// Non-blocking event emission; drops on a full buffer.
    async fn emit(&self, event: AlertEvent) {
        let guard = self.events.lock().await;
        let Some(sender) = guard.as_ref() else {
            debug!("Event channel closed, discarding event");
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    alert_id = %event.alert_id,
                    "Event buffer full, dropping transition event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event channel closed, discarding event");
            }
        }
    }
}

/// Drives every enabled alert's state machine at a fixed interval.
///
/// The loop is the sole writer of the status map; public readers take a
/// shared lock and receive deep copies. Events flow through a bounded
/// channel; a full buffer drops the event but never blocks a state commit.
pub struct AlertEvaluator {
    core: Arc<EvalCore>,
    started: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AlertEvaluator {
    /// Build an evaluator and the receiving end of its event channel.
    pub fn new(
        config: EvaluatorConfig,
        store: Arc<AlertStore>,
        metrics: Arc<dyn MetricSource>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
        let evaluator = Self {
            core: Arc::new(EvalCore {
                config,
                store,
                metrics,
                clock,
                statuses: RwLock::new(HashMap::new()),
                debounce: Mutex::new(HashMap::new()),
                events: Mutex::new(Some(tx)),
            }),
            started: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        };
        (evaluator, rx)
    }

    /// Start the evaluation loop. Idempotent per instance.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Alert evaluator already started");
            return;
        }

        info!(
            interval_secs = self.core.config.evaluation_interval_secs,
            "Starting alert evaluator"
        );

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(tx);

        let core = Arc::clone(&self.core);
        let period = Duration::from_secs(self.core.config.evaluation_interval_secs.max(1));
        let handle = tokio::spawn(async move {
            let mut shutdown = rx;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        core.evaluate_tick(&shutdown).await;
                    }
                    _ = shutdown.changed() => {
                        debug!("Alert evaluator loop exiting");
                        break;
                    }
                }
            }
        });
        *self.handle.lock().await = Some(handle);
    }

    /// Stop the loop, wait for it to exit, then close the event channel.
    ///
    /// The sender is dropped strictly after the join so no in-flight send
    /// can race the close; the notifier drains the buffer and sees the
    /// channel end cleanly.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Alert evaluator loop join failed: {e}");
            }
        }
        self.core.events.lock().await.take();
        info!("Alert evaluator stopped");
    }

    /// Evaluate every enabled alert once. Exposed for tests and for driving
    /// the machine without the background loop.
    pub async fn evaluate_once(&self) {
        let (_tx, rx) = watch::channel(false);
        self.core.evaluate_tick(&rx).await;
    }

    /// Status of one alert, if the evaluator has observed it.
    pub async fn status(&self, alert_id: &str) -> Option<AlertStatus> {
        self.core.statuses.read().await.get(alert_id).cloned()
    }

    /// Deep copy of the whole status map.
    pub async fn all_statuses(&self) -> HashMap<String, AlertStatus> {
        self.core.statuses.read().await.clone()
    }

    /// Fabricate an activation event for an alert without touching its
    /// real status, and push it through the normal channel. Backs the
    /// transport's test-fire endpoint.
    pub async fn synthesize_event(&self, alert_id: &str) -> Result<AlertEvent, AlertError> {
        let config = self.core.store.get(alert_id).await?;
        let now = self.core.clock.now();
        let current_value = config.threshold.value + 1.0;

        let status = AlertStatus {
            alert_id: config.id.clone(),
            state: AlertState::Active,
            current_value,
            triggered_at: Some(now),
            resolved_at: None,
            message: format!("{}: test event", config.name),
        };
        let event = AlertEvent {
            alert_id: config.id.clone(),
            old_state: AlertState::Inactive,
            new_state: AlertState::Active,
            current_value,
            threshold: config.threshold.clone(),
            timestamp: now,
            message: status.message.clone(),
            config,
            status,
        };

        self.core.emit(event.clone()).await;
        Ok(event)
    }
}
