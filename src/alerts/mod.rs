// Argus Host Monitoring Service - Alert Module
// Alert configurations, threshold semantics, status lifecycle and events

pub mod evaluator;
pub mod store;

use crate::metrics::MetricKey;
use crate::notify::NotificationConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use evaluator::AlertEvaluator;
pub use store::AlertStore;

/// Evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Evaluation loop interval in seconds
    pub evaluation_interval_secs: u64,

    /// Consecutive non-exceeding ticks before an active alert resolves
    pub alert_resolve_count: u32,

    /// Reserved debounce knob. Accepted and stored, not yet wired into the
    /// state machine: the inactive -> pending edge fires on the first exceed.
    pub alert_debounce_count: u32,

    /// Bounded event channel capacity
    pub event_buffer: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: 30,
            alert_resolve_count: 2,
            alert_debounce_count: 1,
            event_buffer: 100,
        }
    }
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Threshold comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    /// Evaluate `current <op> threshold`.
    ///
    /// Equality and inequality compare bit patterns, so two values must be
    /// the exact same float to be equal. Configurations relying on `==`
    /// against computed metrics should prefer range operators.
    pub fn compare(&self, current: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Gt => current > threshold,
            CompareOp::Ge => current >= threshold,
            CompareOp::Lt => current < threshold,
            CompareOp::Le => current <= threshold,
            CompareOp::Eq => current.to_bits() == threshold.to_bits(),
            CompareOp::Ne => current.to_bits() != threshold.to_bits(),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        };
        write!(f, "{symbol}")
    }
}

/// Alert trigger condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Metric the condition reads
    #[serde(flatten)]
    pub metric: MetricKey,

    /// Comparison operator
    pub operator: CompareOp,

    /// Threshold value
    pub value: f64,

    /// Condition must hold this long before activating, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,

    /// Condition must hold this many consecutive evaluations before activating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sustained_for: Option<u32>,
}

/// A user-defined alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Severity attached to emitted notifications
    pub severity: Severity,

    /// Disabled alerts are skipped by the evaluator
    pub enabled: bool,

    /// Trigger condition
    pub threshold: Threshold,

    /// Delivery targets
    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertConfig {
    /// Validate invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), AlertError> {
        if self.id.trim().is_empty() {
            return Err(AlertError::Validation("alert id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(AlertError::Validation(
                "alert name must not be empty".to_string(),
            ));
        }
        if !self.threshold.value.is_finite() {
            return Err(AlertError::Validation(
                "threshold value must be a finite number".to_string(),
            ));
        }
        if self.threshold.duration_secs.is_some() && self.threshold.sustained_for.is_some() {
            return Err(AlertError::Validation(
                "at most one of duration and sustained_for may be set".to_string(),
            ));
        }
        for notification in &self.notifications {
            notification.validate().map_err(|e| {
                AlertError::Validation(format!("notification config invalid: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Alert lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Inactive,
    Pending,
    Active,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertState::Inactive => write!(f, "inactive"),
            AlertState::Pending => write!(f, "pending"),
            AlertState::Active => write!(f, "active"),
        }
    }
}

/// Mutable evaluation state of one alert. Owned by the evaluator; readers
/// get copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStatus {
    pub alert_id: String,
    pub state: AlertState,
    pub current_value: f64,
    pub triggered_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub message: String,
}

impl AlertStatus {
    pub fn new(alert_id: &str) -> Self {
        Self {
            alert_id: alert_id.to_string(),
            state: AlertState::Inactive,
            current_value: 0.0,
            triggered_at: None,
            resolved_at: None,
            message: format!("Alert {alert_id} initialized"),
        }
    }
}

/// Immutable snapshot emitted on every state transition.
///
/// Self-contained by design: carries copies of the config and status so the
/// notifier never traverses shared mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: String,
    pub old_state: AlertState,
    pub new_state: AlertState,
    pub current_value: f64,
    pub threshold: Threshold,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub config: AlertConfig,
    pub status: AlertStatus,
}

/// Alert subsystem errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    /// Malformed configuration, rejected at the boundary
    Validation(String),

    /// No alert with the given id
    NotFound(String),

    /// Persistence failure
    Storage(String),

    /// Record on disk could not be decoded
    Serialization(String),
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertError::Validation(msg) => write!(f, "invalid alert configuration: {msg}"),
            AlertError::NotFound(id) => write!(f, "alert not found: {id}"),
            AlertError::Storage(msg) => write!(f, "alert storage error: {msg}"),
            AlertError::Serialization(msg) => write!(f, "alert serialization error: {msg}"),
        }
    }
}

impl std::error::Error for AlertError {}
