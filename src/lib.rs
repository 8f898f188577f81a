// Argus Host Monitoring Service - Library

pub mod alerts;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod notify;
pub mod pool;
pub mod tasks;

pub use alerts::{AlertConfig, AlertEvaluator, AlertEvent, AlertState, AlertStatus, AlertStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use metrics::{MetricsCollector, ProcessQuery, SysinfoProbe};
pub use notify::{EmailChannel, InAppChannel, Notifier, TemplateRegistry};
pub use tasks::{ExecutionRepository, RunnerRegistry, TaskScheduler, TaskStore};
