// Argus Host Monitoring Service - Configuration Management
// YAML configuration loading and validation

pub mod loader;
pub mod validator;

use crate::alerts::EvaluatorConfig;
use crate::metrics::CollectorConfig;
use crate::notify::{NotifierConfig, SmtpConfig};
use crate::tasks::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub use loader::load;
pub use validator::validate;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metrics collector settings
    pub collector: CollectorConfig,

    /// Alert evaluator settings
    pub evaluator: EvaluatorConfig,

    /// Notifier settings
    pub notifier: NotifierConfig,

    /// Task scheduler settings
    pub scheduler: SchedulerConfig,

    /// Persistence settings
    pub storage: StorageConfig,

    /// SMTP relay; absent disables the email channel
    pub smtp: Option<SmtpConfig>,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for alert, task and execution documents
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    pub fn alerts_dir(&self) -> PathBuf {
        self.root.join("alerts")
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter (overridden by RUST_LOG)
    pub level: String,

    /// Single-line compact output instead of the full formatter
    pub compact: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            compact: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read
    Io(String),

    /// Config file could not be parsed
    Parse(String),

    /// Parsed configuration violates an invariant
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "reading configuration: {msg}"),
            ConfigError::Parse(msg) => write!(f, "parsing configuration: {msg}"),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.collector.update_interval_secs, 5);
        assert_eq!(config.collector.cache_ttl_secs, 10);
        assert_eq!(config.evaluator.evaluation_interval_secs, 30);
        assert_eq!(config.evaluator.alert_resolve_count, 2);
        assert_eq!(config.notifier.rate_limit, 5);
        assert_eq!(config.notifier.rate_limit_window_secs, 3600);
        assert_eq!(config.notifier.inapp_max_size, 100);
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
collector:
  update_interval_secs: 2
logging:
  level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.collector.update_interval_secs, 2);
        assert_eq!(config.collector.cache_ttl_secs, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.evaluator.alert_resolve_count, 2);
    }

    #[test]
    fn test_storage_layout() {
        let storage = StorageConfig {
            root: PathBuf::from("/var/lib/argus"),
        };
        assert_eq!(storage.alerts_dir(), PathBuf::from("/var/lib/argus/alerts"));
        assert_eq!(storage.tasks_dir(), PathBuf::from("/var/lib/argus/tasks"));
    }

    #[test]
    fn test_smtp_section_parses() {
        let yaml = r#"
smtp:
  host: mail.example.com
  port: 587
  from: argus@example.com
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host, "mail.example.com");
        assert_eq!(smtp.port, 587);
        assert!(smtp.username.is_none());
    }
}
