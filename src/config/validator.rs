// Argus Host Monitoring Service - Configuration Validation
// Rejects configurations that would break loop cadence or persistence

use super::{Config, ConfigError};

/// Validate a parsed configuration.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.collector.update_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "collector.update_interval_secs must be positive".to_string(),
        ));
    }
    if config.collector.cache_ttl_secs == 0 {
        return Err(ConfigError::Invalid(
            "collector.cache_ttl_secs must be positive".to_string(),
        ));
    }
    if config.collector.process_limit == 0 {
        return Err(ConfigError::Invalid(
            "collector.process_limit must be positive".to_string(),
        ));
    }
    if config.collector.process_probe_timeout_secs == 0
        || config.collector.probe_timeout_secs == 0
    {
        return Err(ConfigError::Invalid(
            "collector probe timeouts must be positive".to_string(),
        ));
    }

    if config.evaluator.evaluation_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "evaluator.evaluation_interval_secs must be positive".to_string(),
        ));
    }
    if config.evaluator.alert_resolve_count == 0 {
        return Err(ConfigError::Invalid(
            "evaluator.alert_resolve_count must be positive".to_string(),
        ));
    }
    if config.evaluator.event_buffer == 0 {
        return Err(ConfigError::Invalid(
            "evaluator.event_buffer must be positive".to_string(),
        ));
    }

    if config.notifier.rate_limit_window_secs == 0 {
        return Err(ConfigError::Invalid(
            "notifier.rate_limit_window_secs must be positive".to_string(),
        ));
    }
    if config.notifier.inapp_max_size == 0 {
        return Err(ConfigError::Invalid(
            "notifier.inapp_max_size must be positive".to_string(),
        ));
    }
    if config.notifier.send_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "notifier.send_timeout_secs must be positive".to_string(),
        ));
    }

    if config.scheduler.check_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "scheduler.check_interval_secs must be positive".to_string(),
        ));
    }
    if config.scheduler.default_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "scheduler.default_timeout_secs must be positive".to_string(),
        ));
    }

    if config.storage.root.as_os_str().is_empty() {
        return Err(ConfigError::Invalid(
            "storage.root must not be empty".to_string(),
        ));
    }

    if let Some(smtp) = &config.smtp {
        if smtp.host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "smtp.host must not be empty".to_string(),
            ));
        }
        if smtp.from.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "smtp.from must not be empty".to_string(),
            ));
        }
        if smtp.username.is_some() != smtp.password.is_some() {
            return Err(ConfigError::Invalid(
                "smtp.username and smtp.password must be set together".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::SmtpConfig;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = Config::default();
        config.collector.update_interval_secs = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.evaluator.evaluation_interval_secs = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.scheduler.check_interval_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_resolve_count_rejected() {
        let mut config = Config::default();
        config.evaluator.alert_resolve_count = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_rate_limit_is_allowed() {
        // A zero rate limit is meaningful: it rejects all sends.
        let mut config = Config::default();
        config.notifier.rate_limit = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_smtp_credentials_must_pair() {
        let mut config = Config::default();
        config.smtp = Some(SmtpConfig {
            username: Some("argus".to_string()),
            password: None,
            ..SmtpConfig::default()
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_storage_root_rejected() {
        let mut config = Config::default();
        config.storage.root = std::path::PathBuf::new();
        assert!(validate(&config).is_err());
    }
}
