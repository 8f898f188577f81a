// Argus Host Monitoring Service - Configuration Loading
// YAML file loading with defaults fallback

use super::{validator, Config, ConfigError};
use std::path::Path;
use tracing::info;

/// Load configuration.
///
/// With no path, the built-in defaults are used. With a path, the file is
/// parsed as YAML; sections and fields not present fall back to defaults.
/// The result is always validated.
pub async fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
            let config: Config = serde_yaml::from_str(&raw)
                .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
            info!(path = %path.display(), "Loaded configuration file");
            config
        }
    };

    validator::validate(&config)?;
    Ok(config)
}
