// Argus Host Monitoring Service - Alert Store
// File-backed alert configurations, one JSON document per alert

use super::{AlertConfig, AlertError};
use crate::pool::{buffer_pool, BufferPool};
use std::path::{Path, PathBuf};
use tracing::warn;

/// File-backed store of alert configurations.
///
/// Layout: `<root>/<id>.json`, replaced atomically on write (temp file +
/// rename) so readers never observe a partial document.
pub struct AlertStore {
    root: PathBuf,
    buffers: BufferPool,
}

impl AlertStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AlertError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| AlertError::Storage(format!("creating {}: {e}", root.display())))?;
        Ok(Self {
            root,
            buffers: buffer_pool(4),
        })
    }

    /// All stored alert configurations. Undecodable documents are skipped
    /// with a warning so one corrupt record cannot hide the rest.
    pub async fn list(&self) -> Result<Vec<AlertConfig>, AlertError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| AlertError::Storage(format!("reading {}: {e}", self.root.display())))?;

        let mut configs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AlertError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_config(&path).await {
                Ok(config) => configs.push(config),
                Err(e) => warn!("Skipping unreadable alert document {}: {e}", path.display()),
            }
        }

        configs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(configs)
    }

    /// Fetch one alert by id.
    pub async fn get(&self, id: &str) -> Result<AlertConfig, AlertError> {
        validate_id(id)?;
        let path = self.path_for(id);
        if !path.exists() {
            return Err(AlertError::NotFound(id.to_string()));
        }
        read_config(&path).await
    }

    /// Persist a new alert. Fails on duplicate id or invalid configuration.
    pub async fn create(&self, config: &AlertConfig) -> Result<(), AlertError> {
        config.validate()?;
        validate_id(&config.id)?;
        if self.path_for(&config.id).exists() {
            return Err(AlertError::Validation(format!(
                "alert {} already exists",
                config.id
            )));
        }
        self.write_atomic(config).await
    }

    /// Replace an existing alert. Fails when the alert does not exist.
    pub async fn update(&self, config: &AlertConfig) -> Result<(), AlertError> {
        config.validate()?;
        validate_id(&config.id)?;
        if !self.path_for(&config.id).exists() {
            return Err(AlertError::NotFound(config.id.clone()));
        }
        self.write_atomic(config).await
    }

    /// Remove an alert.
    pub async fn delete(&self, id: &str) -> Result<(), AlertError> {
        validate_id(id)?;
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AlertError::NotFound(id.to_string()))
            }
            Err(e) => Err(AlertError::Storage(format!(
                "removing {}: {e}",
                path.display()
            ))),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn write_atomic(&self, config: &AlertConfig) -> Result<(), AlertError> {
        let path = self.path_for(&config.id);
        let tmp = self.root.join(format!("{}.json.tmp", config.id));

        let mut buf = self.buffers.acquire();
        serde_json::to_writer_pretty(&mut buf, config)
            .map_err(|e| AlertError::Serialization(e.to_string()))?;

        let result = async {
            tokio::fs::write(&tmp, &buf)
                .await
                .map_err(|e| AlertError::Storage(format!("writing {}: {e}", tmp.display())))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|e| AlertError::Storage(format!("replacing {}: {e}", path.display())))
        }
        .await;

        self.buffers.release(buf);
        result
    }
}

/// Ids become file names; restrict them to a path-safe alphabet.
fn validate_id(id: &str) -> Result<(), AlertError> {
    if id.is_empty() {
        return Err(AlertError::Validation("alert id must not be empty".to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AlertError::Validation(format!(
            "alert id {id:?} contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

async fn read_config(path: &Path) -> Result<AlertConfig, AlertError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| AlertError::Storage(format!("reading {}: {e}", path.display())))?;
    serde_json::from_slice(&raw).map_err(|e| AlertError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{CompareOp, Severity, Threshold};
    use crate::metrics::{CpuMetric, MetricKey};
    use chrono::Utc;
    use tempfile::tempdir;

    fn config(id: &str) -> AlertConfig {
        AlertConfig {
            id: id.to_string(),
            name: format!("{id} alert"),
            description: "test".to_string(),
            severity: Severity::Critical,
            enabled: true,
            threshold: Threshold {
                metric: MetricKey::Cpu(CpuMetric::UsagePercent),
                operator: CompareOp::Gt,
                value: 95.0,
                duration_secs: None,
                sustained_for: Some(3),
            },
            notifications: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = AlertStore::open(dir.path()).await.unwrap();

        let original = config("cpu-high");
        store.create(&original).await.unwrap();

        let fetched = store.get("cpu-high").await.unwrap();
        assert_eq!(fetched, original);
    }

    #[tokio::test]
    async fn test_create_duplicate_rejected() {
        let dir = tempdir().unwrap();
        let store = AlertStore::open(dir.path()).await.unwrap();

        store.create(&config("dup")).await.unwrap();
        assert!(matches!(
            store.create(&config("dup")).await,
            Err(AlertError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = AlertStore::open(dir.path()).await.unwrap();

        assert!(matches!(
            store.update(&config("ghost")).await,
            Err(AlertError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let dir = tempdir().unwrap();
        let store = AlertStore::open(dir.path()).await.unwrap();

        store.create(&config("a")).await.unwrap();
        store.create(&config("b")).await.unwrap();
        store.delete("a").await.unwrap();

        let remaining = store.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");

        assert!(matches!(
            store.get("a").await,
            Err(AlertError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("a").await,
            Err(AlertError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_documents() {
        let dir = tempdir().unwrap();
        let store = AlertStore::open(dir.path()).await.unwrap();

        store.create(&config("good")).await.unwrap();
        tokio::fs::write(dir.path().join("bad.json"), b"{ nope")
            .await
            .unwrap();

        let configs = store.list().await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].id, "good");
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let store = AlertStore::open(dir.path()).await.unwrap();

        let mut evil = config("ok");
        evil.id = "../escape".to_string();
        assert!(matches!(
            store.create(&evil).await,
            Err(AlertError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_on_create() {
        let dir = tempdir().unwrap();
        let store = AlertStore::open(dir.path()).await.unwrap();

        let mut bad = config("bad");
        bad.threshold.duration_secs = Some(10);
        assert!(matches!(
            store.create(&bad).await,
            Err(AlertError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = AlertStore::open(dir.path()).await.unwrap();

        store.create(&config("x")).await.unwrap();
        let mut update = config("x");
        update.enabled = false;
        store.update(&update).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name();
            assert!(!name.to_string_lossy().ends_with(".tmp"));
        }
    }
}
