//! Registration persistence

use crate::controller::{ControllerBuild, Flavor};
use crate::error::{SwcacheError, SwcacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// What survives a restart: which build is in control of the origin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Origin scope the registration covers
    pub scope: String,

    /// Controller script URL
    pub script_url: String,

    /// Flavor the controller primes on install
    pub flavor: Flavor,

    /// Active worker
    pub worker_id: Uuid,

    /// Build of the active worker
    pub build: ControllerBuild,

    /// When the origin was first registered
    pub registered_at: DateTime<Utc>,

    /// When the active worker last changed
    pub updated_at: DateTime<Utc>,
}

impl RegistrationRecord {
    /// Load a record; a missing file means no registration
    pub async fn load(path: &Path) -> SwcacheResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            SwcacheError::io(format!("reading registration {}", path.display()), e)
        })?;

        let record: RegistrationRecord = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    pub async fn save(&self, path: &Path) -> SwcacheResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SwcacheError::io("creating state directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await.map_err(|e| {
            SwcacheError::io(format!("writing registration {}", path.display()), e)
        })
    }

    /// Delete the record; returns whether one existed
    pub async fn remove(path: &Path) -> SwcacheResult<bool> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path).await.map_err(|e| {
            SwcacheError::io(format!("deleting registration {}", path.display()), e)
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn record() -> RegistrationRecord {
        let now = Utc::now();
        RegistrationRecord {
            scope: "https://quiz.example.com/".to_string(),
            script_url: "https://quiz.example.com/service-worker.js".to_string(),
            flavor: Flavor::Main,
            worker_id: Uuid::new_v4(),
            build: ControllerBuild::from_config(&Config::default()).unwrap(),
            registered_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_load_remove() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("registration.json");
        assert!(RegistrationRecord::load(&path).await.unwrap().is_none());

        let saved = record();
        saved.save(&path).await.unwrap();
        let loaded = RegistrationRecord::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded.worker_id, saved.worker_id);
        assert_eq!(loaded.build, saved.build);
        assert_eq!(loaded.flavor, Flavor::Main);

        assert!(RegistrationRecord::remove(&path).await.unwrap());
        assert!(!RegistrationRecord::remove(&path).await.unwrap());
    }

    #[test]
    fn flavor_serializes_lowercase() {
        let json = serde_json::to_string(&record()).unwrap();
        assert!(json.contains("\"flavor\":\"main\""));
    }
}
