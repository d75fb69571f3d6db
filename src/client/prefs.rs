//! Origin-scoped persisted preferences

use crate::error::{SwcacheError, SwcacheResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

/// Debug flag that disables the controller entirely
pub const PWA_DISABLED_KEY: &str = "pwa_debug_disabled";

/// Set while a native install prompt is retained
pub const PROMPT_READY_KEY: &str = "pwa_prompt_ready";

/// String key/value storage that survives reloads
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> SwcacheResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> SwcacheResult<()>;
    async fn remove(&self, key: &str) -> SwcacheResult<()>;
}

/// Whether the debug flag is set. Only the exact value `"true"` counts.
pub async fn pwa_disabled(prefs: &dyn PreferenceStore) -> SwcacheResult<bool> {
    Ok(prefs.get(PWA_DISABLED_KEY).await?.as_deref() == Some("true"))
}

/// Preferences kept in a JSON object on disk
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> SwcacheResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            SwcacheError::io(format!("reading preferences {}", self.path.display()), e)
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn write(&self, prefs: &BTreeMap<String, String>) -> SwcacheResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SwcacheError::io("creating state directory", e))?;
        }
        let content = serde_json::to_string_pretty(prefs)?;
        fs::write(&self.path, content).await.map_err(|e| {
            SwcacheError::io(format!("writing preferences {}", self.path.display()), e)
        })
    }
}

#[async_trait]
impl PreferenceStore for FilePreferences {
    async fn get(&self, key: &str) -> SwcacheResult<Option<String>> {
        Ok(self.read().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> SwcacheResult<()> {
        let mut prefs = self.read().await?;
        prefs.insert(key.to_string(), value.to_string());
        self.write(&prefs).await
    }

    async fn remove(&self, key: &str) -> SwcacheResult<()> {
        let mut prefs = self.read().await?;
        if prefs.remove(key).is_some() {
            self.write(&prefs).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferences {
    async fn get(&self, key: &str) -> SwcacheResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> SwcacheResult<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> SwcacheResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
