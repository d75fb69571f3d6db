//! Configuration management for swcache

pub mod schema;

pub use schema::Config;

use crate::error::{SwcacheError, SwcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Name of the project-local config file
pub const LOCAL_CONFIG_FILE: &str = ".swcache.toml";

/// Environment variable overriding the state directory
pub const STATE_DIR_ENV: &str = "SWCACHE_STATE_DIR";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("swcache")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(STATE_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("swcache")
    }

    /// Get the cache stores directory path
    pub fn stores_dir() -> PathBuf {
        Self::state_dir().join("stores")
    }

    /// Get the persisted preferences path
    pub fn prefs_path() -> PathBuf {
        Self::state_dir().join("prefs.json")
    }

    /// Get the persisted registration record path
    pub fn registration_path() -> PathBuf {
        Self::state_dir().join("registration.json")
    }

    /// Get the audit log path
    pub fn audit_log_path() -> PathBuf {
        Self::state_dir().join("audit.log")
    }

    /// Walk up from `start` looking for a project-local config file
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> SwcacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load the global configuration with an optional local file merged on top
    pub async fn load_merged(&self, local: Option<&Path>) -> SwcacheResult<Config> {
        let mut merged = if self.config_path.exists() {
            self.read_value(&self.config_path).await?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        if let Some(path) = local {
            let overlay = self.read_value(path).await?;
            merge_values(&mut merged, overlay);
            debug!("Merged local config from {}", path.display());
        }

        merged
            .try_into::<Config>()
            .map_err(|e| SwcacheError::ConfigInvalid {
                path: local.unwrap_or(&self.config_path).to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> SwcacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SwcacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| SwcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    async fn read_value(&self, path: &Path) -> SwcacheResult<toml::Value> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SwcacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| SwcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> SwcacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            SwcacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> SwcacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SwcacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs() -> SwcacheResult<()> {
        let dirs = [Self::state_dir(), Self::stores_dir()];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                SwcacheError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-merge `overlay` into `base`; tables merge key by key, everything else replaces
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
