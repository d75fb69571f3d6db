//! Where a registration gets the controller build it checks for updates

use crate::config::ConfigManager;
use crate::controller::ControllerBuild;
use crate::error::SwcacheResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

/// Source of the current controller build
#[async_trait]
pub trait ScriptSource: Send + Sync {
    /// Load the build currently served at the script URL
    async fn load(&self) -> SwcacheResult<ControllerBuild>;
}

/// Re-reads the configuration on every check, so bumping
/// `cache.version` is seen as a new controller version
pub struct ConfigScriptSource {
    manager: ConfigManager,
    local: Option<PathBuf>,
}

impl ConfigScriptSource {
    pub fn new(manager: ConfigManager, local: Option<PathBuf>) -> Self {
        Self { manager, local }
    }
}

#[async_trait]
impl ScriptSource for ConfigScriptSource {
    async fn load(&self) -> SwcacheResult<ControllerBuild> {
        let config = self.manager.load_merged(self.local.as_deref()).await?;
        ControllerBuild::from_config(&config)
    }
}

/// Fixed build that can be swapped out
pub struct StaticSource {
    build: Mutex<ControllerBuild>,
}

impl StaticSource {
    pub fn new(build: ControllerBuild) -> Self {
        Self {
            build: Mutex::new(build),
        }
    }

    /// Serve `build` from now on
    pub fn set(&self, build: ControllerBuild) {
        *self.build.lock().unwrap_or_else(|e| e.into_inner()) = build;
    }
}

#[async_trait]
impl ScriptSource for StaticSource {
    async fn load(&self) -> SwcacheResult<ControllerBuild> {
        Ok(self.build.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
