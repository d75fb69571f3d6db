//! CLI command implementations

pub mod activate;
pub mod clear;
pub mod completions;
pub mod config;
pub mod fetch;
pub mod install;
pub mod pwa;
pub mod run;
pub mod status;

pub use activate::execute as activate;
pub use clear::execute as clear;
pub use completions::execute as completions;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use install::execute as install;
pub use pwa::execute as pwa;
pub use run::execute as run;
pub use status::execute as status;

use crate::client::FilePreferences;
use crate::config::{Config, ConfigManager};
use crate::controller::{ControllerBuild, ControllerEnv, Flavor};
use crate::error::{SwcacheError, SwcacheResult};
use crate::net::UreqFetcher;
use crate::registration::{ConfigScriptSource, WorkerHost};
use crate::store::DiskStorage;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Loaded configuration plus where it came from
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub local_config: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(config: Config, config_path: PathBuf, local_config: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
            local_config,
        }
    }

    /// The configured origin, reduced to scheme, host and port
    pub fn origin(&self) -> SwcacheResult<Url> {
        let raw = &self.config.origin.url;
        let mut url = Url::parse(raw).map_err(|e| SwcacheError::InvalidUrl {
            input: raw.clone(),
            reason: e.to_string(),
        })?;
        if url.host_str().is_none() {
            return Err(SwcacheError::InvalidUrl {
                input: raw.clone(),
                reason: "origin has no host".to_string(),
            });
        }
        url.set_path("/");
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    pub fn build(&self) -> SwcacheResult<ControllerBuild> {
        ControllerBuild::from_config(&self.config)
    }

    /// Disk stores and the network, for the configured origin
    pub fn env(&self) -> SwcacheResult<ControllerEnv> {
        let origin = self.origin()?;
        Ok(ControllerEnv {
            fetcher: Arc::new(UreqFetcher::new(
                origin.clone(),
                self.config.origin.timeout_secs,
            )),
            storage: Arc::new(DiskStorage::new(ConfigManager::stores_dir())),
            origin,
        })
    }

    /// Worker container with a persisted registration. The build is
    /// re-read from the config files on every update check.
    /// Worker host for the origin. A persisted registration keeps its own
    /// flavor; `flavor` applies to registrations created from now on.
    pub async fn host(&self, flavor: Flavor) -> SwcacheResult<Arc<WorkerHost>> {
        let source = ConfigScriptSource::new(
            ConfigManager::with_path(self.config_path.clone()),
            self.local_config.clone(),
        );
        let host = WorkerHost::new(self.env()?, Arc::new(source), &self.config.origin.script_path)
            .with_flavor(flavor)
            .with_record(ConfigManager::registration_path());
        host.restore().await?;
        Ok(Arc::new(host))
    }

    pub fn prefs(&self) -> FilePreferences {
        FilePreferences::new(ConfigManager::prefs_path())
    }
}
