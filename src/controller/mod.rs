//! Cache controller
//!
//! The background actor. One `CacheController` is one compiled version of
//! the controller: it owns the version-tagged store names, primes the
//! essential assets on install, garbage-collects superseded stores on
//! activation and answers intercepted requests cache-first.
//!
//! ```text
//! install ──> (waiting) ──> activate ──> handle_fetch*
//!    │                          │
//!    └─ cache-started/progress/complete   └─ activated
//! ```

mod intercept;
mod lifecycle;
pub mod progress;

pub use intercept::{BackgroundFailure, Interception, ResponseSource};
pub use lifecycle::{ActivateReport, InstallReport};

use crate::bypass::{in_namespace, is_preview_host};
use crate::config::schema::{BypassConfig, Config};
use crate::error::{SwcacheError, SwcacheResult};
use crate::net::Fetcher;
use crate::protocol::{ClientMessage, ControllerMessage};
use crate::store::CacheStorage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// Which variant of the application a store or request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Main,
    Admin,
}

impl Flavor {
    /// Flavor of a request path given the admin namespace
    pub fn of_path(path: &str, admin_namespace: &str) -> Self {
        if in_namespace(path, &[admin_namespace.to_string()]) {
            Self::Admin
        } else {
            Self::Main
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Everything compiled into one controller version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerBuild {
    pub main_store: String,
    pub admin_store: String,
    pub admin_namespace: String,
    pub main_assets: Vec<String>,
    pub admin_assets: Vec<String>,
    pub offline_document: String,
    pub bypass: BypassConfig,
    pub ramp_step: Duration,
    pub ramp_step_percent: u8,
}

impl ControllerBuild {
    /// Build from configuration; version tags must be semantic versions
    pub fn from_config(config: &Config) -> SwcacheResult<Self> {
        let cache = &config.cache;
        Ok(Self {
            main_store: store_name(&cache.app_prefix, &cache.version)?,
            admin_store: store_name(&cache.admin_prefix, &cache.admin_version)?,
            admin_namespace: cache.admin_namespace.clone(),
            main_assets: cache.main_assets.clone(),
            admin_assets: cache.admin_assets.clone(),
            offline_document: cache.offline_document.clone(),
            bypass: config.bypass.clone(),
            ramp_step: Duration::from_millis(cache.ramp_step_ms),
            ramp_step_percent: cache.ramp_step_percent,
        })
    }

    /// Identity of this build; a different fingerprint is a new version
    pub fn fingerprint(&self) -> String {
        format!("{}+{}", self.main_store, self.admin_store)
    }

    pub fn store_for(&self, flavor: Flavor) -> &str {
        match flavor {
            Flavor::Main => &self.main_store,
            Flavor::Admin => &self.admin_store,
        }
    }

    pub fn assets_for(&self, flavor: Flavor) -> &[String] {
        match flavor {
            Flavor::Main => &self.main_assets,
            Flavor::Admin => &self.admin_assets,
        }
    }

    /// Whether a store name is one of this build's live stores
    pub fn is_current_store(&self, name: &str) -> bool {
        name == self.main_store || name == self.admin_store
    }
}

/// `{prefix}-v{version}` after validating the version tag
pub fn store_name(prefix: &str, version: &str) -> SwcacheResult<String> {
    semver::Version::parse(version).map_err(|e| SwcacheError::VersionInvalid {
        version: version.to_string(),
        reason: e.to_string(),
    })?;
    let name = format!("{}-v{}", prefix, version);
    crate::store::validate_store_name(&name)?;
    Ok(name)
}

/// Origin-level collaborators shared by every controller instance
#[derive(Clone)]
pub struct ControllerEnv {
    pub origin: Url,
    pub storage: Arc<dyn CacheStorage>,
    pub fetcher: Arc<dyn Fetcher>,
}

impl ControllerEnv {
    pub fn origin_host(&self) -> &str {
        self.origin.host_str().unwrap_or_default()
    }
}

/// One controller instance
pub struct CacheController {
    build: ControllerBuild,
    flavor: Flavor,
    env: ControllerEnv,
    clients: broadcast::Sender<ControllerMessage>,
    failures: broadcast::Sender<BackgroundFailure>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheController {
    /// Create a controller serving `flavor`, broadcasting on `clients`
    pub fn new(
        build: ControllerBuild,
        flavor: Flavor,
        env: ControllerEnv,
        clients: broadcast::Sender<ControllerMessage>,
    ) -> Self {
        let (failures, _) = broadcast::channel(64);
        Self {
            build,
            flavor,
            env,
            clients,
            failures,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn build(&self) -> &ControllerBuild {
        &self.build
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Store this instance primes on install
    pub fn store_name(&self) -> &str {
        self.build.store_for(self.flavor)
    }

    /// Host check as compiled into the controller
    pub fn bypasses_host(&self, host: &str) -> bool {
        is_preview_host(host, &self.build.bypass.hostname_suffixes)
    }

    /// Subscribe to the side channel of failed background cache writes
    pub fn subscribe_failures(&self) -> broadcast::Receiver<BackgroundFailure> {
        self.failures.subscribe()
    }

    /// Parse a client message. Rejected messages are logged and dropped.
    pub fn handle_message(&self, raw: &str) -> Option<ClientMessage> {
        match ClientMessage::parse(raw) {
            Ok(msg) => {
                debug!(store = %self.store_name(), ?msg, "client message");
                Some(msg)
            }
            Err(e) => {
                warn!(store = %self.store_name(), "ignoring client message: {}", e);
                None
            }
        }
    }

    /// Announce activation to every connected client
    pub fn notify_activated(&self) {
        self.broadcast(ControllerMessage::Activated);
    }

    /// Wait for outstanding background cache writes.
    ///
    /// The request path never calls this; it exists for shutdown.
    pub async fn settle(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *pending)
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("background cache task aborted: {}", e);
            }
        }
    }

    fn broadcast(&self, msg: ControllerMessage) {
        // No connected clients is not an error
        let _ = self.clients.send(msg);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_names_embed_version() {
        let build = ControllerBuild::from_config(&Config::default()).unwrap();
        assert_eq!(build.main_store, "quiz-app-v1.0.1");
        assert_eq!(build.admin_store, "quiz-admin-v1.0.1");
        assert_eq!(build.fingerprint(), "quiz-app-v1.0.1+quiz-admin-v1.0.1");
    }

    #[test]
    fn invalid_version_rejected() {
        let mut config = Config::default();
        config.cache.version = "latest".to_string();
        let err = ControllerBuild::from_config(&config).unwrap_err();
        assert!(matches!(err, SwcacheError::VersionInvalid { .. }));
    }

    #[test]
    fn flavor_from_path() {
        assert_eq!(Flavor::of_path("/admin/dashboard", "/admin"), Flavor::Admin);
        assert_eq!(Flavor::of_path("/admin", "/admin"), Flavor::Admin);
        assert_eq!(Flavor::of_path("/administer", "/admin"), Flavor::Main);
        assert_eq!(Flavor::of_path("/quiz/3", "/admin"), Flavor::Main);
    }

    #[test]
    fn flavors_have_independent_stores() {
        let mut config = Config::default();
        config.cache.admin_version = "2.0.0".to_string();
        let build = ControllerBuild::from_config(&config).unwrap();
        assert_eq!(build.store_for(Flavor::Main), "quiz-app-v1.0.1");
        assert_eq!(build.store_for(Flavor::Admin), "quiz-admin-v2.0.0");
        assert!(build.is_current_store("quiz-admin-v2.0.0"));
        assert!(!build.is_current_store("quiz-admin-v1.0.1"));
    }
}
