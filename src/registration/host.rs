//! The origin's worker container

use super::{Registration, RegistrationRecord, ScriptSource};
use crate::controller::{ControllerEnv, Flavor};
use crate::error::SwcacheResult;
use crate::net::Request;
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

/// Result of checking the controller script on a development host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptProbe {
    /// Served with a script content type
    Served,
    /// The server answered 404
    Missing,
    /// Served, but not as a script
    WrongType(String),
    /// The server could not be reached
    Unreachable(String),
}

/// Holds the origin's registration and its cache stores
pub struct WorkerHost {
    env: ControllerEnv,
    source: Arc<dyn ScriptSource>,
    script_path: String,
    flavor: Flavor,
    record_path: Option<PathBuf>,
    registration: Mutex<Option<Arc<Registration>>>,
}

impl WorkerHost {
    pub fn new(env: ControllerEnv, source: Arc<dyn ScriptSource>, script_path: &str) -> Self {
        Self {
            env,
            source,
            script_path: script_path.to_string(),
            flavor: Flavor::Main,
            record_path: None,
            registration: Mutex::new(None),
        }
    }

    pub fn with_flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Persist the registration at `path` and restore it from there
    pub fn with_record(mut self, path: PathBuf) -> Self {
        self.record_path = Some(path);
        self
    }

    pub fn env(&self) -> &ControllerEnv {
        &self.env
    }

    pub fn script_url(&self) -> SwcacheResult<Url> {
        Request::resolve(&self.env.origin, &self.script_path)
    }

    /// Load a persisted registration, if any. Returns whether one was found.
    pub async fn restore(&self) -> SwcacheResult<bool> {
        let Some(path) = &self.record_path else {
            return Ok(false);
        };
        let Some(record) = RegistrationRecord::load(path).await? else {
            return Ok(false);
        };

        let registration = Registration::restore(
            record,
            self.env.clone(),
            self.source.clone(),
            self.record_path.clone(),
        )?;
        *self.lock() = Some(Arc::new(registration));
        debug!(path = %path.display(), "restored registration");
        Ok(true)
    }

    /// Get or create the registration. Creating one does not install
    /// anything; call [`Registration::update`] for that.
    pub fn register(&self) -> SwcacheResult<Arc<Registration>> {
        let script_url = self.script_url()?;
        let mut slot = self.lock();
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }

        info!(script = %script_url, "registering controller");
        let registration = Arc::new(Registration::new(
            script_url,
            self.flavor,
            self.env.clone(),
            self.source.clone(),
            self.record_path.clone(),
        ));
        *slot = Some(registration.clone());
        Ok(registration)
    }

    pub fn registration(&self) -> Option<Arc<Registration>> {
        self.lock().clone()
    }

    /// Whether an active controller serves the origin
    pub fn has_controller(&self) -> bool {
        self.registration()
            .is_some_and(|r| r.controller().is_some())
    }

    /// Fetch the controller script the way a browser does before
    /// registering it
    pub async fn probe_script(&self) -> ScriptProbe {
        let url = match self.script_url() {
            Ok(url) => url,
            Err(e) => return ScriptProbe::Unreachable(e.to_string()),
        };
        let request = Request::get(url).with_header("Service-Worker", "script");
        match self.env.fetcher.fetch(&request).await {
            Ok(response) if response.status == 404 => ScriptProbe::Missing,
            Ok(response) => {
                let content_type = response.header("content-type").unwrap_or_default();
                if content_type.contains("javascript") {
                    ScriptProbe::Served
                } else {
                    ScriptProbe::WrongType(content_type.to_string())
                }
            }
            Err(e) => ScriptProbe::Unreachable(e.to_string()),
        }
    }

    /// Delete every cache store at the origin; returns the deleted names
    pub async fn clear_caches(&self) -> SwcacheResult<Vec<String>> {
        let names = self.env.storage.keys().await?;
        let results = join_all(names.iter().map(|name| self.env.storage.delete(name))).await;

        let mut deleted = vec![];
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(_) => deleted.push(name),
                Err(e) => warn!(store = %name, "failed to delete store: {}", e),
            }
        }
        if !deleted.is_empty() {
            info!(count = deleted.len(), "cleared cache stores");
        }
        Ok(deleted)
    }

    /// Unregister the registration, live or persisted. Returns whether
    /// anything was registered.
    pub async fn unregister_all(&self) -> SwcacheResult<bool> {
        let live = self.lock().take();
        let mut found = false;
        if let Some(registration) = live {
            found |= registration.unregister().await?;
        }
        if let Some(path) = &self.record_path {
            found |= RegistrationRecord::remove(path).await?;
        }
        Ok(found)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<Registration>>> {
        self.registration.lock().unwrap_or_else(|e| e.into_inner())
    }
}
