//! Controller registration for one origin
//!
//! A [`Registration`] owns the active/waiting [`InstanceRegister`] and runs
//! the controller lifecycle around it:
//!
//! 1. `update()` loads the build served at the script URL. If it differs
//!    from the newest known worker, a new worker installs.
//! 2. With no active worker the new one activates immediately (first
//!    install). Otherwise it waits.
//! 3. A `skip-waiting` message posted to the waiting worker promotes it,
//!    garbage-collects superseded stores and claims the origin.
//!
//! Every transition is published as a [`RegistrationEvent`].

pub mod host;
pub mod record;
pub mod slots;
pub mod source;

pub use host::{ScriptProbe, WorkerHost};
pub use record::RegistrationRecord;
pub use slots::{InstallOutcome, InstanceRegister};
pub use source::{ConfigScriptSource, ScriptSource, StaticSource};

use crate::controller::{CacheController, ControllerEnv, Flavor, Interception};
use crate::error::{SwcacheError, SwcacheResult};
use crate::net::Request;
use crate::protocol::{ClientMessage, ControllerMessage};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        write!(f, "{}", s)
    }
}

/// Registration state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// A new worker started installing
    UpdateFound { worker: Uuid },
    StateChanged { worker: Uuid, state: WorkerState },
    /// A worker took control of the origin
    ControllerChanged { worker: Uuid },
}

/// One controller instance held by a registration
#[derive(Clone)]
pub struct Worker {
    id: Uuid,
    controller: Arc<CacheController>,
}

impl Worker {
    fn new(id: Uuid, controller: CacheController) -> Self {
        Self {
            id,
            controller: Arc::new(controller),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn controller(&self) -> &Arc<CacheController> {
        &self.controller
    }

    fn info(&self, state: WorkerState) -> WorkerInfo {
        WorkerInfo {
            id: self.id,
            fingerprint: self.controller.build().fingerprint(),
            store: self.controller.store_name().to_string(),
            state,
        }
    }
}

/// Snapshot of a worker for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub id: Uuid,
    pub fingerprint: String,
    pub store: String,
    pub state: WorkerState,
}

/// The origin's controller registration
pub struct Registration {
    scope: Url,
    script_url: Url,
    flavor: Flavor,
    env: ControllerEnv,
    source: Arc<dyn ScriptSource>,
    slots: Mutex<InstanceRegister<Worker>>,
    lifecycle: tokio::sync::Mutex<()>,
    events: broadcast::Sender<RegistrationEvent>,
    messages: broadcast::Sender<ControllerMessage>,
    record_path: Option<PathBuf>,
    registered_at: DateTime<Utc>,
}

impl Registration {
    pub(crate) fn new(
        script_url: Url,
        flavor: Flavor,
        env: ControllerEnv,
        source: Arc<dyn ScriptSource>,
        record_path: Option<PathBuf>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let (messages, _) = broadcast::channel(256);
        let mut scope = env.origin.clone();
        scope.set_path("/");
        Self {
            scope,
            script_url,
            flavor,
            env,
            source,
            slots: Mutex::new(InstanceRegister::Empty),
            lifecycle: tokio::sync::Mutex::new(()),
            events,
            messages,
            record_path,
            registered_at: Utc::now(),
        }
    }

    /// Rebuild a registration from its persisted record
    pub(crate) fn restore(
        record: RegistrationRecord,
        env: ControllerEnv,
        source: Arc<dyn ScriptSource>,
        record_path: Option<PathBuf>,
    ) -> SwcacheResult<Self> {
        let script_url = Url::parse(&record.script_url).map_err(|e| SwcacheError::InvalidUrl {
            input: record.script_url.clone(),
            reason: e.to_string(),
        })?;
        let mut registration = Self::new(script_url, record.flavor, env, source, record_path);
        registration.registered_at = record.registered_at;

        let controller = registration.spawn_controller(record.build);
        registration
            .lock_slots()
            .installed(Worker::new(record.worker_id, controller));
        debug!(worker = %record.worker_id, "restored active worker");
        Ok(registration)
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn script_url(&self) -> &Url {
        &self.script_url
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.events.subscribe()
    }

    /// Subscribe to messages broadcast by this registration's controllers
    pub fn subscribe_messages(&self) -> broadcast::Receiver<ControllerMessage> {
        self.messages.subscribe()
    }

    pub fn active(&self) -> Option<WorkerInfo> {
        self.lock_slots()
            .active()
            .map(|w| w.info(WorkerState::Activated))
    }

    pub fn waiting(&self) -> Option<WorkerInfo> {
        self.lock_slots()
            .waiting()
            .map(|w| w.info(WorkerState::Installed))
    }

    /// Active controller, if any
    pub fn controller(&self) -> Option<Arc<CacheController>> {
        self.lock_slots().active().map(|w| w.controller.clone())
    }

    /// Register state name: `none`, `active` or `active+waiting`
    pub fn state_name(&self) -> &'static str {
        self.lock_slots().state_name()
    }

    /// Check the script URL for a new controller version.
    ///
    /// Returns the id of the newly installed worker, or `None` when the
    /// served build is already known.
    pub async fn update(&self) -> SwcacheResult<Option<Uuid>> {
        let _guard = self.lifecycle.lock().await;
        let build = self.source.load().await?;
        let fingerprint = build.fingerprint();

        let newest = {
            let slots = self.lock_slots();
            slots
                .waiting()
                .or(slots.active())
                .map(|w| w.controller.build().fingerprint())
        };
        if newest.as_deref() == Some(fingerprint.as_str()) {
            debug!(%fingerprint, "no controller update");
            return Ok(None);
        }

        let worker = Worker::new(Uuid::new_v4(), self.spawn_controller(build));
        info!(worker = %worker.id, %fingerprint, "installing controller");
        self.emit(RegistrationEvent::UpdateFound { worker: worker.id });
        self.emit_state(&worker, WorkerState::Installing);

        let report = worker.controller.install().await;
        debug!(worker = %worker.id, cached = report.cached.len(), "controller installed");

        let has_active = self.lock_slots().active().is_some();
        if has_active {
            let outcome = self.lock_slots().installed(worker.clone());
            self.emit_state(&worker, WorkerState::Installed);
            if let InstallOutcome::Waiting {
                displaced: Some(old),
            } = outcome
            {
                info!(worker = %old.id, "waiting worker displaced");
                self.emit_state(&old, WorkerState::Redundant);
            }
        } else {
            // First install: no page is controlled, so nothing to wait for
            self.emit_state(&worker, WorkerState::Installed);
            self.lock_slots().installed(worker.clone());
            self.activate_worker(&worker).await;
        }

        Ok(Some(worker.id))
    }

    /// Post a raw client message to a worker
    pub async fn post_message(&self, worker: Uuid, raw: &str) -> SwcacheResult<()> {
        let target = {
            let slots = self.lock_slots();
            let found = [slots.waiting(), slots.active()]
                .into_iter()
                .flatten()
                .find(|w| w.id == worker)
                .cloned();
            found
        };
        let Some(target) = target else {
            warn!(%worker, "message for unknown worker dropped");
            return Ok(());
        };

        match target.controller.handle_message(raw) {
            Some(ClientMessage::SkipWaiting) => self.skip_waiting(worker).await,
            None => Ok(()),
        }
    }

    /// Promote `worker` if it is the waiting worker; no-op otherwise
    async fn skip_waiting(&self, worker: Uuid) -> SwcacheResult<()> {
        let _guard = self.lifecycle.lock().await;
        let (retired, promoted) = {
            let mut slots = self.lock_slots();
            if slots.waiting().map(|w| w.id) != Some(worker) {
                debug!(%worker, "skip-waiting for a worker that is not waiting");
                return Ok(());
            }
            let retired = slots.promote()?;
            let promoted = slots.active().cloned().ok_or(SwcacheError::NoWaitingWorker)?;
            (retired, promoted)
        };

        info!(from = %retired.id, to = %promoted.id, "skip-waiting handshake");
        self.emit_state(&retired, WorkerState::Redundant);
        self.activate_worker(&promoted).await;
        Ok(())
    }

    /// Route a request through the active controller
    pub async fn fetch(&self, request: &Request) -> SwcacheResult<Interception> {
        let controller = self.controller().ok_or(SwcacheError::NotRegistered)?;
        controller.handle_fetch(request).await
    }

    /// Drop every worker and the persisted record.
    ///
    /// Returns whether anything was registered.
    pub async fn unregister(&self) -> SwcacheResult<bool> {
        let _guard = self.lifecycle.lock().await;
        let workers = self.lock_slots().clear();
        for worker in &workers {
            worker.controller.settle().await;
            self.emit_state(worker, WorkerState::Redundant);
        }

        let had_record = match &self.record_path {
            Some(path) => RegistrationRecord::remove(path).await?,
            None => false,
        };
        if !workers.is_empty() {
            info!(scope = %self.scope, "unregistered controller");
        }
        Ok(!workers.is_empty() || had_record)
    }

    async fn activate_worker(&self, worker: &Worker) {
        self.emit_state(worker, WorkerState::Activating);
        let report = worker.controller.activate().await;
        if !report.deleted.is_empty() {
            info!(deleted = ?report.deleted, "superseded stores removed");
        }

        self.emit_state(worker, WorkerState::Activated);
        worker.controller.notify_activated();
        self.emit(RegistrationEvent::ControllerChanged { worker: worker.id });

        if let Err(e) = self.persist(worker).await {
            warn!("failed to persist registration: {}", e);
        }
    }

    async fn persist(&self, worker: &Worker) -> SwcacheResult<()> {
        let Some(path) = &self.record_path else {
            return Ok(());
        };
        RegistrationRecord {
            scope: self.scope.to_string(),
            script_url: self.script_url.to_string(),
            flavor: self.flavor,
            worker_id: worker.id,
            build: worker.controller.build().clone(),
            registered_at: self.registered_at,
            updated_at: Utc::now(),
        }
        .save(path)
        .await
    }

    fn spawn_controller(&self, build: crate::controller::ControllerBuild) -> CacheController {
        CacheController::new(build, self.flavor, self.env.clone(), self.messages.clone())
    }

    fn emit(&self, event: RegistrationEvent) {
        let _ = self.events.send(event);
    }

    fn emit_state(&self, worker: &Worker, state: WorkerState) {
        debug!(worker = %worker.id, %state, "worker state");
        self.emit(RegistrationEvent::StateChanged {
            worker: worker.id,
            state,
        });
    }

    fn lock_slots(&self) -> MutexGuard<'_, InstanceRegister<Worker>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}
