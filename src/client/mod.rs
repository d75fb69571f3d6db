//! Lifecycle client
//!
//! The foreground actor. It registers the controller for the page's
//! origin, polls for new versions, asks the operator before handing off
//! to a waiting version, and reloads the page exactly once when the
//! handoff completes.
//!
//! ```text
//! unregistered -> registering -> registered(no-waiting) <-> registered(waiting)
//!                                                              |
//!                                      reloaded <- handshaking <-+
//! ```

pub mod prefs;
pub mod prompt;

pub use prefs::{pwa_disabled, FilePreferences, MemoryPreferences, PreferenceStore};
pub use prompt::{InstallChoice, InstallPrompt, UpdateDecision, UpdatePrompt};

use crate::bypass::{is_loopback_host, is_preview_host};
use crate::config::schema::{BypassConfig, Config, LifecycleConfig};
use crate::error::{SwcacheError, SwcacheResult};
use crate::protocol::{ClientMessage, ControllerMessage};
use crate::registration::{
    Registration, RegistrationEvent, ScriptProbe, WorkerHost, WorkerState,
};
use prefs::{PROMPT_READY_KEY, PWA_DISABLED_KEY};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The page the client runs in
pub trait Page: Send + Sync {
    fn hostname(&self) -> String;

    /// Reload the page. The client calls this at most once.
    fn reload(&self);
}

/// Client view of the controller's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "state")]
pub enum ClientState {
    Unregistered,
    Registering,
    Registered { waiting: bool },
    Handshaking,
    Reloaded,
}

impl ClientState {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition(self, next: ClientState) -> bool {
        use ClientState::*;
        match (self, next) {
            (Reloaded, _) => false,
            (_, Reloaded) => true,
            (Unregistered, Registering) => true,
            (Registering, Registered { waiting: false }) => true,
            (Registering, Unregistered) => true,
            (Registered { waiting: false }, Registered { waiting: true }) => true,
            (Registered { waiting: true }, Registered { waiting: false }) => true,
            (Registered { waiting: true }, Handshaking) => true,
            (Registered { .. }, Unregistered) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unregistered => write!(f, "unregistered"),
            Self::Registering => write!(f, "registering"),
            Self::Registered { waiting: false } => write!(f, "registered(no-waiting)"),
            Self::Registered { waiting: true } => write!(f, "registered(waiting)"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::Reloaded => write!(f, "reloaded"),
        }
    }
}

/// Things the page's UI reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// First install finished; content is cached for offline use
    OfflineReady,
    UpdateAvailable { worker: Uuid },
    /// Operator dismissed the update prompt
    UpdateDeferred { worker: Uuid },
    /// Controller script unreachable; running without registration
    Offline,
    /// A native install prompt is retained and can be shown
    Installable,
    InstallProgress(u8),
    AppInstalled,
    Reloading,
}

/// Registration and controller traffic, relayed in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    Registration(RegistrationEvent),
    Controller(ControllerMessage),
}

/// How `start()` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Registered,
    /// Debug flag set; nothing to tear down
    Disabled,
    /// Debug flag set; the registration and caches were removed and the
    /// page reloaded
    TornDown,
    /// Origin is a preview host
    PreviewHost,
    /// Development server does not serve the script; any registration
    /// was removed and the page reloaded
    ScriptMissing,
    Offline,
}

/// Debug flag and registration presence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PwaStatus {
    pub disabled: bool,
    pub active: bool,
}

/// Client timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTiming {
    pub poll_interval: Duration,
    pub update_grace: Duration,
    pub install_tick: Duration,
}

impl ClientTiming {
    pub fn from_config(config: &LifecycleConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            update_grace: Duration::from_secs(config.update_grace_secs),
            install_tick: Duration::from_millis(config.install_tick_ms),
        }
    }
}

/// Foreground lifecycle client for one page
pub struct LifecycleClient {
    host: Arc<WorkerHost>,
    page: Arc<dyn Page>,
    prefs: Arc<dyn PreferenceStore>,
    update_prompt: Arc<dyn UpdatePrompt>,
    bypass: BypassConfig,
    timing: ClientTiming,
    state: watch::Sender<ClientState>,
    events: broadcast::Sender<ClientEvent>,
    activity: broadcast::Sender<Activity>,
    reloaded: AtomicBool,
    prompted: Mutex<HashSet<Uuid>>,
    install_prompt: Mutex<Option<Arc<dyn InstallPrompt>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LifecycleClient {
    pub fn new(
        config: &Config,
        host: Arc<WorkerHost>,
        page: Arc<dyn Page>,
        prefs: Arc<dyn PreferenceStore>,
        update_prompt: Arc<dyn UpdatePrompt>,
    ) -> Self {
        let (state, _) = watch::channel(ClientState::Unregistered);
        let (events, _) = broadcast::channel(64);
        let (activity, _) = broadcast::channel(256);
        Self {
            host,
            page,
            prefs,
            update_prompt,
            bypass: config.bypass.clone(),
            timing: ClientTiming::from_config(&config.lifecycle),
            state,
            events,
            activity,
            reloaded: AtomicBool::new(false),
            prompted: Mutex::new(HashSet::new()),
            install_prompt: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_timing(mut self, timing: ClientTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Everything the registration publishes from `start()` on, including
    /// the first install. Subscribe before calling `start()`.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<Activity> {
        self.activity.subscribe()
    }

    /// Host check as compiled into the client
    pub fn bypasses_host(&self, host: &str) -> bool {
        is_preview_host(host, &self.bypass.hostname_suffixes)
    }

    /// Register the controller for the page's origin and start polling
    pub async fn start(self: &Arc<Self>) -> SwcacheResult<StartOutcome> {
        if pwa_disabled(self.prefs.as_ref()).await? {
            return self.tear_down().await;
        }

        let hostname = self.page.hostname();
        if self.bypasses_host(&hostname) {
            info!(host = %hostname, "preview host, not registering");
            return Ok(StartOutcome::PreviewHost);
        }

        self.transition(ClientState::Registering)?;

        if is_loopback_host(&hostname) {
            match self.host.probe_script().await {
                ScriptProbe::Served => {}
                ScriptProbe::Unreachable(reason) => {
                    info!("no connection to the origin, running in offline mode: {}", reason);
                    self.transition(ClientState::Unregistered)?;
                    self.emit(ClientEvent::Offline);
                    return Ok(StartOutcome::Offline);
                }
                probe => {
                    warn!(?probe, "controller script not served, unregistering");
                    // Only a removed registration warrants a reload
                    if self.host.unregister_all().await? {
                        self.reload();
                    } else {
                        self.transition(ClientState::Unregistered)?;
                    }
                    return Ok(StartOutcome::ScriptMissing);
                }
            }
        }

        let registration = self.host.register()?;
        let events = registration.subscribe_events();
        self.track(tokio::spawn(relay_activity(
            registration.subscribe_events(),
            registration.subscribe_messages(),
            self.activity.clone(),
        )));
        self.transition(ClientState::Registered { waiting: false })?;

        // A worker left waiting by an earlier page load is offered again
        let pending = registration.waiting().map(|w| w.id);
        let client = self.clone();
        let reg = registration.clone();
        self.track(tokio::spawn(async move {
            client.event_loop(reg, events, pending).await;
        }));

        if let Err(e) = registration.update().await {
            warn!("controller registration failed: {}", e);
        }

        let client = self.clone();
        self.track(tokio::spawn(async move {
            client.poll_loop(registration).await;
        }));

        Ok(StartOutcome::Registered)
    }

    /// Stop background polling and event handling
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            task.abort();
        }
    }

    /// Debug flag set at startup: remove whatever a previous session left
    async fn tear_down(&self) -> SwcacheResult<StartOutcome> {
        let unregistered = self.host.unregister_all().await?;
        let cleared = self.host.clear_caches().await?;
        if unregistered || !cleared.is_empty() {
            info!(stores = cleared.len(), "debug flag set, removed registration and caches");
            self.reload();
            Ok(StartOutcome::TornDown)
        } else {
            debug!("debug flag set, not registering");
            Ok(StartOutcome::Disabled)
        }
    }

    async fn poll_loop(self: Arc<Self>, registration: Arc<Registration>) {
        let mut ticker = tokio::time::interval(self.timing.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.reloaded.load(Ordering::SeqCst) {
                break;
            }
            // Failed checks are retried on the next tick
            if let Err(e) = registration.update().await {
                debug!("update check failed: {}", e);
            }
        }
    }

    async fn event_loop(
        self: Arc<Self>,
        registration: Arc<Registration>,
        mut events: broadcast::Receiver<RegistrationEvent>,
        pending: Option<Uuid>,
    ) {
        if let Some(worker) = pending {
            self.offer_update(&registration, worker).await;
        }

        loop {
            if self.reloaded.load(Ordering::SeqCst) {
                break;
            }

            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("missed {} registration events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            if let RegistrationEvent::StateChanged {
                worker,
                state: WorkerState::Installed,
            } = event
            {
                // An update is any install while another worker controls the origin
                let is_update = registration.active().is_some_and(|a| a.id != worker);
                if is_update {
                    self.offer_update(&registration, worker).await;
                } else {
                    info!(%worker, "content is cached for offline use");
                    self.emit(ClientEvent::OfflineReady);
                }
            }
        }
    }

    /// Prompt once per waiting worker; accept or a lapsed grace period
    /// starts the handoff
    async fn offer_update(&self, registration: &Registration, worker: Uuid) {
        let first_time = self
            .prompted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(worker);
        if !first_time {
            return;
        }
        let Some(info) = registration.waiting().filter(|w| w.id == worker) else {
            debug!(%worker, "worker no longer waiting, not offering it");
            return;
        };

        if let Err(e) = self.transition(ClientState::Registered { waiting: true }) {
            warn!("{}", e);
            return;
        }
        info!(%worker, "new version available");
        self.emit(ClientEvent::UpdateAvailable { worker });

        let decision =
            match tokio::time::timeout(self.timing.update_grace, self.update_prompt.ask(&info)).await
            {
                Ok(decision) => decision,
                Err(_) => {
                    info!(%worker, "update prompt expired, updating");
                    UpdateDecision::Accept
                }
            };

        match decision {
            UpdateDecision::Accept => self.handshake(registration, worker).await,
            UpdateDecision::Dismiss => {
                info!(%worker, "update deferred");
                self.emit(ClientEvent::UpdateDeferred { worker });
            }
        }
    }

    /// Send skip-waiting, wait for `activated`, then reload
    async fn handshake(&self, registration: &Registration, worker: Uuid) {
        if let Err(e) = self.transition(ClientState::Handshaking) {
            warn!("{}", e);
            return;
        }
        let mut messages = registration.subscribe_messages();

        let posted = match ClientMessage::SkipWaiting.to_json() {
            Ok(raw) => registration.post_message(worker, &raw).await,
            Err(e) => Err(e),
        };
        if let Err(e) = posted {
            warn!(%worker, "skip-waiting failed: {}", e);
        }

        let activated = tokio::time::timeout(self.timing.update_grace, async {
            loop {
                match messages.recv().await {
                    Ok(ControllerMessage::Activated) => return true,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        })
        .await;
        if !matches!(activated, Ok(true)) {
            warn!(%worker, "no activation confirmed, reloading anyway");
        }

        self.reload();
    }

    /// Reload the page once; later calls are no-ops
    fn reload(&self) {
        if self.reloaded.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.send_replace(ClientState::Reloaded);
        self.emit(ClientEvent::Reloading);
        self.page.reload();
    }

    /// Toggle the debug flag. Disabling removes the registration and every
    /// cache store; both directions reload the page.
    pub async fn set_pwa_disabled(&self, disabled: bool) -> SwcacheResult<()> {
        if disabled {
            self.prefs.set(PWA_DISABLED_KEY, "true").await?;
            self.host.unregister_all().await?;
            let cleared = self.host.clear_caches().await?;
            info!(stores = cleared.len(), "controller disabled");
        } else {
            self.prefs.remove(PWA_DISABLED_KEY).await?;
            info!("controller enabled");
        }
        self.reload();
        Ok(())
    }

    pub async fn pwa_status(&self) -> SwcacheResult<PwaStatus> {
        Ok(PwaStatus {
            disabled: pwa_disabled(self.prefs.as_ref()).await?,
            active: self.host.registration().is_some(),
        })
    }

    /// Platform says the app can be installed: retain the native prompt
    /// instead of showing it
    pub async fn on_installable(&self, prompt: Arc<dyn InstallPrompt>) -> SwcacheResult<()> {
        if self.bypasses_host(&self.page.hostname()) {
            return Ok(());
        }
        *self.install_prompt.lock().unwrap_or_else(|e| e.into_inner()) = Some(prompt);
        self.prefs.set(PROMPT_READY_KEY, "true").await?;
        info!("install prompt is ready");
        self.emit(ClientEvent::Installable);
        Ok(())
    }

    pub fn is_installable(&self) -> bool {
        self.install_prompt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Operator-initiated install. Progress climbs 10% per tick up to 90%
    /// while the native prompt is open, then jumps to 100%.
    ///
    /// Returns `None` when no prompt is retained.
    pub async fn install_app(&self) -> SwcacheResult<Option<InstallChoice>> {
        let prompt = self
            .install_prompt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(prompt) = prompt else {
            return Ok(None);
        };

        let events = self.events.clone();
        let tick = self.timing.install_tick;
        let ticker = tokio::spawn(async move {
            let mut progress = 0u8;
            while progress < 90 {
                tokio::time::sleep(tick).await;
                progress += 10;
                let _ = events.send(ClientEvent::InstallProgress(progress));
            }
        });

        let choice = prompt.prompt().await;
        ticker.abort();
        // Make sure no tick lands after the final 100
        let _ = ticker.await;
        self.emit(ClientEvent::InstallProgress(100));
        info!(?choice, "install prompt answered");

        if choice == InstallChoice::Accepted {
            self.prefs.remove(PROMPT_READY_KEY).await?;
        }
        Ok(Some(choice))
    }

    /// Platform reports the app installed
    pub async fn on_app_installed(&self) -> SwcacheResult<()> {
        self.install_prompt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.prefs.remove(PROMPT_READY_KEY).await?;
        info!("app installed");
        self.emit(ClientEvent::AppInstalled);
        Ok(())
    }

    fn transition(&self, next: ClientState) -> SwcacheResult<()> {
        let mut result = Ok(());
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if !current.can_transition(next) {
                result = Err(SwcacheError::InvalidTransition {
                    from: current.to_string(),
                    to: next.to_string(),
                });
                return false;
            }
            debug!(from = %current, to = %next, "client state");
            *current = next;
            true
        });
        result
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }
}

/// Relay registration events and controller messages onto one channel.
/// Events are drained first: a worker's `UpdateFound` is always published
/// before its install broadcasts anything.
async fn relay_activity(
    mut events: broadcast::Receiver<RegistrationEvent>,
    mut messages: broadcast::Receiver<ControllerMessage>,
    activity: broadcast::Sender<Activity>,
) {
    loop {
        let item = tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(event) => Activity::Registration(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("relay missed {} registration events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = messages.recv() => match msg {
                Ok(msg) => Activity::Controller(msg),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("relay missed {} controller messages", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        let _ = activity.send(item);
    }
}
