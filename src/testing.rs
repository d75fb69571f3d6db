//! Test doubles shared by unit tests

use crate::client::{InstallChoice, InstallPrompt, Page, UpdateDecision, UpdatePrompt};
use crate::config::Config;
use crate::controller::{CacheController, ControllerBuild, ControllerEnv, Flavor};
use crate::error::{SwcacheError, SwcacheResult};
use crate::net::{Fetcher, Request, Response};
use crate::protocol::ControllerMessage;
use crate::registration::WorkerInfo;
use crate::store::CacheStorage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use url::Url;
use uuid::Uuid;

pub fn origin() -> Url {
    Url::parse("https://quiz.example.com").unwrap()
}

pub fn env_with(storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>) -> ControllerEnv {
    ControllerEnv {
        origin: origin(),
        storage,
        fetcher,
    }
}

/// A controller plus a receiver subscribed before anything was broadcast
pub fn controller_with(
    config: &Config,
    flavor: Flavor,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
) -> (CacheController, broadcast::Receiver<ControllerMessage>) {
    let (tx, rx) = broadcast::channel(256);
    let build = ControllerBuild::from_config(config).unwrap();
    (
        CacheController::new(build, flavor, env_with(storage, fetcher), tx),
        rx,
    )
}

pub fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = vec![];
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

/// Scripted network keyed by request path. Unrouted paths answer 404.
pub struct StubFetcher {
    routes: Mutex<HashMap<String, Response>>,
    online: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn route(&self, path: &str, status: u16, body: &str) {
        let url = origin().join(path).unwrap();
        self.route_response(path, Response::new(url.as_str(), status, body));
    }

    pub fn route_response(&self, path: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Paths requested so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &Request) -> SwcacheResult<Response> {
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());
        if !self.online.load(Ordering::SeqCst) {
            return Err(SwcacheError::network(request.url.as_str(), "offline"));
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or_else(|| Response::new(request.url.as_str(), 404, "not found")))
    }
}

/// Page that counts reloads
pub struct RecordingPage {
    hostname: String,
    reloads: AtomicUsize,
}

impl RecordingPage {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Page for RecordingPage {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Update prompt with a fixed answer, or none at all
pub struct ScriptedUpdatePrompt {
    decision: Option<UpdateDecision>,
    asked: Mutex<Vec<Uuid>>,
}

impl ScriptedUpdatePrompt {
    pub fn answering(decision: UpdateDecision) -> Self {
        Self {
            decision: Some(decision),
            asked: Mutex::new(vec![]),
        }
    }

    /// Never answers; the grace period decides
    pub fn silent() -> Self {
        Self {
            decision: None,
            asked: Mutex::new(vec![]),
        }
    }

    pub fn asked(&self) -> Vec<Uuid> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdatePrompt for ScriptedUpdatePrompt {
    async fn ask(&self, waiting: &WorkerInfo) -> UpdateDecision {
        self.asked.lock().unwrap().push(waiting.id);
        match self.decision {
            Some(decision) => decision,
            None => std::future::pending().await,
        }
    }
}

/// Update prompt that answers only once the test opens the gate
pub struct GatedUpdatePrompt {
    decision: UpdateDecision,
    asked: Mutex<Vec<Uuid>>,
    gate: Semaphore,
}

impl GatedUpdatePrompt {
    pub fn new(decision: UpdateDecision) -> Self {
        Self {
            decision,
            asked: Mutex::new(vec![]),
            gate: Semaphore::new(0),
        }
    }

    /// Let `answers` pending or future prompts return
    pub fn open(&self, answers: usize) {
        self.gate.add_permits(answers);
    }

    pub fn asked(&self) -> Vec<Uuid> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdatePrompt for GatedUpdatePrompt {
    async fn ask(&self, waiting: &WorkerInfo) -> UpdateDecision {
        self.asked.lock().unwrap().push(waiting.id);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.decision
    }
}

/// Native install prompt answering after a delay
pub struct ScriptedInstallPrompt {
    choice: InstallChoice,
    delay: Duration,
}

impl ScriptedInstallPrompt {
    pub fn new(choice: InstallChoice, delay: Duration) -> Self {
        Self { choice, delay }
    }
}

#[async_trait]
impl InstallPrompt for ScriptedInstallPrompt {
    async fn prompt(&self) -> InstallChoice {
        tokio::time::sleep(self.delay).await;
        self.choice
    }
}
