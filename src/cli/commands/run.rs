//! Run command - host a page session in the terminal
//!
//! The terminal plays the page: the lifecycle client registers the
//! controller for the configured origin, polls for new versions and asks
//! before handing off. A page reload ends the session and starts a fresh
//! one, the way a browser re-runs the page's scripts.

use super::CommandContext;
use crate::audit::{events, AuditLog};
use crate::cli::args::RunArgs;
use crate::controller::Flavor;
use crate::client::{
    Activity, ClientEvent, LifecycleClient, Page, StartOutcome, UpdateDecision, UpdatePrompt,
};
use crate::error::SwcacheResult;
use crate::registration::{RegistrationEvent, WorkerInfo, WorkerState};
use crate::ui::{self, InstallProgress, UiContext};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;
use tracing::debug;

/// The terminal standing in for a browser page
pub struct TerminalPage {
    hostname: String,
    reloads: AtomicUsize,
    notify: Notify,
}

impl TerminalPage {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            reloads: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Resolves once the client has reloaded the page
    pub async fn reloaded(&self) {
        self.notify.notified().await
    }
}

impl Page for TerminalPage {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

/// Update prompt answered in the terminal.
///
/// In CI there is nobody to ask, so the prompt never answers and the
/// grace period performs the handoff.
pub struct TerminalUpdatePrompt {
    ctx: UiContext,
}

impl TerminalUpdatePrompt {
    pub fn new(ctx: UiContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl UpdatePrompt for TerminalUpdatePrompt {
    async fn ask(&self, waiting: &WorkerInfo) -> UpdateDecision {
        if self.ctx.auto_yes() {
            return UpdateDecision::Accept;
        }
        if !self.ctx.is_interactive() {
            ui::step_info(
                &self.ctx,
                &format!("New version {} is waiting; switching shortly", waiting.store),
            );
            return std::future::pending().await;
        }

        let message = format!("New version {} is available. Update now?", waiting.store);
        match ui::confirm(&self.ctx, &message, true).await {
            Ok(true) => UpdateDecision::Accept,
            Ok(false) | Err(_) => UpdateDecision::Dismiss,
        }
    }
}

enum SessionEnd {
    Reload,
    Interrupted,
}

/// Execute the run command
pub async fn execute(args: RunArgs, cx: &CommandContext) -> SwcacheResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let audit = AuditLog::new(&cx.config);

    ui::intro(&ctx, &format!("swcache session for {}", cx.origin()?));
    let mut sessions = 0usize;
    loop {
        sessions += 1;
        debug!(session = sessions, "starting page session");
        match session(&ctx, cx, &audit, args.flavor.into()).await? {
            SessionEnd::Reload => ui::step_info(&ctx, "Page reloaded"),
            SessionEnd::Interrupted => break,
        }
    }

    ui::outro_success(&ctx, &format!("Session closed after {} page load(s)", sessions));
    Ok(())
}

async fn session(
    ctx: &UiContext,
    cx: &CommandContext,
    audit: &AuditLog,
    flavor: Flavor,
) -> SwcacheResult<SessionEnd> {
    let host = cx.host(flavor).await?;
    let page = Arc::new(TerminalPage::new(host.env().origin_host()));
    let client = Arc::new(LifecycleClient::new(
        &cx.config,
        host.clone(),
        page.clone(),
        Arc::new(cx.prefs()),
        Arc::new(TerminalUpdatePrompt::new(ctx.clone())),
    ));

    let mut client_events = Some(client.subscribe_events());
    let mut activity = Some(client.subscribe_activity());
    let outcome = client.start().await?;
    report_start(ctx, outcome, &host.script_url()?.to_string());

    let mut progress: Option<InstallProgress> = None;

    let end = loop {
        tokio::select! {
            _ = page.reloaded() => break SessionEnd::Reload,
            _ = tokio::signal::ctrl_c() => break SessionEnd::Interrupted,
            event = next_from(&mut client_events) => {
                on_client_event(ctx, audit, event).await;
            }
            item = next_from(&mut activity) => match item {
                Activity::Registration(RegistrationEvent::UpdateFound { .. }) => {
                    if let Some(bar) = progress.take() {
                        bar.finish();
                    }
                    progress = Some(InstallProgress::new(ctx, "new version"));
                }
                Activity::Registration(RegistrationEvent::StateChanged {
                    worker,
                    state: WorkerState::Redundant,
                }) => {
                    debug!(%worker, "worker retired");
                }
                Activity::Registration(RegistrationEvent::ControllerChanged { worker }) => {
                    let store = host
                        .registration()
                        .and_then(|r| r.active())
                        .map(|info| info.store);
                    audit
                        .log(events::ACTIVATED, &serde_json::json!({ "worker": worker, "store": store }))
                        .await;
                }
                Activity::Registration(RegistrationEvent::StateChanged { .. }) => {}
                Activity::Controller(msg) => {
                    if let Some(bar) = &progress {
                        if bar.on_message(&msg) {
                            bar.finish();
                            progress = None;
                        }
                    }
                }
            },
        }
    };

    if let Some(bar) = progress {
        bar.finish();
    }
    client.shutdown();
    if let Some(registration) = host.registration() {
        if let Some(controller) = registration.controller() {
            controller.settle().await;
        }
    }
    Ok(end)
}

fn report_start(ctx: &UiContext, outcome: StartOutcome, script: &str) {
    match outcome {
        StartOutcome::Registered => ui::step_ok_detail(ctx, "Controller registered", script),
        StartOutcome::Disabled => {
            ui::step_warn_hint(ctx, "Controller disabled by debug flag", "Run: swcache pwa enable")
        }
        StartOutcome::TornDown => ui::step_warn(ctx, "Debug flag set; removed registration and caches"),
        StartOutcome::PreviewHost => ui::step_info(ctx, "Preview host; caching stays off"),
        StartOutcome::ScriptMissing => {
            ui::step_warn_hint(ctx, "Controller script not served", script)
        }
        // Reported through ClientEvent::Offline
        StartOutcome::Offline => {}
    }
}

async fn on_client_event(ctx: &UiContext, audit: &AuditLog, event: ClientEvent) {
    match event {
        ClientEvent::OfflineReady => ui::step_ok(ctx, "App ready for offline use"),
        ClientEvent::UpdateAvailable { .. } => ui::step_info(ctx, "New version available"),
        ClientEvent::UpdateDeferred { .. } => {
            ui::step_warn_hint(ctx, "Update postponed", "The new version stays waiting")
        }
        ClientEvent::Offline => ui::step_warn(ctx, "Origin unreachable; running offline"),
        ClientEvent::Reloading => {
            audit.log(events::HANDOFF, &serde_json::json!({})).await;
        }
        ClientEvent::Installable | ClientEvent::InstallProgress(_) | ClientEvent::AppInstalled => {}
    }
}

/// Next item from an optional subscription; pending forever once closed
async fn next_from<T: Clone>(rx: &mut Option<broadcast::Receiver<T>>) -> T {
    loop {
        let Some(inner) = rx.as_mut() else {
            return std::future::pending().await;
        };
        match inner.recv().await {
            Ok(item) => return item,
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "subscriber lagged"),
            Err(RecvError::Closed) => *rx = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn reload_wakes_a_later_waiter() {
        let page = TerminalPage::new("localhost");
        page.reload();
        tokio::time::timeout(Duration::from_secs(1), page.reloaded())
            .await
            .unwrap();
        assert_eq!(page.reloads(), 1);
        assert_eq!(page.hostname(), "localhost");
    }

    #[tokio::test]
    async fn auto_yes_prompt_accepts() {
        let prompt = TerminalUpdatePrompt::new(UiContext::non_interactive().with_auto_yes(true));
        let info = WorkerInfo {
            id: uuid::Uuid::new_v4(),
            fingerprint: "quiz-app-v1.0.2+quiz-admin-v1.0.1".to_string(),
            store: "quiz-app-v1.0.2".to_string(),
            state: WorkerState::Installed,
        };
        assert_eq!(prompt.ask(&info).await, UpdateDecision::Accept);
    }

    #[tokio::test]
    async fn ci_prompt_leaves_it_to_the_grace_period() {
        let prompt = TerminalUpdatePrompt::new(UiContext::non_interactive());
        let info = WorkerInfo {
            id: uuid::Uuid::new_v4(),
            fingerprint: "f".to_string(),
            store: "quiz-app-v1.0.2".to_string(),
            state: WorkerState::Installed,
        };
        assert!(tokio::time::timeout(Duration::from_millis(50), prompt.ask(&info))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn closed_subscription_goes_quiet() {
        let (tx, rx) = broadcast::channel::<u8>(4);
        let mut rx = Some(rx);
        tx.send(7).unwrap();
        drop(tx);
        assert_eq!(next_from(&mut rx).await, 7);
        assert!(tokio::time::timeout(Duration::from_millis(20), next_from(&mut rx))
            .await
            .is_err());
        assert!(rx.is_none());
    }

    #[tokio::test]
    async fn absent_subscription_is_pending() {
        let mut rx: Option<broadcast::Receiver<u8>> = None;
        assert!(tokio::time::timeout(Duration::from_millis(20), next_from(&mut rx))
            .await
            .is_err());
    }
}
