//! Install command - prime the current cache store

use super::CommandContext;
use crate::audit::{events, AuditLog};
use crate::cli::args::InstallArgs;
use crate::controller::{CacheController, Flavor};
use crate::error::{SwcacheError, SwcacheResult};
use crate::ui::{self, InstallProgress, UiContext};
use tokio::sync::broadcast::{self, error::RecvError};

/// Execute the install command
pub async fn execute(args: InstallArgs, cx: &CommandContext) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let flavor = Flavor::from(args.flavor);

    let (clients, mut messages) = broadcast::channel(256);
    let controller = CacheController::new(cx.build()?, flavor, cx.env()?, clients);
    let store = controller.store_name().to_string();

    ui::intro(&ctx, &format!("Installing {} ({})", store, flavor));

    let progress = InstallProgress::new(&ctx, &store);
    let render = tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(msg) => {
                    if progress.on_message(&msg) {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        progress
    });

    let report = controller.install().await;
    // Closes the channel so the renderer exits even if nothing was sent
    drop(controller);
    let progress = render
        .await
        .map_err(|e| SwcacheError::Internal(format!("progress task failed: {}", e)))?;
    progress.finish();

    if report.skipped {
        ui::outro_warn(&ctx, "Origin is a preview host; caching is disabled there");
        return Ok(());
    }

    for (asset, reason) in &report.failed {
        ui::step_error_detail(&ctx, asset, reason);
    }

    AuditLog::new(&cx.config)
        .log(
            events::INSTALL_COMPLETE,
            &serde_json::json!({
                "store": store,
                "flavor": flavor,
                "cached": report.cached,
                "failed": report.failed.iter().map(|(asset, _)| asset).collect::<Vec<_>>(),
            }),
        )
        .await;

    let summary = format!(
        "{} of {} essential assets cached in {}",
        report.cached.len(),
        report.cached.len() + report.failed.len(),
        store
    );
    if report.failed.is_empty() {
        ui::outro_success(&ctx, &summary);
    } else {
        ui::outro_warn(&ctx, &summary);
    }
    Ok(())
}
