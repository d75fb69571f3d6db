//! Activate command - garbage-collect superseded stores

use super::CommandContext;
use crate::audit::{events, AuditLog};
use crate::controller::{CacheController, Flavor};
use crate::error::SwcacheResult;
use crate::ui::{self, UiContext};
use tokio::sync::broadcast;

/// Execute the activate command
pub async fn execute(cx: &CommandContext) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let (clients, _) = broadcast::channel(16);
    let controller = CacheController::new(cx.build()?, Flavor::Main, cx.env()?, clients);

    let report = controller.activate().await;

    for (store, reason) in &report.failed {
        ui::step_error_detail(&ctx, &format!("Could not delete {}", store), reason);
    }

    if report.deleted.is_empty() {
        ui::step_info(&ctx, "No superseded stores");
        return Ok(());
    }

    for store in &report.deleted {
        ui::step_ok_detail(&ctx, "Deleted", store);
    }
    AuditLog::new(&cx.config)
        .log(
            events::STORES_DELETED,
            &serde_json::json!({ "reason": "activate", "stores": report.deleted }),
        )
        .await;

    ui::outro_success(&ctx, &format!("{} superseded store(s) deleted", report.deleted.len()));
    Ok(())
}
