//! Pwa command - the debug flag that switches the controller off

use super::run::{TerminalPage, TerminalUpdatePrompt};
use super::CommandContext;
use crate::audit::{events, AuditLog};
use crate::cli::args::{PwaAction, PwaArgs};
use crate::client::LifecycleClient;
use crate::controller::Flavor;
use crate::error::SwcacheResult;
use crate::ui::{self, UiContext};
use std::sync::Arc;

/// Execute the pwa command
pub async fn execute(args: PwaArgs, cx: &CommandContext) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let host = cx.host(Flavor::Main).await?;
    let page = Arc::new(TerminalPage::new(host.env().origin_host()));
    let client = LifecycleClient::new(
        &cx.config,
        host,
        page.clone(),
        Arc::new(cx.prefs()),
        Arc::new(TerminalUpdatePrompt::new(ctx.clone())),
    );
    let audit = AuditLog::new(&cx.config);

    match args.action {
        PwaAction::Disable => {
            client.set_pwa_disabled(true).await?;
            audit.log(events::PWA_DISABLED, &serde_json::json!({})).await;
            ui::step_ok(&ctx, "Controller disabled; registration and caches removed");
        }
        PwaAction::Enable => {
            client.set_pwa_disabled(false).await?;
            audit.log(events::PWA_ENABLED, &serde_json::json!({})).await;
            ui::step_ok(&ctx, "Controller enabled");
        }
        PwaAction::Status => {
            let status = client.pwa_status().await?;
            ui::key_value_status(
                &ctx,
                "Debug mode",
                if status.disabled { "controller disabled" } else { "off" },
                !status.disabled,
            );
            ui::key_value_status(
                &ctx,
                "Controller",
                if status.active { "active" } else { "inactive" },
                status.active,
            );
            return Ok(());
        }
    }

    if page.reloads() > 0 {
        ui::remark(&ctx, "Running sessions pick this up on their next page load");
    }
    Ok(())
}
