//! Clear command - delete every cache store

use super::CommandContext;
use crate::audit::{events, AuditLog};
use crate::cli::args::ClearArgs;
use crate::controller::Flavor;
use crate::error::SwcacheResult;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the clear command
pub async fn execute(args: ClearArgs, cx: &CommandContext) -> SwcacheResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let host = cx.host(Flavor::Main).await?;

    let stores = host.env().storage.keys().await?;
    if stores.is_empty() {
        ui::step_info(&ctx, "No cache stores to delete");
        return Ok(());
    }

    ui::remark(&ctx, &stores.join(", "));
    let prompt = format!("Delete {} cache store(s)?", stores.len());
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::step_warn_hint(&ctx, "Nothing deleted", "Pass --yes to skip the prompt");
        return Ok(());
    }

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Deleting cache stores...");
    let deleted = host.clear_caches().await?;
    if deleted.len() == stores.len() {
        spinner.stop(&format!("Deleted {} store(s)", deleted.len()));
    } else {
        spinner.stop_error(&format!(
            "Deleted {} of {} store(s)",
            deleted.len(),
            stores.len()
        ));
    }

    AuditLog::new(&cx.config)
        .log(
            events::STORES_DELETED,
            &serde_json::json!({ "reason": "clear", "stores": deleted }),
        )
        .await;
    Ok(())
}
