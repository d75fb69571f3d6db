//! Interactive prompts with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{SwcacheError, SwcacheResult};

/// Prompt for confirmation; returns `default` when non-interactive and
/// `true` in auto-yes mode
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> SwcacheResult<bool> {
    if ctx.auto_yes() {
        println!("  {} (auto-approved)", message);
        return Ok(true);
    }

    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on stdin
    let message = message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| SwcacheError::User(format!("Prompt task failed: {}", e)))?;

    result.map_err(|e| SwcacheError::User(format!("Prompt failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirm_auto_yes() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(confirm(&ctx, "Delete 3 stores?", false).await.unwrap());
    }

    #[tokio::test]
    async fn confirm_non_interactive_default() {
        let ctx = UiContext::non_interactive();
        assert!(confirm(&ctx, "Update now?", true).await.unwrap());
        assert!(!confirm(&ctx, "Delete 3 stores?", false).await.unwrap());
    }
}
