//! Fetch command - one request through the controller

use super::CommandContext;
use crate::cli::args::FetchArgs;
use crate::controller::{CacheController, Flavor, Interception};
use crate::error::{SwcacheError, SwcacheResult};
use crate::net::Request;
use crate::ui::{self, UiContext};
use console::style;
use std::io::Write;
use tokio::sync::broadcast;

/// Execute the fetch command
///
/// Metadata goes to stderr so the body can be piped.
pub async fn execute(args: FetchArgs, cx: &CommandContext) -> SwcacheResult<()> {
    let env = cx.env()?;
    let url = Request::resolve(&env.origin, &args.target)?;
    let request = if args.navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    };

    let (clients, _) = broadcast::channel(16);
    let controller = CacheController::new(cx.build()?, Flavor::Main, env.clone(), clients);

    let (response, source) = match controller.handle_fetch(&request).await? {
        Interception::Respond { response, source } => (response, source.to_string()),
        Interception::Bypass(reason) => (
            env.fetcher.fetch(&request).await?,
            format!("network, bypassed: {}", reason),
        ),
    };
    // Let the background cache write land before the process exits
    controller.settle().await;

    let status = if response.is_ok() {
        style(response.status).green()
    } else {
        style(response.status).yellow()
    };
    eprintln!("{} {} {}", status, request.url, style(format!("({})", source)).dim());

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, &response.body)
                .await
                .map_err(|e| SwcacheError::io(format!("writing {}", path.display()), e))?;
            ui::step_ok_detail(
                &UiContext::detect(),
                &format!("{} bytes written", response.body.len()),
                &path.display().to_string(),
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&response.body)
                .and_then(|_| stdout.flush())
                .map_err(|e| SwcacheError::io("writing response body", e))?;
        }
    }
    Ok(())
}
