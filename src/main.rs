//! swcache - offline-cache lifecycle controller
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use swcache::cli::commands::{self, CommandContext};
use swcache::cli::{Cli, Commands};
use swcache::config::ConfigManager;
use swcache::error::{SwcacheError, SwcacheResult};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> SwcacheResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions(args) = cli.command {
        return commands::completions(args);
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| SwcacheError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_tracing(cli.verbose, &config.general.log_format);
    swcache::ui::init_theme();
    match local_config_path {
        Some(ref path) => debug!("Found local config: {}", path.display()),
        None if cli.no_local => debug!("Local config discovery disabled (--no-local)"),
        None => {}
    }

    ConfigManager::ensure_state_dirs().await?;

    let cx = CommandContext::new(
        config,
        config_manager.path().to_path_buf(),
        local_config_path,
    );

    match cli.command {
        Commands::Completions(_) => unreachable!("completions handled above"),
        Commands::Install(args) => commands::install(args, &cx).await,
        Commands::Activate => commands::activate(&cx).await,
        Commands::Fetch(args) => commands::fetch(args, &cx).await,
        Commands::Status(args) => commands::status(args, &cx).await,
        Commands::Clear(args) => commands::clear(args, &cx).await,
        Commands::Pwa(args) => commands::pwa(args, &cx).await,
        Commands::Run(args) => commands::run(args, &cx).await,
        Commands::Config(args) => commands::config(args, &cx).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_tracing(verbose: u8, log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("swcache=warn"),
        1 => EnvFilter::new("swcache=info"),
        _ => EnvFilter::new("swcache=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
