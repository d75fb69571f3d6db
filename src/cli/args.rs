//! CLI argument definitions using clap derive

use crate::controller::Flavor;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// swcache - offline-cache lifecycle controller
///
/// Primes versioned caches of an origin's essential assets, serves
/// requests cache-first, and hands off safely between cache versions.
#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SWCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .swcache.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prime the current cache store with the essential assets
    Install(InstallArgs),

    /// Delete every superseded cache store
    Activate,

    /// Send one request through the cache controller
    Fetch(FetchArgs),

    /// Show cache stores, registration and debug flag
    Status(StatusArgs),

    /// Delete every cache store
    Clear(ClearArgs),

    /// Toggle the debug flag that disables the controller
    Pwa(PwaArgs),

    /// Host a page session: register, poll for updates, prompt and reload
    Run(RunArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Print shell completions
    Completions(CompletionsArgs),
}

/// Controller flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlavorArg {
    /// Main application
    Main,
    /// Administrative variant
    Admin,
}

impl From<FlavorArg> for Flavor {
    fn from(arg: FlavorArg) -> Self {
        match arg {
            FlavorArg::Main => Flavor::Main,
            FlavorArg::Admin => Flavor::Admin,
        }
    }
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Which essential asset list to prime
    #[arg(short, long, default_value = "main")]
    pub flavor: FlavorArg,
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Path relative to the origin, or an absolute URL
    pub target: String,

    /// Send as a page navigation (enables the offline document fallback)
    #[arg(short, long)]
    pub navigate: bool,

    /// Write the body to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the pwa command
#[derive(Parser, Debug)]
pub struct PwaArgs {
    #[command(subcommand)]
    pub action: PwaAction,
}

/// Debug flag subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwaAction {
    /// Clear the debug flag
    Enable,
    /// Set the debug flag, unregister and delete every cache store
    Disable,
    /// Show whether the controller is disabled or active
    Status,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Accept update prompts without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Which essential asset list new registrations prime
    #[arg(short, long, default_value = "main")]
    pub flavor: FlavorArg,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.version)
        key: String,
        /// Value to set
        value: String,
        /// Write to project-local .swcache.toml instead of global config
        #[arg(long)]
        local: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}

/// Output format for status
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one store per line)
    Plain,
}
