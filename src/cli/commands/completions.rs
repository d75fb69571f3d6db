//! Completions command - shell completion scripts

use crate::cli::args::{Cli, CompletionsArgs};
use crate::error::SwcacheResult;
use clap::CommandFactory;

/// Execute the completions command
pub fn execute(args: CompletionsArgs) -> SwcacheResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(args.shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
