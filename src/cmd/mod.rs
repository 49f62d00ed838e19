//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler. Each handler lives in its own submodule.

pub mod run;

use crate::cli::{Cli, Commands};
use crate::error::TracehopError;

pub async fn dispatch(cli: Cli) -> Result<(), TracehopError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  tracehop v{version} \u{2014} transparent HTTP forwarding proxy\n\n  \
         No command provided. To get started:\n\n    \
         tracehop run                          Forward proxy on port 8080\n    \
         tracehop run -t http://host:9000      Forward every request to one upstream\n    \
         tracehop --help                       See all commands and options\n"
    );
}
