//! CLI argument parsing and command dispatch.

pub mod accounts;
pub mod args;
pub mod confirm;
pub mod show;
pub mod switch;

pub use args::{Cli, Commands, OutputFormat};

use crate::core::engine::SwapEngine;
use crate::error::Result;
use crate::storage::config::ResolvedConfig;

/// Run the parsed command; returns the text for stdout.
pub fn execute(cli: &Cli, config: &ResolvedConfig) -> Result<String> {
    let engine = SwapEngine::from_config(config);
    let (format, pretty, no_color) = (config.format, config.pretty, config.no_color);

    match &cli.command {
        Commands::AddAccount(args) => accounts::add(&engine, args, format, pretty, no_color),
        Commands::Switch(args) => switch::execute(&engine, args, format, pretty, no_color),
        Commands::List => show::list(&engine, format, pretty, no_color),
        Commands::Status => show::status(&engine, format, pretty, no_color),
        Commands::RemoveAccount(args) => {
            accounts::remove(&engine, args, format, pretty, no_color)
        }
        Commands::Purge(args) => accounts::purge(&engine, args, format, pretty, no_color),
        Commands::Paths => show::paths(&engine, config),
    }
}
