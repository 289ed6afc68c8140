//! cswap - account switcher for Claude Code
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::process::ExitCode;

use clap::Parser;

use cswap::cli::{self, Cli, Commands};
use cswap::core::logging::{self, LogSettings};
use cswap::core::platform::{self, Platform};
use cswap::render::error::render_error;
use cswap::storage::{BackupLayout, ResolvedConfig};
use cswap::util::env::{Stream, should_use_color};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let operation = cli.command.operation();

    let resolved =
        platform::ensure_not_root(Platform::detect()).and_then(|()| ResolvedConfig::resolve(&cli));

    // Purge empties the backup root, so it keeps no log file there.
    let log_dir = resolved
        .as_ref()
        .ok()
        .filter(|_| !matches!(cli.command, Commands::Purge(_)))
        .map(|config| BackupLayout::new(&config.backup_root).log_dir());
    let _log_guard = logging::init(&LogSettings::resolve(
        cli.log_level.as_deref(),
        cli.json_output,
        cli.verbose,
        log_dir.as_deref(),
    ));

    let result = resolved.and_then(|mut config| {
        config.no_color = !should_use_color(config.no_color, Stream::Stdout);
        tracing::debug!(
            operation,
            backup_root = %config.backup_root.display(),
            host_dir = %config.host_dir.display(),
            "resolved configuration"
        );
        cli::execute(&cli, &config)
    });

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(operation, error = %e, "command failed");
            let no_color = !should_use_color(cli.no_color, Stream::Stderr);
            eprintln!(
                "{}",
                render_error(&e, operation, cli.effective_format(), no_color, cli.pretty)
            );
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
