//! `add-account`, `remove-account`, and `purge`.

use crate::cli::args::{AddAccountArgs, OutputFormat, PurgeArgs, RemoveAccountArgs};
use crate::cli::confirm::confirm;
use crate::core::engine::SwapEngine;
use crate::error::Result;
use crate::render::{self, human};

const CANCELLED: &str = "Cancelled.";

/// Execute `add-account`.
pub fn add(
    engine: &SwapEngine,
    args: &AddAccountArgs,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    let outcome = engine.add_account(args.label.as_deref())?;
    render::render("add-account", &outcome, format, pretty, |o| {
        human::render_add(o, no_color)
    })
}

/// Execute `remove-account`.
pub fn remove(
    engine: &SwapEngine,
    args: &RemoveAccountArgs,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    if !args.yes {
        // Resolve first so a typo fails before the prompt.
        let registry = engine.registry()?;
        let account = registry.find(&args.selector)?;
        let question = format!(
            "Remove account {} ({}) and its stored credentials?",
            account.id, account.label
        );
        if !confirm(&question)? {
            return Ok(CANCELLED.to_string());
        }
    }

    let outcome = engine.remove_account(&args.selector)?;
    render::render("remove-account", &outcome, format, pretty, |o| {
        human::render_remove(o, no_color)
    })
}

/// Execute `purge`.
pub fn purge(
    engine: &SwapEngine,
    args: &PurgeArgs,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    if !args.yes
        && !confirm(&format!(
            "Delete every managed account and everything under {}?",
            engine.backup_root().display()
        ))?
    {
        return Ok(CANCELLED.to_string());
    }

    let outcome = engine.purge()?;
    render::render("purge", &outcome, format, pretty, |o| {
        human::render_purge(o, no_color)
    })
}
