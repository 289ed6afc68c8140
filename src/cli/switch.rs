//! `switch`.

use crate::cli::args::{OutputFormat, SwitchArgs};
use crate::core::engine::SwapEngine;
use crate::error::Result;
use crate::render::{self, human};

/// Execute `switch`.
pub fn execute(
    engine: &SwapEngine,
    args: &SwitchArgs,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    let outcome = engine.switch(args.selector.as_deref())?;
    render::render("switch", &outcome, format, pretty, |o| {
        human::render_switch(o, no_color)
    })
}
