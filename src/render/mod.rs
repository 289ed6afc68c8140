//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::Result;

/// Render a command result: JSON envelope in robot mode, `human` otherwise.
pub fn render<T: Serialize>(
    command: &str,
    data: &T,
    format: OutputFormat,
    pretty: bool,
    human: impl FnOnce(&T) -> String,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human(data)),
        OutputFormat::Json => robot::render_json(command, data, pretty),
    }
}
