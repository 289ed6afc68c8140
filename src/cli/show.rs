//! Read-only commands: `list`, `status`, `paths`.
//!
//! None of these take the vault lock.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::core::engine::{EngineInfo, SwapEngine};
use crate::core::platform::Platform;
use crate::error::Result;
use crate::render::{self, human};
use crate::storage::config::ResolvedConfig;

/// Output of `cswap paths`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsReport {
    pub platform: Platform,
    pub config_file: PathBuf,
    /// Where the backup root setting came from.
    pub backup_root_source: String,
    #[serde(flatten)]
    pub info: EngineInfo,
}

/// Execute `list`.
pub fn list(
    engine: &SwapEngine,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    let entries = engine.list()?;
    render::render("list", &entries, format, pretty, |e| {
        human::render_list(e, no_color)
    })
}

/// Execute `status`.
pub fn status(
    engine: &SwapEngine,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    let report = engine.status()?;
    render::render("status", &report, format, pretty, |r| {
        human::render_status(r, no_color)
    })
}

/// Execute `paths`.
pub fn paths(engine: &SwapEngine, config: &ResolvedConfig) -> Result<String> {
    let report = PathsReport {
        platform: config.platform,
        config_file: config.config_file.clone(),
        backup_root_source: config.sources.backup_root.to_string(),
        info: engine.info(),
    };
    render::render("paths", &report, config.format, config.pretty, |r| {
        human::render_paths(r, config.no_color)
    })
}
