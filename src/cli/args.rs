//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Claude Code account swapper - keep several logins and switch between them.
#[derive(Parser, Debug)]
#[command(name = "cswap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, visible_alias = "debug", global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture the currently logged-in account and make it managed
    AddAccount(AddAccountArgs),

    /// Switch to another managed account (next one if no selector)
    Switch(SwitchArgs),

    /// List managed accounts
    List,

    /// Show the active account
    Status,

    /// Remove a managed account and its stored data
    RemoveAccount(RemoveAccountArgs),

    /// Delete every managed account and all stored data
    Purge(PurgeArgs),

    /// Show resolved paths and storage backends
    Paths,
}

impl Commands {
    /// Name of the operation, used in error reports.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::AddAccount(_) => "add-account",
            Self::Switch(_) => "switch",
            Self::List => "list",
            Self::Status => "status",
            Self::RemoveAccount(_) => "remove-account",
            Self::Purge(_) => "purge",
            Self::Paths => "paths",
        }
    }
}

/// Arguments for `add-account`.
#[derive(Args, Debug, Default)]
pub struct AddAccountArgs {
    /// Label to register the account under (defaults to the account email)
    #[arg(long, value_name = "LABEL")]
    pub label: Option<String>,
}

/// Arguments for `switch`.
#[derive(Args, Debug, Default)]
pub struct SwitchArgs {
    /// List position, account id, or label
    #[arg(value_name = "SELECTOR")]
    pub selector: Option<String>,
}

/// Arguments for `remove-account`.
#[derive(Args, Debug)]
pub struct RemoveAccountArgs {
    /// List position, account id, or label
    #[arg(value_name = "SELECTOR")]
    pub selector: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for `purge`.
#[derive(Args, Debug, Default)]
pub struct PurgeArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}
