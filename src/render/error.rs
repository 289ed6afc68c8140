//! Error rendering for cswap.
//!
//! Human mode prints the failing operation, the error code and message, and
//! the fix suggestions; robot mode prints one JSON object.

use colored::Colorize;

use crate::cli::args::OutputFormat;
use crate::error::SwapError;

// =============================================================================
// Public API
// =============================================================================

/// Render an error for `operation` in the requested format.
#[must_use]
pub fn render_error(
    error: &SwapError,
    operation: &str,
    format: OutputFormat,
    no_color: bool,
    pretty: bool,
) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, operation, pretty),
        OutputFormat::Human if no_color => render_simple(error, operation),
        OutputFormat::Human => render_colored(error, operation),
    }
}

/// Render error as structured JSON for machine consumption.
#[must_use]
pub fn render_error_json(error: &SwapError, operation: &str, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error, operation);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error, operation))
}

// =============================================================================
// Text rendering
// =============================================================================

/// Plain text, no ANSI codes.
fn render_simple(error: &SwapError, operation: &str) -> String {
    let mut lines = vec![format!(
        "Error [{}]: {operation} failed: {error}",
        error.error_code()
    )];

    for suggestion in error.fix_suggestions() {
        lines.push(format!("  {}", suggestion.context));
        for cmd in &suggestion.commands {
            lines.push(format!("  Fix: {cmd}"));
        }
        if let Some(prevention) = &suggestion.prevention {
            lines.push(format!("  Tip: {prevention}"));
        }
    }
    lines.join("\n")
}

fn render_colored(error: &SwapError, operation: &str) -> String {
    let mut lines = vec![format!(
        "{} {} {}",
        "error:".red().bold(),
        format!("{operation} failed: {error}").bold(),
        format!("[{}]", error.error_code()).dimmed()
    )];

    for suggestion in error.fix_suggestions() {
        lines.push(format!("  {}", suggestion.context));
        for cmd in &suggestion.commands {
            lines.push(format!("  {} {}", "fix:".green(), cmd.cyan()));
        }
        if let Some(prevention) = &suggestion.prevention {
            lines.push(format!("  {} {prevention}", "tip:".yellow()));
        }
    }
    lines.join("\n")
}

// =============================================================================
// JSON Rendering
// =============================================================================

/// JSON representation of an error for machine consumption.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorJson {
    operation: String,
    error_code: String,
    kind: String,
    message: String,
    is_retryable: bool,
    exit_code: i32,
    suggestions: Vec<SuggestionJson>,
}

#[derive(serde::Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
}

impl ErrorJson {
    fn from_error(error: &SwapError, operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            error_code: error.error_code().to_string(),
            kind: error.kind().as_str().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            exit_code: error.exit_code().into(),
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(|s| SuggestionJson {
                    commands: s.commands,
                    context: s.context,
                    prevention: s.prevention,
                })
                .collect(),
        }
    }
}
