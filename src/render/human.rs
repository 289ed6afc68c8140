//! Human-readable output.

use std::fmt::Write as _;

use colored::{ColoredString, Colorize};

use crate::cli::show::PathsReport;
use crate::core::engine::{
    AccountEntry, AddOutcome, PurgeOutcome, RemoveOutcome, StatusReport, SwitchOutcome,
};

/// Apply a style unless color is disabled.
fn paint(text: &str, no_color: bool, style: impl FnOnce(ColoredString) -> ColoredString) -> String {
    if no_color {
        text.to_string()
    } else {
        style(text.normal()).to_string()
    }
}

fn account_line(entry: &AccountEntry, no_color: bool) -> String {
    let mut line = format!("  {}: {}", entry.position, entry.account.label);
    if u64::try_from(entry.position).ok() != Some(entry.account.id) {
        let _ = write!(line, " [id {}]", entry.account.id);
    }
    if entry.active {
        line.push(' ');
        line.push_str(&paint("(active)", no_color, |s| s.green().bold()));
    }
    line
}

#[must_use]
pub fn render_add(outcome: &AddOutcome, no_color: bool) -> String {
    format!(
        "{} account {}: {} ({} of {}, now active)",
        paint("Added", no_color, |s| s.green().bold()),
        outcome.account.position,
        outcome.account.account.label,
        outcome.account.position,
        outcome.total
    )
}

#[must_use]
pub fn render_switch(outcome: &SwitchOutcome, no_color: bool) -> String {
    let target = &outcome.account;
    if !outcome.changed {
        return format!(
            "Account {}: {} is already active",
            target.position, target.account.label
        );
    }

    let mut out = String::new();
    if let Some(adopted) = &outcome.adopted {
        let _ = writeln!(
            out,
            "{}",
            paint(
                &format!(
                    "{} was signed in but not managed; saved it as account id {}.",
                    adopted.label, adopted.id
                ),
                no_color,
                |s| s.yellow(),
            )
        );
    }
    let _ = write!(
        out,
        "{} to account {}: {}",
        paint("Switched", no_color, |s| s.green().bold()),
        target.position,
        target.account.label
    );
    if let Some(previous) = &outcome.previous {
        let _ = write!(out, " (was {})", previous.label);
    }
    out.push('\n');
    out.push_str(&paint(
        "Restart Claude Code to use the new account.",
        no_color,
        |s| s.dimmed(),
    ));
    out
}

#[must_use]
pub fn render_list(entries: &[AccountEntry], no_color: bool) -> String {
    if entries.is_empty() {
        return "No managed accounts. Log in with Claude Code, then run `cswap add-account`."
            .to_string();
    }

    let mut lines = vec![paint("Managed accounts:", no_color, |s| s.bold())];
    lines.extend(entries.iter().map(|entry| account_line(entry, no_color)));
    lines.join("\n")
}

#[must_use]
pub fn render_status(report: &StatusReport, no_color: bool) -> String {
    let mut lines = Vec::new();
    match &report.active {
        Some(active) => lines.push(format!(
            "Active account: {} ({} of {})",
            paint(&active.account.label, no_color, |s| s.green().bold()),
            active.position,
            report.total
        )),
        None if report.total == 0 => lines.push("No managed accounts.".to_string()),
        None => lines.push(format!(
            "No active account ({} managed). Run `cswap switch` to pick one.",
            report.total
        )),
    }

    if report.live_unmanaged
        && let Some(email) = report.live_identity.as_ref().and_then(|i| i.email.as_deref())
    {
        lines.push(paint(
            &format!("Claude Code is signed in as {email}, which is not managed"),
            no_color,
            |s| s.yellow(),
        ));
    }
    lines.join("\n")
}

#[must_use]
pub fn render_remove(outcome: &RemoveOutcome, no_color: bool) -> String {
    let mut out = format!(
        "{} account {}: {}",
        paint("Removed", no_color, |s| s.red().bold()),
        outcome.account.id,
        outcome.account.label
    );
    if outcome.was_active {
        out.push('\n');
        out.push_str("It was the active account; no account is active now.");
    }
    out
}

#[must_use]
pub fn render_purge(outcome: &PurgeOutcome, no_color: bool) -> String {
    let mut out = format!(
        "{} {} account(s) and all stored data",
        paint("Purged", no_color, |s| s.red().bold()),
        outcome.accounts_removed
    );
    if outcome.registry_unreadable {
        let warning = outcome.leftover_secrets.as_ref().map_or_else(
            || "The registry was unreadable; only files under the backup root were removed.".to_string(),
            |location| {
                format!(
                    "The registry was unreadable, so credentials stored in the {location} may remain. Remove its account-* entries by hand."
                )
            },
        );
        out.push('\n');
        out.push_str(&paint(&warning, no_color, |s| s.yellow()));
    }
    out
}

#[must_use]
pub fn render_paths(report: &PathsReport, no_color: bool) -> String {
    let rows = [
        ("Platform", report.platform.to_string()),
        ("Config file", report.config_file.display().to_string()),
        (
            "Backup root",
            format!("{} ({})", report.info.backup_root.display(), report.backup_root_source),
        ),
        ("Registry", report.info.registry_file.display().to_string()),
        ("Snapshots", report.info.snapshots_dir.display().to_string()),
        ("Logs", report.info.log_dir.display().to_string()),
        ("Secret store", report.info.secret_backend.clone()),
        ("Host config", report.info.host_config_dir.display().to_string()),
        (
            "Identity file",
            report
                .info
                .identity_file
                .as_ref()
                .map_or_else(|| "(none)".to_string(), |p| p.display().to_string()),
        ),
        ("Live secret", report.info.live_secret.clone()),
    ];

    rows.iter()
        .map(|(label, value)| {
            let label = paint(&format!("{label:<14}"), no_color, |s| s.bold());
            format!("{label} {value}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
