//! Fix suggestion database for cswap errors.
//!
//! Maps error variants to copy-paste ready commands plus a short explanation.

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Commands to try, in order of preference.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

// =============================================================================
// Not found
// =============================================================================

#[must_use]
pub fn account_not_found_suggestions(selector: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["cswap list".to_string()],
        format!(
            "'{selector}' is not a list position, account id, or label of a managed account."
        ),
    )]
}

#[must_use]
pub fn missing_backup_suggestions(account_id: u64) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                format!("cswap remove-account {account_id} --yes"),
                "cswap add-account".to_string(),
            ],
            format!("The stored configuration for account {account_id} is gone."),
        )
        .with_prevention("Do not edit the backup directory by hand."),
    ]
}

#[must_use]
pub fn missing_secret_suggestions(key: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["cswap list".to_string(), "cswap paths".to_string()],
        format!("The stored credential '{key}' was deleted outside of cswap. Log in again and re-add the account."),
    )]
}

// =============================================================================
// Registry
// =============================================================================

#[must_use]
pub fn duplicate_account_suggestions(label: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![
            format!("cswap switch {label}"),
            "cswap add-account --label <other-label>".to_string(),
        ],
        format!("'{label}' is already managed; switch to it instead of adding it again."),
    )]
}

// =============================================================================
// Host and secret store
// =============================================================================

#[must_use]
pub fn no_live_credential_suggestions() -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["claude /login".to_string(), "cswap add-account".to_string()],
        "Claude Code has no active login to capture. Log in first, then add the account.",
    )]
}

#[must_use]
pub fn secret_store_unavailable_suggestions(backend: &str) -> Vec<FixSuggestion> {
    let mut suggestion = FixSuggestion::new(
        vec!["cswap paths".to_string()],
        format!("The {backend} refused access. It may be locked or this session may lack permission."),
    );
    if backend.contains("keychain") || backend.contains("keyring") {
        suggestion = suggestion.with_prevention(
            "Unlock the login keychain, or set CSWAP_SECRET_BACKEND=file to use the file vault.",
        );
    }
    vec![suggestion]
}

// =============================================================================
// Concurrency and corruption
// =============================================================================

#[must_use]
pub fn busy_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["cswap status".to_string()],
        format!("Another cswap command is still running and holds {path}. Wait for it to finish and retry."),
    )]
}

#[must_use]
pub fn corrupt_state_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["cswap purge --yes".to_string()],
            format!("{path} could not be read. cswap never repairs state silently; inspect or remove it."),
        )
        .with_prevention("Purging deletes every stored account; back the directory up first."),
    ]
}

// =============================================================================
// Configuration and I/O
// =============================================================================

#[must_use]
pub fn config_parse_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("$EDITOR {path}")],
        "The config file is not valid TOML.",
    )]
}

#[must_use]
pub fn config_invalid_suggestions(key: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["cswap paths".to_string()],
        format!("Check the value of '{key}' in the config file and environment."),
    )]
}

#[must_use]
pub fn permission_denied_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("ls -ld {path}")],
        "cswap keeps its vault owner-only (0700/0600); the path is owned by another user.",
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_suggests_switching() {
        let suggestions = duplicate_account_suggestions("a@x.com");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].commands[0], "cswap switch a@x.com");
    }

    #[test]
    fn keychain_backend_gets_prevention_tip() {
        let with_tip = secret_store_unavailable_suggestions("macOS keychain");
        assert!(with_tip[0].prevention.is_some());

        let without_tip = secret_store_unavailable_suggestions("file vault");
        assert!(without_tip[0].prevention.is_none());
    }
}
