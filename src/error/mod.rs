//! Error types for cswap.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Every error belongs to one [`ErrorKind`]:
//! - **NotFound**: account, selector, snapshot, or secret absent
//! - **DuplicateAccount**: a label is already managed
//! - **NoLiveCredential**: the host has no session to capture
//! - **SecretStoreUnavailable**: the platform secret store refused access
//! - **Busy**: another invocation holds the vault lock
//! - **CorruptState**: registry or snapshot unreadable or malformed
//! - **IoFailure**: generic filesystem error
//! - **Configuration**: bad config file or environment value
//! - **Internal**: anything unclassified
//!
//! Each error has a stable error code (e.g., `CSWAP-N001`) for programmatic handling
//! and a list of [`FixSuggestion`]s for the human renderer.

pub mod suggestions;

use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Kinds
// =============================================================================

/// Stable error kinds surfaced to the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    DuplicateAccount,
    NoLiveCredential,
    SecretStoreUnavailable,
    Busy,
    CorruptState,
    IoFailure,
    Configuration,
    Internal,
}

impl ErrorKind {
    /// Returns a human-readable description of the kind.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Not found",
            Self::DuplicateAccount => "Duplicate account",
            Self::NoLiveCredential => "No live credential",
            Self::SecretStoreUnavailable => "Secret store unavailable",
            Self::Busy => "Busy",
            Self::CorruptState => "Corrupt state",
            Self::IoFailure => "I/O failure",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns the short code prefix for this kind.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::NotFound => "N",
            Self::DuplicateAccount => "D",
            Self::NoLiveCredential => "L",
            Self::SecretStoreUnavailable => "S",
            Self::Busy => "B",
            Self::CorruptState => "R",
            Self::IoFailure => "F",
            Self::Configuration => "C",
            Self::Internal => "X",
        }
    }

    /// Machine-readable name used in JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::DuplicateAccount => "duplicate_account",
            Self::NoLiveCredential => "no_live_credential",
            Self::SecretStoreUnavailable => "secret_store_unavailable",
            Self::Busy => "busy",
            Self::CorruptState => "corrupt_state",
            Self::IoFailure => "io_failure",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure, I/O failure
    GeneralError = 1,
    /// Account, snapshot or secret not found
    NotFound = 2,
    /// Duplicate account, corrupt state, bad configuration
    InvalidState = 3,
    /// Lock held by another invocation
    Busy = 4,
    /// Nothing to capture, or the secret store refused access
    CredentialUnavailable = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for cswap operations.
#[derive(Error, Debug)]
pub enum SwapError {
    // ==========================================================================
    // Not found
    // ==========================================================================
    /// Selector did not resolve to a managed account.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The account's snapshot directory is missing.
    #[error("no snapshot stored for account {account_id}")]
    SnapshotNotFound { account_id: u64 },

    /// No secret blob under the given key.
    #[error("no secret stored under '{key}'")]
    SecretNotFound { key: String },

    // ==========================================================================
    // Registry invariants
    // ==========================================================================
    /// Label is already used by another account.
    #[error("account '{label}' is already managed")]
    DuplicateAccount { label: String },

    // ==========================================================================
    // Host / secret store
    // ==========================================================================
    /// The host has no active session to capture.
    #[error("no live credential to capture: {reason}")]
    NoLiveCredential { reason: String },

    /// Platform secret store refused access (locked, permission denied).
    #[error("secret store {backend} unavailable: {message}")]
    SecretStoreUnavailable { backend: String, message: String },

    // ==========================================================================
    // Concurrency
    // ==========================================================================
    /// Another invocation holds the vault lock.
    #[error("another cswap process is running (lock {path} held for {waited_secs}s)")]
    Busy { path: String, waited_secs: u64 },

    // ==========================================================================
    // Corruption
    // ==========================================================================
    /// Registry or snapshot is unreadable or malformed.
    #[error("corrupt state in {path}: {message}")]
    CorruptState { path: String, message: String },

    // ==========================================================================
    // Configuration
    // ==========================================================================
    /// Error parsing the configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration or environment.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // I/O
    // ==========================================================================
    /// Permission denied on a vault or host path.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ==========================================================================
    // Generic wrapper
    // ==========================================================================
    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SwapError {
    /// Classify an I/O error that happened at `path`.
    ///
    /// `NotFound` is left as a plain I/O error; callers that treat absence as
    /// meaningful check for it before calling this.
    #[must_use]
    pub fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.display().to_string(),
            }
        } else {
            Self::Io(std::io::Error::new(
                err.kind(),
                format!("{}: {err}", path.display()),
            ))
        }
    }

    /// Build a `CorruptState` error for `path`.
    #[must_use]
    pub fn corrupt(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Returns the stable error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound(_) | Self::SnapshotNotFound { .. } | Self::SecretNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::DuplicateAccount { .. } => ErrorKind::DuplicateAccount,
            Self::NoLiveCredential { .. } => ErrorKind::NoLiveCredential,
            Self::SecretStoreUnavailable { .. } => ErrorKind::SecretStoreUnavailable,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::CorruptState { .. } => ErrorKind::CorruptState,
            Self::ConfigParse { .. } | Self::ConfigInvalid { .. } | Self::Config(_) => {
                ErrorKind::Configuration
            }
            Self::PermissionDenied { .. } | Self::Io(_) => ErrorKind::IoFailure,
            Self::Json(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self.kind() {
            ErrorKind::NotFound => ExitCode::NotFound,
            ErrorKind::DuplicateAccount | ErrorKind::CorruptState | ErrorKind::Configuration => {
                ExitCode::InvalidState
            }
            ErrorKind::Busy => ExitCode::Busy,
            ErrorKind::NoLiveCredential | ErrorKind::SecretStoreUnavailable => {
                ExitCode::CredentialUnavailable
            }
            ErrorKind::IoFailure | ErrorKind::Internal => ExitCode::GeneralError,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `CSWAP-{kind prefix}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "CSWAP-N001",
            Self::SnapshotNotFound { .. } => "CSWAP-N002",
            Self::SecretNotFound { .. } => "CSWAP-N003",
            Self::DuplicateAccount { .. } => "CSWAP-D001",
            Self::NoLiveCredential { .. } => "CSWAP-L001",
            Self::SecretStoreUnavailable { .. } => "CSWAP-S001",
            Self::Busy { .. } => "CSWAP-B001",
            Self::CorruptState { .. } => "CSWAP-R001",
            Self::ConfigParse { .. } => "CSWAP-C001",
            Self::ConfigInvalid { .. } => "CSWAP-C002",
            Self::Config(_) => "CSWAP-C003",
            Self::PermissionDenied { .. } => "CSWAP-F001",
            Self::Io(_) => "CSWAP-F002",
            Self::Json(_) => "CSWAP-X001",
            Self::Other(_) => "CSWAP-X099",
        }
    }

    /// Returns whether retrying the same command may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::SecretStoreUnavailable { .. })
    }

    /// True for any `NotFound`-kind error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound)
    }

    /// Returns actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::AccountNotFound(selector) => suggestions::account_not_found_suggestions(selector),
            Self::SnapshotNotFound { account_id } => {
                suggestions::missing_backup_suggestions(*account_id)
            }
            Self::SecretNotFound { key } => suggestions::missing_secret_suggestions(key),
            Self::DuplicateAccount { label } => suggestions::duplicate_account_suggestions(label),
            Self::NoLiveCredential { .. } => suggestions::no_live_credential_suggestions(),
            Self::SecretStoreUnavailable { backend, .. } => {
                suggestions::secret_store_unavailable_suggestions(backend)
            }
            Self::Busy { path, .. } => suggestions::busy_suggestions(path),
            Self::CorruptState { path, .. } => suggestions::corrupt_state_suggestions(path),
            Self::ConfigParse { path, .. } => suggestions::config_parse_suggestions(path),
            Self::ConfigInvalid { key, .. } => suggestions::config_invalid_suggestions(key),
            Self::PermissionDenied { path } => suggestions::permission_denied_suggestions(path),
            Self::Config(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => Vec::new(),
        }
    }
}

/// Result type alias for cswap operations.
pub type Result<T> = std::result::Result<T, SwapError>;
