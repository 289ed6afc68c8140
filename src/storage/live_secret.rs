//! The host's live credential slot.
//!
//! Claude Code keeps its session secret in exactly one place per platform:
//! a JSON file inside its config directory (Linux, WSL, Windows) or a
//! generic password item in the login keychain (macOS). The slot is read on
//! capture and overwritten on switch.

use std::path::{Path, PathBuf};

use crate::core::platform::Platform;
use crate::error::{Result, SwapError};
use crate::storage::secrets::{SecretBlob, map_keyring_error};
use crate::util::fsops::{self, PRIVATE_FILE_MODE};

/// Keychain service Claude Code uses on macOS.
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "Claude Code-credentials";

/// File name of the live credential inside the host config dir.
pub const CREDENTIALS_FILE_NAME: &str = ".credentials.json";

/// Requested live slot kind from config/env.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotChoice {
    #[default]
    Auto,
    Keychain,
    File,
}

impl SlotChoice {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "keychain" | "keyring" => Some(Self::Keychain),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    /// Whether this choice resolves to the keychain slot on `platform`.
    #[must_use]
    pub const fn uses_keychain(self, platform: Platform) -> bool {
        match self {
            Self::Auto => matches!(platform, Platform::MacOs),
            Self::Keychain => true,
            Self::File => false,
        }
    }
}

/// Where the host keeps its live secret.
pub trait LiveSecretSlot {
    /// Short description for logs and `cswap paths`.
    fn describe(&self) -> String;

    /// Backing file, if the slot is a file.
    fn file_path(&self) -> Option<&Path>;

    /// Current secret, `None` when the host is logged out.
    fn read(&self) -> Result<Option<SecretBlob>>;

    /// Replace the current secret.
    fn write(&self, blob: &SecretBlob) -> Result<()>;
}

// =============================================================================
// File slot
// =============================================================================

/// Live secret stored as a plain JSON file.
pub struct CredentialsFileSlot {
    path: PathBuf,
}

impl CredentialsFileSlot {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LiveSecretSlot for CredentialsFileSlot {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn file_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn read(&self) -> Result<Option<SecretBlob>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                let blob = SecretBlob::new(bytes);
                Ok((!blob.is_blank()).then_some(blob))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SwapError::io_at(&self.path, e)),
        }
    }

    fn write(&self, blob: &SecretBlob) -> Result<()> {
        fsops::write_atomic(&self.path, blob.as_bytes(), Some(PRIVATE_FILE_MODE))
            .map_err(|e| SwapError::io_at(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), "Wrote live credential file");
        Ok(())
    }
}

// =============================================================================
// Keychain slot
// =============================================================================

/// Live secret stored as a keychain item (`service`, `account`).
pub struct KeychainSlot {
    service: String,
    account: String,
}

impl KeychainSlot {
    #[must_use]
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| map_keyring_error(e, "macOS keychain", &self.service))
    }
}

impl LiveSecretSlot for KeychainSlot {
    fn describe(&self) -> String {
        format!("keychain item '{}' ({})", self.service, self.account)
    }

    fn file_path(&self) -> Option<&Path> {
        None
    }

    fn read(&self) -> Result<Option<SecretBlob>> {
        match self.entry()?.get_secret() {
            Ok(bytes) => {
                let blob = SecretBlob::new(bytes);
                Ok((!blob.is_blank()).then_some(blob))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e, "macOS keychain", &self.service)),
        }
    }

    fn write(&self, blob: &SecretBlob) -> Result<()> {
        self.entry()?
            .set_secret(blob.as_bytes())
            .map_err(|e| map_keyring_error(e, "macOS keychain", &self.service))?;
        tracing::debug!(service = %self.service, "Wrote live keychain item");
        Ok(())
    }
}

/// Current OS user name, used as the keychain account.
#[must_use]
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_file_reads_as_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let slot = CredentialsFileSlot::new(dir.path().join(CREDENTIALS_FILE_NAME));
        assert!(slot.read().unwrap().is_none());

        std::fs::write(dir.path().join(CREDENTIALS_FILE_NAME), "  \n").unwrap();
        assert!(slot.read().unwrap().is_none());
    }

    #[test]
    fn file_slot_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let slot = CredentialsFileSlot::new(dir.path().join("nested").join(CREDENTIALS_FILE_NAME));
        let blob = SecretBlob::from("{\"claudeAiOauth\":{}}");

        slot.write(&blob).unwrap();
        assert_eq!(slot.read().unwrap(), Some(blob));
    }

    #[test]
    fn slot_choice_resolution() {
        assert!(SlotChoice::Auto.uses_keychain(Platform::MacOs));
        assert!(!SlotChoice::Auto.uses_keychain(Platform::Linux));
        assert!(!SlotChoice::Auto.uses_keychain(Platform::Windows));
        assert!(!SlotChoice::File.uses_keychain(Platform::MacOs));
        assert_eq!(SlotChoice::from_arg("Keychain"), Some(SlotChoice::Keychain));
        assert_eq!(SlotChoice::from_arg("nope"), None);
    }
}
