//! Per-account secret storage.
//!
//! One [`SecretStore`] interface with a backend picked once at startup:
//! - macOS: login Keychain (via `keyring`)
//! - Windows: Credential Manager (via `keyring`)
//! - Linux/WSL/other: a file vault under the backup root, one base64 file per
//!   account, 0600 inside a 0700 directory, written temp-then-rename
//!
//! Blobs never reach the logs: [`SecretBlob`] has a redacted `Debug`.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::core::platform::Platform;
use crate::error::{Result, SwapError};
use crate::util::fsops::{self, PRIVATE_FILE_MODE};

/// Default keyring service name for stored account secrets.
pub const DEFAULT_KEYRING_SERVICE: &str = "cswap";

const SECRET_FILE_EXT: &str = "secret";

// =============================================================================
// Secret blob
// =============================================================================

/// Opaque credential material. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBlob(Vec<u8>);

impl SecretBlob {
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the blob is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(u8::is_ascii_whitespace)
    }
}

impl fmt::Debug for SecretBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBlob(<{} bytes redacted>)", self.0.len())
    }
}

impl From<Vec<u8>> for SecretBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for SecretBlob {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Secret key for an account id.
#[must_use]
pub fn account_key(account_id: u64) -> String {
    format!("account-{account_id}")
}

// =============================================================================
// Interface
// =============================================================================

/// Named blob storage.
pub trait SecretStore {
    /// Human-readable backend name used in errors and `cswap paths`.
    fn backend_name(&self) -> &'static str;

    /// Store `blob` under `key`, replacing any previous value.
    fn put(&self, key: &str, blob: &SecretBlob) -> Result<()>;

    /// Fetch the blob under `key`; `SecretNotFound` if absent.
    fn get(&self, key: &str) -> Result<SecretBlob>;

    /// Delete the blob under `key`; `SecretNotFound` if absent.
    fn delete(&self, key: &str) -> Result<()>;

    /// Where blobs live when they are kept outside the backup root, for
    /// telling the user what a purge could not reach.
    fn external_location(&self) -> Option<String> {
        None
    }
}

/// Delete treating "already absent" as success. Returns whether a blob existed.
pub fn delete_if_exists(store: &dyn SecretStore, key: &str) -> Result<bool> {
    match store.delete(key) {
        Ok(()) => Ok(true),
        Err(SwapError::SecretNotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// Requested backend from config/env.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    /// Native store where cswap trusts it, file vault elsewhere.
    #[default]
    Auto,
    /// Force the OS keyring.
    Keyring,
    /// Force the file vault.
    File,
}

impl BackendChoice {
    /// Parse from config string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "keyring" | "keychain" | "native" => Some(Self::Keyring),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// Concrete backend chosen for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackend {
    /// macOS login Keychain.
    Keychain,
    /// Windows Credential Manager.
    CredentialManager,
    /// Linux keyring (only when forced).
    LinuxKeyring,
    /// File vault under the backup root.
    FileVault,
}

impl SecretBackend {
    /// Pick the backend for a platform.
    #[must_use]
    pub const fn select(choice: BackendChoice, platform: Platform) -> Self {
        match choice {
            BackendChoice::File => Self::FileVault,
            BackendChoice::Auto if !platform.has_native_secret_store() => Self::FileVault,
            BackendChoice::Auto | BackendChoice::Keyring => match platform {
                Platform::MacOs => Self::Keychain,
                Platform::Windows => Self::CredentialManager,
                Platform::Linux | Platform::Wsl | Platform::Unknown => Self::LinuxKeyring,
            },
        }
    }

    /// Display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Keychain => "macOS keychain",
            Self::CredentialManager => "Windows credential manager",
            Self::LinuxKeyring => "Linux keyring",
            Self::FileVault => "file vault",
        }
    }
}

/// Build the store for `backend`.
#[must_use]
pub fn open_store(backend: SecretBackend, service: &str, vault_dir: &Path) -> Box<dyn SecretStore> {
    match backend {
        SecretBackend::FileVault => Box::new(FileSecretStore::new(vault_dir)),
        native => Box::new(KeyringSecretStore::new(native, service)),
    }
}

// =============================================================================
// Keyring backend
// =============================================================================

/// Secrets in the OS keyring under `service`, one entry per key.
pub struct KeyringSecretStore {
    backend: SecretBackend,
    service: String,
}

impl KeyringSecretStore {
    #[must_use]
    pub fn new(backend: SecretBackend, service: &str) -> Self {
        Self {
            backend,
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| map_keyring_error(e, self.backend.display_name(), key))
    }
}

impl SecretStore for KeyringSecretStore {
    fn backend_name(&self) -> &'static str {
        self.backend.display_name()
    }

    fn put(&self, key: &str, blob: &SecretBlob) -> Result<()> {
        self.entry(key)?
            .set_secret(blob.as_bytes())
            .map_err(|e| map_keyring_error(e, self.backend_name(), key))?;
        tracing::debug!(key, backend = self.backend_name(), "Stored secret");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<SecretBlob> {
        let bytes = self
            .entry(key)?
            .get_secret()
            .map_err(|e| map_keyring_error(e, self.backend_name(), key))?;
        Ok(SecretBlob::new(bytes))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entry(key)?
            .delete_credential()
            .map_err(|e| map_keyring_error(e, self.backend_name(), key))?;
        tracing::debug!(key, backend = self.backend_name(), "Deleted secret");
        Ok(())
    }

    fn external_location(&self) -> Option<String> {
        Some(format!("{} service \"{}\"", self.backend_name(), self.service))
    }
}

/// Map keyring failures onto the error taxonomy.
pub(crate) fn map_keyring_error(err: keyring::Error, backend: &str, key: &str) -> SwapError {
    match err {
        keyring::Error::NoEntry => SwapError::SecretNotFound {
            key: key.to_string(),
        },
        keyring::Error::NoStorageAccess(inner) => SwapError::SecretStoreUnavailable {
            backend: backend.to_string(),
            message: format!("cannot access storage: {inner}"),
        },
        keyring::Error::PlatformFailure(inner) => SwapError::SecretStoreUnavailable {
            backend: backend.to_string(),
            message: format!("platform failure: {inner}"),
        },
        other => SwapError::SecretStoreUnavailable {
            backend: backend.to_string(),
            message: other.to_string(),
        },
    }
}

// =============================================================================
// File backend
// =============================================================================

/// Secrets as individual base64 files in an owner-only directory.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Directory holding the secret files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(SwapError::Config(format!("invalid secret key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.{SECRET_FILE_EXT}")))
    }
}

impl SecretStore for FileSecretStore {
    fn backend_name(&self) -> &'static str {
        SecretBackend::FileVault.display_name()
    }

    fn put(&self, key: &str, blob: &SecretBlob) -> Result<()> {
        let path = self.path_for(key)?;
        fsops::ensure_private_dir(&self.dir).map_err(|e| SwapError::io_at(&self.dir, e))?;

        let encoded = STANDARD.encode(blob.as_bytes());
        fsops::write_atomic(&path, encoded.as_bytes(), Some(PRIVATE_FILE_MODE))
            .map_err(|e| SwapError::io_at(&path, e))?;

        tracing::debug!(key, path = %path.display(), "Stored secret file");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<SecretBlob> {
        let path = self.path_for(key)?;
        let encoded = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SwapError::SecretNotFound {
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(SwapError::io_at(&path, e)),
        };

        STANDARD
            .decode(encoded.trim())
            .map(SecretBlob::new)
            .map_err(|e| SwapError::corrupt(&path, format!("secret file is not valid base64: {e}")))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(key, "Deleted secret file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SwapError::SecretNotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(SwapError::io_at(&path, e)),
        }
    }
}
