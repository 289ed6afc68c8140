//! Test utilities for cswap.
//!
//! Provides a fake host home directory, in-memory and failing secret
//! stores, and output helpers shared by unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cswap::test_utils::*;
//!
//! let host = TestHost::new();
//! host.login("a@x.com", "token-a");
//! let engine = host.engine();
//! engine.add_account(None).unwrap();
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Value, json};

use crate::core::engine::{EngineSettings, SwapEngine};
use crate::core::host::HostLayout;
use crate::error::{Result, SwapError};
use crate::storage::live_secret::{CREDENTIALS_FILE_NAME, CredentialsFileSlot};
use crate::storage::paths::BackupLayout;
use crate::storage::secrets::{FileSecretStore, SecretBlob, SecretStore};

/// Marker file every fake login writes into the config dir.
pub const PROFILE_MARKER: &str = "profile.txt";

// =============================================================================
// Temp Directory Utilities
// =============================================================================

/// A temporary directory with automatic cleanup.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Write `content` to `name`, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn create_file(&self, name: &str, content: &str) {
        write_file(&self.inner.path().join(name), content);
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    fs::write(path, content).expect("Failed to write test file");
}

// =============================================================================
// Fake host
// =============================================================================

/// A fake home directory holding a host config dir, identity file,
/// credential file, and backup root.
///
/// Layout under the temp dir:
/// - `.claude/` config dir with `settings.json` and a profile marker
/// - `.claude/.credentials.json` live credential
/// - `.claude.json` identity file with an `oauthAccount` section
/// - `.claude-swap-backup/` backup root
pub struct TestHost {
    dir: TestDir,
}

impl TestHost {
    /// Empty home with only the config dir created.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let host = Self { dir: TestDir::new() };
        fs::create_dir_all(host.config_dir()).expect("Failed to create config dir");
        host
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.home().join(".claude")
    }

    #[must_use]
    pub fn identity_file(&self) -> PathBuf {
        self.home().join(".claude.json")
    }

    #[must_use]
    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir().join(CREDENTIALS_FILE_NAME)
    }

    #[must_use]
    pub fn backup_root(&self) -> PathBuf {
        self.home().join(".claude-swap-backup")
    }

    #[must_use]
    pub fn layout(&self) -> BackupLayout {
        BackupLayout::new(self.backup_root())
    }

    #[must_use]
    pub fn host_layout(&self) -> HostLayout {
        HostLayout::new(
            self.config_dir(),
            vec![self.config_dir().join(".claude.json"), self.identity_file()],
        )
    }

    /// Simulate the host signing in as `email` with `token`.
    ///
    /// Rewrites the identity section (keeping other top-level keys), the
    /// credential file, and the profile marker.
    pub fn login(&self, email: &str, token: &str) {
        let mut identity = self.identity_json().unwrap_or_else(|| json!({}));
        identity["oauthAccount"] = json!({
            "emailAddress": email,
            "accountUuid": uuid_for(email),
        });
        identity["numStartups"] = json!(identity["numStartups"].as_u64().unwrap_or(0) + 1);
        write_file(
            &self.identity_file(),
            &serde_json::to_string_pretty(&identity).expect("serialize identity"),
        );
        write_file(&self.credentials_file(), &credential_json(token));
        write_file(&self.config_dir().join(PROFILE_MARKER), email);
        write_file(
            &self.config_dir().join("settings.json"),
            &format!("{{\"theme\":\"dark\",\"owner\":\"{email}\"}}"),
        );
    }

    /// Simulate the host signing out: credential and identity section go.
    pub fn logout(&self) {
        let _ = fs::remove_file(self.credentials_file());
        if let Some(mut identity) = self.identity_json()
            && let Some(map) = identity.as_object_mut()
        {
            map.remove("oauthAccount");
            write_file(&self.identity_file(), &identity.to_string());
        }
    }

    /// Write an extra file into the live config dir.
    pub fn write_config_file(&self, name: &str, content: &str) {
        write_file(&self.config_dir().join(name), content);
    }

    /// Contents of a live config file, if present.
    #[must_use]
    pub fn read_config_file(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.config_dir().join(name)).ok()
    }

    /// Email recorded in the profile marker of the live config dir.
    #[must_use]
    pub fn live_profile(&self) -> Option<String> {
        self.read_config_file(PROFILE_MARKER)
    }

    /// Email in the live identity file.
    #[must_use]
    pub fn live_email(&self) -> Option<String> {
        self.identity_json()?["oauthAccount"]["emailAddress"]
            .as_str()
            .map(str::to_string)
    }

    /// Raw live credential.
    #[must_use]
    pub fn live_credential(&self) -> Option<String> {
        fs::read_to_string(self.credentials_file()).ok()
    }

    #[must_use]
    pub fn identity_json(&self) -> Option<Value> {
        let raw = fs::read_to_string(self.identity_file()).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Engine over this host with a file vault under the backup root.
    #[must_use]
    pub fn engine(&self) -> SwapEngine {
        self.engine_with_store(Box::new(FileSecretStore::new(
            &self.layout().credentials_dir(),
        )))
    }

    /// Engine over this host with a caller-supplied secret store.
    #[must_use]
    pub fn engine_with_store(&self, store: Box<dyn SecretStore>) -> SwapEngine {
        SwapEngine::new(
            self.backup_root(),
            self.host_layout(),
            Box::new(CredentialsFileSlot::new(self.credentials_file())),
            store,
            test_settings(),
        )
    }

    /// Environment for running the binary against this host.
    #[must_use]
    pub fn cli_env(&self) -> Vec<(&'static str, PathBuf)> {
        vec![
            ("HOME", self.home().to_path_buf()),
            ("CSWAP_CONFIG", self.home().join("cswap-config.toml")),
            ("CSWAP_BACKUP_DIR", self.backup_root()),
            ("CSWAP_HOST_DIR", self.config_dir()),
            ("CSWAP_SECRET_BACKEND", PathBuf::from("file")),
            ("CSWAP_HOST_SECRET", PathBuf::from("file")),
            ("CSWAP_ALLOW_ROOT", PathBuf::from("1")),
        ]
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine settings for tests: short lock timeout, re-capture on.
#[must_use]
pub const fn test_settings() -> EngineSettings {
    EngineSettings {
        lock_timeout: Duration::from_secs(2),
        recapture_on_switch: true,
    }
}

/// Stable fake account UUID derived from an email.
#[must_use]
pub fn uuid_for(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    format!("00000000-0000-4000-8000-{local:0>12}")
}

/// Credential file body the way the host writes it.
#[must_use]
pub fn credential_json(token: &str) -> String {
    json!({
        "claudeAiOauth": {
            "accessToken": token,
            "refreshToken": format!("refresh-{token}"),
            "expiresAt": 1_900_000_000_000_u64,
        }
    })
    .to_string()
}

// =============================================================================
// Secret stores
// =============================================================================

/// Secret store kept in memory.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl SecretStore for MemorySecretStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn put(&self, key: &str, secret: &SecretBlob) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), secret.as_bytes().to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<SecretBlob> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .map(SecretBlob::from)
            .ok_or_else(|| SwapError::SecretNotFound {
                key: key.to_string(),
            })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| SwapError::SecretNotFound {
                key: key.to_string(),
            })
    }
    fn external_location(&self) -> Option<String> {
        Some("memory store".to_string())
    }
}

/// Secret store whose every operation is refused, like a locked keychain.
pub struct FailingSecretStore;

impl FailingSecretStore {
    fn refused() -> SwapError {
        SwapError::SecretStoreUnavailable {
            backend: "failing".to_string(),
            message: "access denied".to_string(),
        }
    }
}

impl SecretStore for FailingSecretStore {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    fn put(&self, _key: &str, _secret: &SecretBlob) -> Result<()> {
        Err(Self::refused())
    }

    fn get(&self, _key: &str) -> Result<SecretBlob> {
        Err(Self::refused())
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Err(Self::refused())
    }
}

// =============================================================================
// Output helpers
// =============================================================================

/// Check if a string contains ANSI escape sequences.
#[must_use]
pub fn has_ansi_codes(text: &str) -> bool {
    text.contains('\x1b')
}

/// Parse robot-mode output, panicking with the raw text on failure.
///
/// # Panics
///
/// Panics if `text` is not a JSON document.
#[must_use]
pub fn parse_robot(text: &str) -> Value {
    serde_json::from_str(text.trim()).unwrap_or_else(|e| panic!("invalid JSON ({e}): {text}"))
}
