//! Account registry.
//!
//! Single JSON file under the backup root; the only authority on which
//! accounts exist and which one is active. Every mutation is persisted
//! immediately with temp-file + rename, so readers never see a partial file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwapError};
use crate::storage::secrets::account_key;
use crate::storage::snapshots::snapshot_ref;
use crate::util::fsops::{self, PRIVATE_FILE_MODE};

/// Registry file name under the backup root.
pub const REGISTRY_FILE: &str = "registry.json";

const CURRENT_VERSION: u32 = 1;

/// One managed account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Stable id, never reused.
    pub id: u64,
    /// Unique label (usually the account email).
    pub label: String,
    /// Host-side account UUID, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub added_at: DateTime<Utc>,
    pub last_captured_at: DateTime<Utc>,
    /// Snapshot handle (directory name under the snapshot root).
    pub snapshot_ref: String,
    /// Secret store key.
    pub secret_ref: String,
}

impl Account {
    /// Whether a host login belongs to this account: same host UUID, or an
    /// email equal to the label.
    #[must_use]
    pub fn matches_login(&self, email: Option<&str>, uuid: Option<&str>) -> bool {
        let same_uuid = matches!((self.uuid.as_deref(), uuid), (Some(ours), Some(theirs)) if ours == theirs);
        same_uuid || email.is_some_and(|email| email.trim().eq_ignore_ascii_case(&self.label))
    }
}

/// On-disk registry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFile {
    pub version: u32,
    #[serde(default)]
    pub active_account_id: Option<u64>,
    pub next_id: u64,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            active_account_id: None,
            next_id: 1,
            accounts: Vec::new(),
            last_updated: None,
        }
    }
}

/// Loaded registry bound to its file.
#[derive(Debug, Clone)]
pub struct Registry {
    data: RegistryFile,
    path: PathBuf,
}

impl Registry {
    /// Load from file, or start empty if the file does not exist.
    ///
    /// # Errors
    /// `CorruptState` if the file is unreadable JSON or breaks an invariant.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    data: RegistryFile::default(),
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(SwapError::io_at(path, e)),
        };

        let data: RegistryFile =
            serde_json::from_slice(&bytes).map_err(|e| SwapError::corrupt(path, e.to_string()))?;
        validate(&data).map_err(|message| SwapError::corrupt(path, message))?;

        tracing::debug!(
            path = %path.display(),
            accounts = data.accounts.len(),
            active = ?data.active_account_id,
            "Loaded registry"
        );
        Ok(Self {
            data,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accounts in list order.
    #[must_use]
    pub fn list(&self) -> &[Account] {
        &self.data.accounts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.accounts.is_empty()
    }

    #[must_use]
    pub const fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.data.last_updated
    }

    /// Id the next added account will receive.
    #[must_use]
    pub const fn next_id(&self) -> u64 {
        self.data.next_id
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<&Account> {
        self.data.accounts.iter().find(|a| a.id == id)
    }

    /// 1-based list position of an account.
    #[must_use]
    pub fn position_of(&self, id: u64) -> Option<usize> {
        self.data.accounts.iter().position(|a| a.id == id).map(|i| i + 1)
    }

    /// Account by label (case-insensitive).
    #[must_use]
    pub fn get_by_label(&self, label: &str) -> Option<&Account> {
        let label_lower = label.trim().to_lowercase();
        self.data
            .accounts
            .iter()
            .find(|a| a.label.to_lowercase() == label_lower)
    }

    /// Account a host login belongs to, if any.
    #[must_use]
    pub fn find_login(&self, email: Option<&str>, uuid: Option<&str>) -> Option<&Account> {
        self.data
            .accounts
            .iter()
            .find(|a| a.matches_login(email, uuid))
    }

    #[must_use]
    pub fn get_active(&self) -> Option<&Account> {
        self.data.active_account_id.and_then(|id| self.get(id))
    }

    /// Resolve a selector: 1-based position, then id, then label.
    ///
    /// # Errors
    /// `AccountNotFound` if no interpretation matches.
    pub fn find(&self, selector: &str) -> Result<&Account> {
        let trimmed = selector.trim();
        if let Ok(n) = trimmed.parse::<u64>() {
            let by_position = usize::try_from(n)
                .ok()
                .and_then(|p| p.checked_sub(1))
                .and_then(|i| self.data.accounts.get(i));
            if let Some(account) = by_position.or_else(|| self.get(n)) {
                return Ok(account);
            }
        }
        self.get_by_label(trimmed)
            .ok_or_else(|| SwapError::AccountNotFound(selector.to_string()))
    }

    /// Account after the active one in list order, wrapping around; the
    /// first account when none is active.
    #[must_use]
    pub fn next_after_active(&self) -> Option<&Account> {
        let accounts = &self.data.accounts;
        let next_index = self
            .data
            .active_account_id
            .and_then(|id| accounts.iter().position(|a| a.id == id))
            .map_or(0, |i| (i + 1) % accounts.len());
        accounts.get(next_index)
    }

    /// Register a new account under the next id and persist.
    ///
    /// # Errors
    /// `DuplicateAccount` if the label is taken (case-insensitive).
    pub fn add(&mut self, label: &str, uuid: Option<String>) -> Result<Account> {
        self.insert(label, uuid, false)
    }

    /// Register a new account and make it active in a single write.
    ///
    /// # Errors
    /// As [`Registry::add`]. On a failed write the in-memory registry is left
    /// as it was, matching the file.
    pub fn add_active(&mut self, label: &str, uuid: Option<String>) -> Result<Account> {
        self.insert(label, uuid, true)
    }

    fn insert(&mut self, label: &str, uuid: Option<String>, activate: bool) -> Result<Account> {
        let label = label.trim();
        if label.is_empty() {
            return Err(SwapError::ConfigInvalid {
                key: "label".to_string(),
                value: String::new(),
                message: "label must not be empty".to_string(),
            });
        }
        if self.get_by_label(label).is_some() {
            return Err(SwapError::DuplicateAccount {
                label: label.to_string(),
            });
        }

        let id = self.data.next_id;
        let next_id = id
            .checked_add(1)
            .ok_or_else(|| SwapError::corrupt(&self.path, "nextId is exhausted"))?;
        let now = Utc::now();
        let account = Account {
            id,
            label: label.to_string(),
            uuid,
            added_at: now,
            last_captured_at: now,
            snapshot_ref: snapshot_ref(id),
            secret_ref: account_key(id),
        };

        let prior_active = self.data.active_account_id;
        self.data.accounts.push(account.clone());
        self.data.next_id = next_id;
        if activate {
            self.data.active_account_id = Some(id);
        }
        if let Err(e) = self.save() {
            self.data.accounts.pop();
            self.data.next_id = id;
            self.data.active_account_id = prior_active;
            return Err(e);
        }

        tracing::info!(account_id = id, label = %account.label, active = activate, "Registered account");
        Ok(account)
    }

    /// Remove an account and persist; clears the active id if it was active.
    ///
    /// # Errors
    /// `AccountNotFound` if no account has this id.
    pub fn remove(&mut self, id: u64) -> Result<Account> {
        let index = self
            .data
            .accounts
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| SwapError::AccountNotFound(id.to_string()))?;

        let removed = self.data.accounts.remove(index);
        if self.data.active_account_id == Some(id) {
            self.data.active_account_id = None;
        }
        self.save()?;

        tracing::info!(account_id = id, label = %removed.label, "Removed account");
        Ok(removed)
    }

    /// Mark an account active and persist.
    ///
    /// # Errors
    /// `AccountNotFound` if no account has this id.
    pub fn set_active(&mut self, id: u64) -> Result<()> {
        if self.get(id).is_none() {
            return Err(SwapError::AccountNotFound(id.to_string()));
        }
        self.data.active_account_id = Some(id);
        self.save()
    }

    /// Record a fresh capture for an account and persist.
    ///
    /// # Errors
    /// `AccountNotFound` if no account has this id.
    pub fn mark_captured(&mut self, id: u64, uuid: Option<String>) -> Result<()> {
        let account = self
            .data
            .accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| SwapError::AccountNotFound(id.to_string()))?;
        account.last_captured_at = Utc::now();
        if uuid.is_some() {
            account.uuid = uuid;
        }
        self.save()
    }

    /// Persist atomically.
    pub fn save(&mut self) -> Result<()> {
        self.data.last_updated = Some(Utc::now());
        let content = serde_json::to_vec_pretty(&self.data)?;
        fsops::write_atomic(&self.path, &content, Some(PRIVATE_FILE_MODE))
            .map_err(|e| SwapError::io_at(&self.path, e))
    }
}

fn validate(data: &RegistryFile) -> std::result::Result<(), String> {
    if data.version > CURRENT_VERSION {
        return Err(format!("unsupported registry version {}", data.version));
    }

    let mut ids = std::collections::HashSet::new();
    let mut labels = std::collections::HashSet::new();
    for account in &data.accounts {
        if !ids.insert(account.id) {
            return Err(format!("duplicate account id {}", account.id));
        }
        if !labels.insert(account.label.to_lowercase()) {
            return Err(format!("duplicate account label '{}'", account.label));
        }
        if account.id >= data.next_id {
            return Err(format!(
                "account id {} is not below nextId {}",
                account.id, data.next_id
            ));
        }
    }

    if let Some(active) = data.active_account_id
        && !ids.contains(&active)
    {
        return Err(format!("active account {active} does not exist"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(dir: &Path) -> Registry {
        Registry::load(&dir.join(REGISTRY_FILE)).unwrap()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        assert!(reg.is_empty());
        assert!(reg.get_active().is_none());
        assert_eq!(reg.next_id(), 1);
    }

    #[test]
    fn ids_are_never_reused_after_removal() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path());

        let a = reg.add("a@x.com", None).unwrap();
        let b = reg.add("b@x.com", None).unwrap();
        reg.remove(b.id).unwrap();
        let c = reg.add("c@x.com", None).unwrap();

        assert_eq!((a.id, b.id, c.id), (1, 2, 3));

        let reloaded = registry(dir.path());
        assert_eq!(reloaded.next_id(), 4);
        let ids: Vec<u64> = reloaded.list().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn duplicate_label_is_rejected_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path());
        reg.add("a@x.com", None).unwrap();

        let err = reg.add("A@X.com", None).unwrap_err();
        assert!(matches!(err, SwapError::DuplicateAccount { .. }));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn find_tries_position_then_id_then_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path());
        for label in ["a@x.com", "b@x.com", "c@x.com"] {
            reg.add(label, None).unwrap();
        }
        reg.remove(1).unwrap();
        // List is now [id 2, id 3].

        assert_eq!(reg.find("1").unwrap().id, 2);
        assert_eq!(reg.find("2").unwrap().id, 3);
        assert_eq!(reg.find("3").unwrap().id, 3);
        assert_eq!(reg.find("C@x.com").unwrap().id, 3);
        assert!(matches!(
            reg.find("9"),
            Err(SwapError::AccountNotFound(ref s)) if s == "9"
        ));
        assert!(reg.find("nobody@x.com").is_err());
    }

    #[test]
    fn removing_active_clears_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path());
        reg.add("a@x.com", None).unwrap();
        let b = reg.add("b@x.com", None).unwrap();
        reg.set_active(b.id).unwrap();

        reg.remove(b.id).unwrap();
        assert!(reg.get_active().is_none());
        assert!(registry(dir.path()).get_active().is_none());
    }

    #[test]
    fn next_after_active_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path());
        assert!(reg.next_after_active().is_none());

        for label in ["a", "b", "c"] {
            reg.add(label, None).unwrap();
        }
        assert_eq!(reg.next_after_active().unwrap().id, 1);

        reg.set_active(3).unwrap();
        assert_eq!(reg.next_after_active().unwrap().id, 1);
        reg.set_active(1).unwrap();
        assert_eq!(reg.next_after_active().unwrap().id, 2);
    }

    #[test]
    fn set_active_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path());
        assert!(matches!(
            reg.set_active(5),
            Err(SwapError::AccountNotFound(_))
        ));
    }

    #[test]
    fn malformed_file_is_corrupt_not_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REGISTRY_FILE);
        std::fs::write(&path, "{\"version\":1,").unwrap();

        let err = Registry::load(&path).unwrap_err();
        assert!(matches!(err, SwapError::CorruptState { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"version\":1,");
    }

    #[test]
    fn dangling_active_id_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REGISTRY_FILE);
        std::fs::write(
            &path,
            r#"{"version":1,"activeAccountId":7,"nextId":1,"accounts":[]}"#,
        )
        .unwrap();

        assert!(matches!(
            Registry::load(&path),
            Err(SwapError::CorruptState { .. })
        ));
    }

    #[test]
    fn persisted_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path());
        let account = reg.add("a@x.com", Some("uuid-1".into())).unwrap();
        reg.set_active(account.id).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(REGISTRY_FILE)).unwrap();
        assert!(raw.contains("\"activeAccountId\": 1"));
        assert!(raw.contains("\"snapshotRef\": \"account-1\""));
        assert!(raw.contains("\"secretRef\": \"account-1\""));
    }

    #[test]
    fn add_active_registers_and_activates_in_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path());
        reg.add("a@x.com", None).unwrap();

        let b = reg.add_active("b@x.com", None).unwrap();

        let reloaded = registry(dir.path());
        assert_eq!(reloaded.get_active().unwrap().id, b.id);
        assert_eq!(reloaded.next_id(), 3);
    }

    #[test]
    fn failed_write_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REGISTRY_FILE);
        let mut reg = Registry::load(&path).unwrap();
        reg.add("a@x.com", None).unwrap();
        reg.set_active(1).unwrap();

        // A non-empty directory in place of the file makes the rename fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        assert!(reg.add_active("b@x.com", None).is_err());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.next_id(), 2);
        assert_eq!(reg.get_active().unwrap().id, 1);
        assert!(reg.get_by_label("b@x.com").is_none());
    }

    #[test]
    fn exhausted_next_id_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REGISTRY_FILE);
        std::fs::write(
            &path,
            format!(r#"{{"version":1,"nextId":{},"accounts":[]}}"#, u64::MAX),
        )
        .unwrap();

        let mut reg = Registry::load(&path).unwrap();
        let err = reg.add("a@x.com", None).unwrap_err();
        assert!(matches!(err, SwapError::CorruptState { .. }));
        assert!(reg.is_empty());
    }

    #[test]
    fn login_matches_by_uuid_or_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path());
        reg.add("work", Some("uuid-a".into())).unwrap();
        reg.add("b@x.com", None).unwrap();

        assert_eq!(reg.find_login(Some("a@x.com"), Some("uuid-a")).unwrap().label, "work");
        assert_eq!(reg.find_login(Some("B@x.com"), Some("uuid-b")).unwrap().label, "b@x.com");
        assert!(reg.find_login(Some("c@x.com"), Some("uuid-other")).is_none());
        assert!(reg.find_login(Some("c@x.com"), None).is_none());
    }
}
