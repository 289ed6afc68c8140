//! Swap engine: capture, restore, and teardown of managed accounts.
//!
//! Each mutating operation runs under the vault lock and follows one rule:
//! everything the operation needs is built or fetched before the first
//! durable write, and the registry is written last. A failure therefore
//! leaves the registry describing state that is still intact on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::core::host::{HostLayout, Identity};
use crate::core::lock::{DEFAULT_LOCK_TIMEOUT, VaultLock};
use crate::error::{Result, SwapError};
use crate::storage::config::{LiveSlotConfig, ResolvedConfig};
use crate::storage::live_secret::{CredentialsFileSlot, KeychainSlot, LiveSecretSlot};
use crate::storage::paths::BackupLayout;
use crate::storage::registry::{Account, Registry};
use crate::storage::secrets::{self, SecretBlob, SecretStore};
use crate::storage::snapshots::SnapshotStore;
use crate::util::fsops::{self, PRIVATE_FILE_MODE, Recovery};

/// Engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub lock_timeout: Duration,
    pub recapture_on_switch: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            recapture_on_switch: true,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Account plus its list position.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntry {
    /// 1-based list position.
    pub position: usize,
    pub active: bool,
    #[serde(flatten)]
    pub account: Account,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOutcome {
    pub account: AccountEntry,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchOutcome {
    pub account: AccountEntry,
    pub previous: Option<Account>,
    /// False when the target was already active.
    pub changed: bool,
    /// Whether the signed-in account was re-captured first.
    pub recaptured: bool,
    /// Unmanaged live login registered before the restore so it survives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adopted: Option<Account>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveOutcome {
    pub account: Account,
    pub was_active: bool,
    pub snapshot_deleted: bool,
    pub secret_deleted: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeOutcome {
    pub accounts_removed: usize,
    pub secrets_deleted: usize,
    /// The registry could not be read; stored secrets outside the backup
    /// root may remain.
    pub registry_unreadable: bool,
    /// Where those leftover secrets live, when the store keeps them outside
    /// the backup root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leftover_secrets: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub active: Option<AccountEntry>,
    pub total: usize,
    /// Identity currently signed in to the host.
    pub live_identity: Option<Identity>,
    /// Live identity matches no managed account.
    pub live_unmanaged: bool,
}

/// Resolved locations, for `cswap paths`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub backup_root: PathBuf,
    pub registry_file: PathBuf,
    pub snapshots_dir: PathBuf,
    pub log_dir: PathBuf,
    pub secret_backend: String,
    pub host_config_dir: PathBuf,
    pub identity_file: Option<PathBuf>,
    pub live_secret: String,
}

// =============================================================================
// Engine
// =============================================================================

/// Orchestrates registry, snapshots, and secrets.
pub struct SwapEngine {
    layout: BackupLayout,
    host: HostLayout,
    live_secret: Box<dyn LiveSecretSlot>,
    secrets: Box<dyn SecretStore>,
    snapshots: SnapshotStore,
    settings: EngineSettings,
}

impl SwapEngine {
    #[must_use]
    pub fn new(
        backup_root: impl Into<PathBuf>,
        host: HostLayout,
        live_secret: Box<dyn LiveSecretSlot>,
        secrets: Box<dyn SecretStore>,
        settings: EngineSettings,
    ) -> Self {
        let layout = BackupLayout::new(backup_root);
        let snapshots = SnapshotStore::new(layout.snapshots_dir());
        Self {
            layout,
            host,
            live_secret,
            secrets,
            snapshots,
            settings,
        }
    }

    /// Build the engine for a resolved configuration. Backends are chosen
    /// here, once.
    #[must_use]
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let layout = BackupLayout::new(&config.backup_root);
        let secrets = secrets::open_store(
            config.secret_backend,
            &config.keyring_service,
            &layout.credentials_dir(),
        );
        let live_secret: Box<dyn LiveSecretSlot> = match &config.live_slot {
            LiveSlotConfig::File(path) => Box::new(CredentialsFileSlot::new(path)),
            LiveSlotConfig::Keychain { service, account } => {
                Box::new(KeychainSlot::new(service, account))
            }
        };
        tracing::debug!(
            platform = %config.platform,
            backend = config.secret_backend.display_name(),
            live = %live_secret.describe(),
            "Selected storage backends"
        );

        Self::new(
            &config.backup_root,
            HostLayout::new(&config.host_dir, config.identity_candidates.clone()),
            live_secret,
            secrets,
            EngineSettings {
                lock_timeout: config.lock_timeout,
                recapture_on_switch: config.recapture_on_switch,
            },
        )
    }

    #[must_use]
    pub fn backup_root(&self) -> &Path {
        &self.layout.root
    }

    #[must_use]
    pub const fn host(&self) -> &HostLayout {
        &self.host
    }

    #[must_use]
    pub const fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    #[must_use]
    pub fn secrets(&self) -> &dyn SecretStore {
        self.secrets.as_ref()
    }

    /// Read the registry as currently persisted.
    pub fn registry(&self) -> Result<Registry> {
        Registry::load(&self.layout.registry_file())
    }

    fn lock(&self) -> Result<VaultLock> {
        VaultLock::acquire(&self.layout.root, self.settings.lock_timeout)
    }

    /// Finish or roll back a live-directory swap a crashed process left
    /// behind, and clear stale staging directories.
    pub fn recover_interrupted(&self) -> Result<Recovery> {
        let dir = &self.host.config_dir;
        let outcome = fsops::recover_swap(dir).map_err(|e| SwapError::io_at(dir, e))?;
        match outcome {
            Recovery::Clean => {}
            Recovery::Completed => {
                tracing::warn!(path = %dir.display(), "Completed interrupted restore");
            }
            Recovery::RolledBack => {
                tracing::warn!(path = %dir.display(), "Rolled back interrupted restore");
            }
        }
        Ok(outcome)
    }

    /// Live credential file relative to the config dir, when it lives inside it.
    fn live_secret_in_config(&self) -> Option<PathBuf> {
        self.live_secret
            .file_path()
            .and_then(|path| self.host.relative_to_config(path))
    }

    fn snapshot_exclusions(&self) -> Vec<PathBuf> {
        self.live_secret_in_config().into_iter().collect()
    }

    fn read_live_secret(&self) -> Result<SecretBlob> {
        self.live_secret
            .read()?
            .ok_or_else(|| SwapError::NoLiveCredential {
                reason: format!("{} is empty", self.live_secret.describe()),
            })
    }

    /// Capture live state into the snapshot and secret for `account_id`.
    fn capture_live(&self, account_id: u64, blob: &SecretBlob) -> Result<()> {
        let external_identity = self.host.external_identity_section()?;
        self.snapshots.capture(
            account_id,
            &self.host.config_dir,
            &self.snapshot_exclusions(),
            external_identity,
        )?;
        self.secrets.put(&secrets::account_key(account_id), blob)
    }

    // -------------------------------------------------------------------------
    // AddAccount
    // -------------------------------------------------------------------------

    /// Capture the live host state as a new account and make it active.
    ///
    /// # Errors
    /// `NoLiveCredential` if the host is not logged in (or no label can be
    /// derived), `DuplicateAccount` if the label is already managed.
    pub fn add_account(&self, label: Option<&str>) -> Result<AddOutcome> {
        let _lock = self.lock()?;
        self.recover_interrupted()?;
        let mut registry = self.registry()?;

        if !self.host.has_config_dir() {
            return Err(SwapError::NoLiveCredential {
                reason: format!("{} does not exist", self.host.config_dir.display()),
            });
        }
        let blob = self.read_live_secret()?;

        let identity = self.host.identity().unwrap_or_default();
        let label = match label.map(str::trim).filter(|l| !l.is_empty()) {
            Some(label) => label.to_string(),
            None => identity
                .label()
                .map(str::to_string)
                .ok_or_else(|| SwapError::NoLiveCredential {
                    reason: "no account email found in the host identity file; pass --label"
                        .to_string(),
                })?,
        };
        if registry.get_by_label(&label).is_some() {
            return Err(SwapError::DuplicateAccount { label });
        }

        tracing::info!(account_id = registry.next_id(), label = %label, "Adding account");
        let account = self.register_live(&mut registry, &label, identity.account_uuid.clone(), &blob)?;

        Ok(AddOutcome {
            account: AccountEntry {
                position: registry.position_of(account.id).unwrap_or(registry.len()),
                active: true,
                account,
            },
            total: registry.len(),
        })
    }

    /// Capture the live host under the next id, then register it as the
    /// active account in one registry write. Captured state is discarded when
    /// either step fails, so the registry never names missing state.
    fn register_live(
        &self,
        registry: &mut Registry,
        label: &str,
        uuid: Option<String>,
        blob: &SecretBlob,
    ) -> Result<Account> {
        let id = registry.next_id();
        let registered = self
            .capture_live(id, blob)
            .and_then(|()| registry.add_active(label, uuid));
        if registered.is_err() {
            self.discard_owned_state(id);
        }
        registered
    }

    fn discard_owned_state(&self, account_id: u64) {
        if let Err(e) = self.snapshots.delete_if_exists(account_id) {
            tracing::warn!(account_id, error = %e, "Failed to discard snapshot");
        }
        if let Err(e) =
            secrets::delete_if_exists(self.secrets.as_ref(), &secrets::account_key(account_id))
        {
            tracing::warn!(account_id, error = %e, "Failed to discard secret");
        }
    }

    // -------------------------------------------------------------------------
    // Switch
    // -------------------------------------------------------------------------

    /// Make the selected account (or the next one) live.
    ///
    /// # Errors
    /// `AccountNotFound` if the selector resolves to nothing or no accounts
    /// exist.
    pub fn switch(&self, selector: Option<&str>) -> Result<SwitchOutcome> {
        let _lock = self.lock()?;
        self.recover_interrupted()?;
        let mut registry = self.registry()?;

        let target = match selector {
            Some(selector) => registry.find(selector)?.clone(),
            None => registry
                .next_after_active()
                .cloned()
                .ok_or_else(|| SwapError::AccountNotFound("next".to_string()))?,
        };
        let adopted = self.adopt_unmanaged_live(&mut registry)?;
        let previous = registry.get_active().cloned();

        if previous.as_ref().is_some_and(|p| p.id == target.id) {
            tracing::info!(account_id = target.id, "Target already active");
            return Ok(SwitchOutcome {
                account: entry_for(&registry, target),
                previous,
                changed: false,
                recaptured: false,
                adopted,
            });
        }

        let recaptured = match &previous {
            Some(active) if adopted.is_none() && self.settings.recapture_on_switch => {
                self.recapture_live(&mut registry, active)?
            }
            _ => false,
        };

        tracing::info!(
            from = ?previous.as_ref().map(|a| a.id),
            to = target.id,
            "Switching account"
        );
        self.make_live(&target)?;
        registry.set_active(target.id)?;

        Ok(SwitchOutcome {
            account: entry_for(&registry, target),
            previous,
            changed: true,
            recaptured,
            adopted,
        })
    }

    /// Register a signed-in login that matches no managed account, so the
    /// restore that follows does not overwrite it. The new account becomes
    /// active.
    fn adopt_unmanaged_live(&self, registry: &mut Registry) -> Result<Option<Account>> {
        let Some(identity) = self.host.identity() else {
            return Ok(None);
        };
        let Some(label) = identity.label() else {
            return Ok(None);
        };
        if registry
            .find_login(Some(label), identity.account_uuid.as_deref())
            .is_some()
            || !self.host.has_config_dir()
        {
            return Ok(None);
        }
        let Some(blob) = self.live_secret.read()? else {
            tracing::debug!(live = %label, "Unmanaged identity is logged out; nothing to keep");
            return Ok(None);
        };

        tracing::warn!(live = %label, "Live login is not managed; adding it before switching");
        let account = self.register_live(registry, label, identity.account_uuid.clone(), &blob)?;
        Ok(Some(account))
    }

    /// Refresh the stored copy of the managed account that is signed in.
    /// That is normally the active one; a login without any identity is
    /// taken to be the active account.
    fn recapture_live(&self, registry: &mut Registry, active: &Account) -> Result<bool> {
        if !self.host.has_config_dir() {
            return Ok(false);
        }
        let identity = self
            .host
            .identity()
            .filter(|i| i.email.is_some() || i.account_uuid.is_some());
        let owner = match &identity {
            None => active.clone(),
            Some(identity) => {
                let found = registry
                    .find_login(identity.email.as_deref(), identity.account_uuid.as_deref())
                    .cloned();
                let Some(owner) = found else {
                    tracing::warn!(
                        account_id = active.id,
                        live = identity.email.as_deref().unwrap_or_default(),
                        "Live identity is not managed; skipping re-capture"
                    );
                    return Ok(false);
                };
                owner
            }
        };
        if owner.id != active.id {
            tracing::warn!(
                account_id = owner.id,
                active = active.id,
                "Live login belongs to another account; re-capturing it instead"
            );
        }
        let Some(blob) = self.live_secret.read()? else {
            tracing::debug!(account_id = owner.id, "Host logged out; skipping re-capture");
            return Ok(false);
        };

        self.capture_live(owner.id, &blob)?;
        registry.mark_captured(owner.id, identity.and_then(|i| i.account_uuid))?;
        tracing::debug!(account_id = owner.id, "Re-captured live account");
        Ok(true)
    }

    /// Restore `target`'s snapshot into the live dir and write its secret to
    /// the live slot.
    fn make_live(&self, target: &Account) -> Result<()> {
        let blob = self.secrets.get(&target.secret_ref)?;
        let staged = self
            .snapshots
            .stage_restore(target.id, &self.host.config_dir)?;

        // A credential file inside the config dir is swapped in together
        // with the tree.
        let inline_secret = self.live_secret_in_config();
        if let Some(relative) = &inline_secret {
            let path = staged.path().join(relative);
            fsops::write_atomic(&path, blob.as_bytes(), Some(PRIVATE_FILE_MODE))
                .map_err(|e| SwapError::io_at(&path, e))?;
        }

        let meta = staged.commit()?;

        if inline_secret.is_none() {
            self.live_secret.write(&blob)?;
        }
        if let Some(section) = &meta.external_identity {
            self.host.write_external_identity_section(section)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // RemoveAccount
    // -------------------------------------------------------------------------

    /// Delete an account's snapshot and secret, then its registry entry.
    ///
    /// # Errors
    /// `AccountNotFound` if the selector resolves to nothing.
    pub fn remove_account(&self, selector: &str) -> Result<RemoveOutcome> {
        let _lock = self.lock()?;
        self.recover_interrupted()?;
        let mut registry = self.registry()?;

        let account = registry.find(selector)?.clone();
        let was_active = registry.get_active().is_some_and(|a| a.id == account.id);

        let snapshot_deleted = self.snapshots.delete_if_exists(account.id)?;
        let secret_deleted = secrets::delete_if_exists(self.secrets.as_ref(), &account.secret_ref)?;
        registry.remove(account.id)?;

        Ok(RemoveOutcome {
            account,
            was_active,
            snapshot_deleted,
            secret_deleted,
        })
    }

    // -------------------------------------------------------------------------
    // Purge
    // -------------------------------------------------------------------------

    /// Delete every snapshot, secret, and the registry.
    ///
    /// Absent files are not an error. An unreadable registry does not stop
    /// the purge. The backup root and its lock file stay: a waiter may
    /// already hold the lock file open, and unlinking it would let a later
    /// process lock a fresh inode alongside it.
    pub fn purge(&self) -> Result<PurgeOutcome> {
        let _lock = self.lock()?;
        self.recover_interrupted()?;
        let mut outcome = PurgeOutcome::default();

        let accounts = match self.registry() {
            Ok(registry) => registry.list().to_vec(),
            Err(e @ SwapError::CorruptState { .. }) => {
                tracing::warn!(error = %e, "Purging with unreadable registry");
                outcome.registry_unreadable = true;
                outcome.leftover_secrets = self.secrets.external_location();
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        for account in &accounts {
            if secrets::delete_if_exists(self.secrets.as_ref(), &account.secret_ref)? {
                outcome.secrets_deleted += 1;
            }
        }
        outcome.accounts_removed = accounts.len();

        self.clear_backup_root()?;

        tracing::info!(accounts = outcome.accounts_removed, "Purged vault");
        Ok(outcome)
    }

    /// Remove everything under the backup root except the lock file.
    /// The registry goes first so a failure midway never leaves entries
    /// pointing at deleted snapshots.
    fn clear_backup_root(&self) -> Result<()> {
        let root = &self.layout.root;
        let registry_file = self.layout.registry_file();
        fsops::remove_path_if_exists(&registry_file).map_err(|e| SwapError::io_at(&registry_file, e))?;

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(SwapError::io_at(root, e)),
        };
        let lock_path = self.layout.lock_file();
        for entry in entries {
            let path = entry.map_err(|e| SwapError::io_at(root, e))?.path();
            if path == lock_path {
                continue;
            }
            fsops::remove_path_if_exists(&path).map_err(|e| SwapError::io_at(&path, e))?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Read-only
    // -------------------------------------------------------------------------

    /// Accounts in list order.
    pub fn list(&self) -> Result<Vec<AccountEntry>> {
        let registry = self.registry()?;
        Ok(registry
            .list()
            .iter()
            .cloned()
            .map(|account| entry_for(&registry, account))
            .collect())
    }

    /// Active account and how it relates to the live host.
    pub fn status(&self) -> Result<StatusReport> {
        let registry = self.registry()?;
        let active = registry.get_active().cloned().map(|a| entry_for(&registry, a));
        let live_identity = self.host.identity();

        let live_unmanaged = live_identity.as_ref().is_some_and(|identity| {
            identity.email.is_some()
                && registry
                    .find_login(identity.email.as_deref(), identity.account_uuid.as_deref())
                    .is_none()
        });

        Ok(StatusReport {
            active,
            total: registry.len(),
            live_identity,
            live_unmanaged,
        })
    }

    /// Resolved locations and backends.
    #[must_use]
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            backup_root: self.layout.root.clone(),
            registry_file: self.layout.registry_file(),
            snapshots_dir: self.layout.snapshots_dir(),
            log_dir: self.layout.log_dir(),
            secret_backend: self.secrets.backend_name().to_string(),
            host_config_dir: self.host.config_dir.clone(),
            identity_file: self.host.identity_file(),
            live_secret: self.live_secret.describe(),
        }
    }
}

fn entry_for(registry: &Registry, account: Account) -> AccountEntry {
    AccountEntry {
        position: registry.position_of(account.id).unwrap_or_default(),
        active: registry.get_active().is_some_and(|a| a.id == account.id),
        account,
    }
}
