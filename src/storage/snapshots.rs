//! Per-account snapshots of the host's live configuration directory.
//!
//! Layout under the snapshot root:
//!
//! ```text
//! account-<id>/
//!   tree/        copy of the live config dir
//!   meta.json    capture time, counts, SHA-256 of tree/
//! ```
//!
//! Both capture and restore build the full result in a sibling staging
//! directory and then swap it into place, so an interrupted call leaves the
//! previous state intact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SwapError};
use crate::util::fsops::{self, PRIVATE_FILE_MODE};

const TREE_DIR: &str = "tree";
const META_FILE: &str = "meta.json";

/// Snapshot metadata stored next to the copied tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub captured_at: DateTime<Utc>,
    pub files: u64,
    pub bytes: u64,
    /// Hex SHA-256 of the copied tree.
    pub digest: String,
    /// Host identity section kept outside the config dir, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_identity: Option<Value>,
}

/// Snapshot handle recorded in the registry.
#[must_use]
pub fn snapshot_ref(account_id: u64) -> String {
    format!("account-{account_id}")
}

/// Snapshot directory store.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, account_id: u64) -> PathBuf {
        self.root.join(snapshot_ref(account_id))
    }

    #[must_use]
    pub fn exists(&self, account_id: u64) -> bool {
        self.entry_dir(account_id).is_dir()
    }

    /// Copy `source_dir` (minus `exclude`, relative paths) into the snapshot
    /// for `account_id`, replacing any previous snapshot.
    ///
    /// The source is only read.
    pub fn capture(
        &self,
        account_id: u64,
        source_dir: &Path,
        exclude: &[PathBuf],
        external_identity: Option<Value>,
    ) -> Result<SnapshotMeta> {
        if !source_dir.is_dir() {
            return Err(SwapError::NoLiveCredential {
                reason: format!("{} does not exist", source_dir.display()),
            });
        }

        fsops::ensure_private_dir(&self.root).map_err(|e| SwapError::io_at(&self.root, e))?;
        let entry = self.entry_dir(account_id);
        fsops::recover_swap(&entry).map_err(|e| SwapError::io_at(&entry, e))?;

        let staged = fsops::staging_path(&entry);
        let result = Self::build_entry(&staged, source_dir, exclude, external_identity)
            .and_then(|meta| {
                fsops::swap_into_place(&staged, &entry).map_err(|e| SwapError::io_at(&entry, e))?;
                Ok(meta)
            });

        if result.is_err() {
            let _ = fsops::remove_path_if_exists(&staged);
        }
        let meta = result?;

        tracing::info!(
            account_id,
            files = meta.files,
            bytes = meta.bytes,
            "Captured snapshot"
        );
        Ok(meta)
    }

    fn build_entry(
        staged: &Path,
        source_dir: &Path,
        exclude: &[PathBuf],
        external_identity: Option<Value>,
    ) -> Result<SnapshotMeta> {
        fsops::remove_path_if_exists(staged).map_err(|e| SwapError::io_at(staged, e))?;
        fsops::ensure_private_dir(staged).map_err(|e| SwapError::io_at(staged, e))?;

        let tree = staged.join(TREE_DIR);
        let stats =
            fsops::copy_tree(source_dir, &tree, exclude).map_err(|e| SwapError::io_at(source_dir, e))?;
        let digest = fsops::tree_digest(&tree).map_err(|e| SwapError::io_at(&tree, e))?;

        let meta = SnapshotMeta {
            captured_at: Utc::now(),
            files: stats.files,
            bytes: stats.bytes,
            digest,
            external_identity,
        };
        let meta_path = staged.join(META_FILE);
        fsops::write_atomic(
            &meta_path,
            &serde_json::to_vec_pretty(&meta)?,
            Some(PRIVATE_FILE_MODE),
        )
        .map_err(|e| SwapError::io_at(&meta_path, e))?;
        Ok(meta)
    }

    /// Read snapshot metadata.
    pub fn meta(&self, account_id: u64) -> Result<SnapshotMeta> {
        let entry = self.entry_dir(account_id);
        if !entry.is_dir() {
            return Err(SwapError::SnapshotNotFound { account_id });
        }
        let path = entry.join(META_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SwapError::corrupt(&path, "snapshot metadata missing"));
            }
            Err(e) => return Err(SwapError::io_at(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| SwapError::corrupt(&path, e.to_string()))
    }

    /// Stage a verified copy of the snapshot next to `dest` without touching
    /// `dest`. Call [`StagedRestore::commit`] to swap it in.
    pub fn stage_restore(&self, account_id: u64, dest: &Path) -> Result<StagedRestore> {
        let meta = self.meta(account_id)?;
        let tree = self.entry_dir(account_id).join(TREE_DIR);
        if !tree.is_dir() {
            return Err(SwapError::corrupt(&tree, "snapshot tree missing"));
        }

        let actual = fsops::tree_digest(&tree).map_err(|e| SwapError::io_at(&tree, e))?;
        if actual != meta.digest {
            return Err(SwapError::corrupt(
                &tree,
                format!(
                    "snapshot digest mismatch (expected {}, found {actual})",
                    meta.digest
                ),
            ));
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SwapError::io_at(parent, e))?;
        }
        let staged = fsops::staging_path(dest);
        fsops::remove_path_if_exists(&staged).map_err(|e| SwapError::io_at(&staged, e))?;

        let guard = StagedRestore {
            staged,
            dest: dest.to_path_buf(),
            meta,
            committed: false,
        };
        fsops::copy_tree(&tree, &guard.staged, &[]).map_err(|e| SwapError::io_at(&guard.staged, e))?;
        Ok(guard)
    }

    /// Replace `dest` with the snapshot's tree.
    pub fn restore(&self, account_id: u64, dest: &Path) -> Result<SnapshotMeta> {
        self.stage_restore(account_id, dest)?.commit()
    }

    /// Delete the snapshot; `SnapshotNotFound` if it does not exist.
    pub fn delete(&self, account_id: u64) -> Result<()> {
        let entry = self.entry_dir(account_id);
        fsops::recover_swap(&entry).map_err(|e| SwapError::io_at(&entry, e))?;
        if fsops::remove_path_if_exists(&entry).map_err(|e| SwapError::io_at(&entry, e))? {
            tracing::debug!(account_id, "Deleted snapshot");
            Ok(())
        } else {
            Err(SwapError::SnapshotNotFound { account_id })
        }
    }

    /// Delete treating "already absent" as success.
    pub fn delete_if_exists(&self, account_id: u64) -> Result<bool> {
        match self.delete(account_id) {
            Ok(()) => Ok(true),
            Err(SwapError::SnapshotNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// A restore copied into a staging directory but not yet swapped in.
///
/// Dropping it without [`commit`](Self::commit) removes the staging copy and
/// leaves the destination untouched.
#[derive(Debug)]
pub struct StagedRestore {
    staged: PathBuf,
    dest: PathBuf,
    meta: SnapshotMeta,
    committed: bool,
}

impl StagedRestore {
    /// Staging directory; files written here land in `dest` on commit.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.staged
    }

    #[must_use]
    pub const fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    /// Swap the staged tree into the destination.
    pub fn commit(mut self) -> Result<SnapshotMeta> {
        fsops::swap_into_place(&self.staged, &self.dest)
            .map_err(|e| SwapError::io_at(&self.dest, e))?;
        self.committed = true;
        tracing::debug!(dest = %self.dest.display(), "Restored snapshot");
        Ok(self.meta.clone())
    }
}

impl Drop for StagedRestore {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fsops::remove_path_if_exists(&self.staged);
        }
    }
}
