//! Filesystem primitives with crash-safe semantics.
//!
//! - Atomic file writes using temp file + rename (a reader sees either the
//!   old or the new file, never a partial one)
//! - Recursive tree copy and a stable SHA-256 digest of a tree
//! - Directory replacement by staging a sibling and swapping it in with two
//!   renames, plus recovery of a swap interrupted between those renames

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Owner-only permissions for directories holding vault material.
pub const PRIVATE_DIR_MODE: u32 = 0o700;
/// Owner-only permissions for vault files.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

const OLD_TAG: &str = "cswap-old";
const STAGING_TAG: &str = "cswap-staging";

/// File and byte counts for a copied tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub files: u64,
    pub bytes: u64,
}

/// What [`recover_swap`] found next to a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// No leftovers.
    Clean,
    /// The new tree was already in place; the displaced old tree was removed.
    Completed,
    /// The swap stopped between its two renames; the old tree was put back.
    RolledBack,
}

// =============================================================================
// Atomic files
// =============================================================================

/// Write bytes atomically using temp file + rename.
///
/// The temp file lives in the same directory (required for atomic rename) and
/// is fsynced before the rename. `mode` applies owner permissions on unix.
pub fn write_atomic(path: &Path, content: &[u8], mode: Option<u32>) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ));

    let result = (|| {
        let mut file = open_new_file(&temp_path, mode)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    sync_dir(parent);
    Ok(())
}

fn open_new_file(path: &Path, mode: Option<u32>) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if let Some(mode) = mode {
            options.mode(mode);
        }
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

/// Best-effort fsync of a directory so a completed rename survives power loss.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

/// Create a directory (and parents) and restrict it to the owner.
pub fn ensure_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    set_mode(path, PRIVATE_DIR_MODE)
}

/// Set unix permission bits; no-op elsewhere.
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

/// Remove a file or directory tree. Returns `false` if nothing was there.
pub fn remove_path_if_exists(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// True if anything (file, dir, or dangling symlink) exists at `path`.
#[must_use]
pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

// =============================================================================
// Trees
// =============================================================================

/// Recursively copy `src` into `dst`, which must not exist yet.
///
/// `exclude` holds paths relative to `src` that are skipped (with everything
/// beneath them). Symlinks are recreated as symlinks on unix.
pub fn copy_tree(src: &Path, dst: &Path, exclude: &[PathBuf]) -> io::Result<TreeStats> {
    let mut stats = TreeStats::default();
    fs::create_dir(dst)?;
    copy_tree_inner(src, dst, Path::new(""), exclude, &mut stats)?;
    Ok(stats)
}

fn copy_tree_inner(
    src_root: &Path,
    dst_root: &Path,
    relative: &Path,
    exclude: &[PathBuf],
    stats: &mut TreeStats,
) -> io::Result<()> {
    for entry in sorted_entries(&src_root.join(relative))? {
        let rel = relative.join(entry.file_name());
        if exclude.iter().any(|skip| skip == &rel) {
            continue;
        }

        let from = src_root.join(&rel);
        let to = dst_root.join(&rel);
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else if file_type.is_dir() {
            fs::create_dir(&to)?;
            copy_tree_inner(src_root, dst_root, &rel, exclude, stats)?;
        } else {
            stats.bytes += fs::copy(&from, &to)?;
            stats.files += 1;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    if fs::metadata(from)?.is_dir() {
        tracing::debug!(path = %from.display(), "Skipping directory symlink");
        Ok(())
    } else {
        fs::copy(from, to).map(|_| ())
    }
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);
    Ok(entries)
}

/// Stable SHA-256 digest over relative paths, entry kinds, and file contents.
pub fn tree_digest(root: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    digest_inner(root, Path::new(""), &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn digest_inner(root: &Path, relative: &Path, hasher: &mut Sha256) -> io::Result<()> {
    for entry in sorted_entries(&root.join(relative))? {
        let rel = relative.join(entry.file_name());
        let path = root.join(&rel);
        let file_type = entry.file_type()?;

        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0]);

        if file_type.is_symlink() {
            hasher.update(b"L");
            hasher.update(fs::read_link(&path)?.to_string_lossy().as_bytes());
        } else if file_type.is_dir() {
            hasher.update(b"D");
            digest_inner(root, &rel, hasher)?;
        } else {
            hasher.update(b"F");
            let mut file = File::open(&path)?;
            let mut buf = [0u8; 8192];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
        }
        hasher.update([0]);
    }
    Ok(())
}

// =============================================================================
// Directory swap
// =============================================================================

fn dir_name(dest: &Path) -> String {
    dest.file_name()
        .map_or_else(|| "dir".to_string(), |n| n.to_string_lossy().into_owned())
}

fn sibling(dest: &Path, tag: &str) -> PathBuf {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(".{}.{tag}", dir_name(dest)))
}

/// Fresh staging path next to `dest` (same filesystem, so renames are atomic).
#[must_use]
pub fn staging_path(dest: &Path) -> PathBuf {
    sibling(dest, &format!("{STAGING_TAG}-{}", std::process::id()))
}

/// Where the displaced tree sits while a swap is in flight.
#[must_use]
pub fn displaced_path(dest: &Path) -> PathBuf {
    sibling(dest, OLD_TAG)
}

/// Move a fully staged tree into `dest`, replacing whatever was there.
///
/// Two renames: `dest -> displaced`, then `staged -> dest`. If the second one
/// fails the displaced tree is moved back. A crash between them is repaired
/// by [`recover_swap`].
pub fn swap_into_place(staged: &Path, dest: &Path) -> io::Result<()> {
    let displaced = displaced_path(dest);
    remove_path_if_exists(&displaced)?;

    let had_dest = path_exists(dest);
    if had_dest {
        fs::rename(dest, &displaced)?;
    }

    if let Err(e) = fs::rename(staged, dest) {
        if had_dest {
            let _ = fs::rename(&displaced, dest);
        }
        return Err(e);
    }

    if let Some(parent) = dest.parent() {
        sync_dir(parent);
    }
    remove_path_if_exists(&displaced)?;
    Ok(())
}

/// Repair leftovers of an interrupted [`swap_into_place`] for `dest` and
/// delete abandoned staging directories.
pub fn recover_swap(dest: &Path) -> io::Result<Recovery> {
    let displaced = displaced_path(dest);
    let mut outcome = Recovery::Clean;

    if path_exists(&displaced) {
        if path_exists(dest) {
            remove_path_if_exists(&displaced)?;
            outcome = Recovery::Completed;
        } else {
            fs::rename(&displaced, dest)?;
            outcome = Recovery::RolledBack;
        }
    }

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let staging_prefix = format!(".{}.{STAGING_TAG}-", dir_name(dest));
    match fs::read_dir(parent) {
        Ok(entries) => {
            for entry in entries.flatten() {
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(&staging_prefix)
                {
                    remove_path_if_exists(&entry.path())?;
                }
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn write_atomic_replaces_content_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        write_atomic(&path, b"old", None).unwrap();
        write_atomic(&path, b"new", Some(PRIVATE_FILE_MODE)).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_applies_private_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        write_atomic(&path, b"x", Some(PRIVATE_FILE_MODE)).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn copy_tree_copies_nested_files_and_honours_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write(&src.join("settings.json"), "{}");
        write(&src.join("projects/a/notes.md"), "hello");
        write(&src.join(".credentials.json"), "token");

        let dst = dir.path().join("dst");
        let stats = copy_tree(&src, &dst, &[PathBuf::from(".credentials.json")]).unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, 7);
        assert_eq!(
            fs::read_to_string(dst.join("projects/a/notes.md")).unwrap(),
            "hello"
        );
        assert!(!dst.join(".credentials.json").exists());
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        write(&a.join("x/y.txt"), "1");
        write(&b.join("x/y.txt"), "1");

        assert_eq!(tree_digest(&a).unwrap(), tree_digest(&b).unwrap());

        write(&b.join("x/y.txt"), "2");
        assert_ne!(tree_digest(&a).unwrap(), tree_digest(&b).unwrap());
    }

    #[test]
    fn swap_replaces_rather_than_merges() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("live");
        write(&dest.join("unrelated.txt"), "stale");

        let staged = staging_path(&dest);
        write(&staged.join("settings.json"), "{\"a\":1}");

        swap_into_place(&staged, &dest).unwrap();

        assert!(!dest.join("unrelated.txt").exists());
        assert_eq!(
            fs::read_to_string(dest.join("settings.json")).unwrap(),
            "{\"a\":1}"
        );
        assert!(!path_exists(&staged));
        assert!(!path_exists(&displaced_path(&dest)));
    }

    #[test]
    fn swap_creates_missing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fresh");
        let staged = staging_path(&dest);
        write(&staged.join("f"), "x");

        swap_into_place(&staged, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("f")).unwrap(), "x");
    }

    #[test]
    fn recovery_rolls_back_swap_stopped_between_renames() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("live");
        write(&dest.join("old.txt"), "old");

        // Crash after `dest -> displaced`, before `staged -> dest`.
        let staged = staging_path(&dest);
        write(&staged.join("new.txt"), "new");
        fs::rename(&dest, displaced_path(&dest)).unwrap();

        assert_eq!(recover_swap(&dest).unwrap(), Recovery::RolledBack);
        assert_eq!(fs::read_to_string(dest.join("old.txt")).unwrap(), "old");
        assert!(!dest.join("new.txt").exists());
        assert!(!path_exists(&staged));
    }

    #[test]
    fn recovery_finishes_swap_stopped_before_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("live");
        write(&dest.join("new.txt"), "new");
        write(&displaced_path(&dest).join("old.txt"), "old");

        assert_eq!(recover_swap(&dest).unwrap(), Recovery::Completed);
        assert!(dest.join("new.txt").exists());
        assert!(!path_exists(&displaced_path(&dest)));
    }

    #[test]
    fn recovery_on_clean_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("live");
        write(&dest.join("keep.txt"), "k");

        assert_eq!(recover_swap(&dest).unwrap(), Recovery::Clean);
        assert!(dest.join("keep.txt").exists());
    }

    #[test]
    fn remove_path_if_exists_reports_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        assert!(!remove_path_if_exists(&path).unwrap());

        write(&path.join("inner"), "x");
        assert!(remove_path_if_exists(&path).unwrap());
        assert!(!path.exists());
    }
}
