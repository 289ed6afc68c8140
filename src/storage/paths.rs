//! Application paths for config, the backup vault, and the host.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::core::lock::LOCK_FILE;
use crate::storage::live_secret::CREDENTIALS_FILE_NAME;
use crate::storage::registry::REGISTRY_FILE;

/// Application paths.
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Home directory the host and vault defaults hang off.
    pub home: PathBuf,
}

impl AppPaths {
    /// Create paths for the cswap application.
    #[must_use]
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        ProjectDirs::from("com", "cswap", "cswap").map_or_else(
            || Self {
                config: home.join(".config/cswap"),
                home: home.clone(),
            },
            |proj_dirs| Self {
                config: proj_dirs.config_dir().to_path_buf(),
                home: home.clone(),
            },
        )
    }

    /// Path to the config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Default backup root.
    #[must_use]
    pub fn default_backup_root(&self) -> PathBuf {
        self.home.join(".claude-swap-backup")
    }

    /// Default host configuration directory.
    #[must_use]
    pub fn default_host_dir(&self) -> PathBuf {
        self.home.join(".claude")
    }

    /// Default identity file candidates for a host dir, most specific first.
    #[must_use]
    pub fn default_identity_candidates(&self, host_dir: &Path) -> Vec<PathBuf> {
        vec![host_dir.join(".claude.json"), self.home.join(".claude.json")]
    }

    /// Default live credentials file for a host dir.
    #[must_use]
    pub fn default_credentials_file(host_dir: &Path) -> PathBuf {
        host_dir.join(CREDENTIALS_FILE_NAME)
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed layout under a backup root.
#[derive(Debug, Clone)]
pub struct BackupLayout {
    pub root: PathBuf,
}

impl BackupLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn registry_file(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    /// File vault directory.
    #[must_use]
    pub fn credentials_dir(&self) -> PathBuf {
        self.root.join("credentials")
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Daily diagnostic logs.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

/// Module-level function for accessing dirs crate.
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_layout_is_fixed_under_root() {
        let layout = BackupLayout::new("/vault");
        assert_eq!(layout.registry_file(), PathBuf::from("/vault/registry.json"));
        assert_eq!(layout.snapshots_dir(), PathBuf::from("/vault/snapshots"));
        assert_eq!(layout.credentials_dir(), PathBuf::from("/vault/credentials"));
        assert_eq!(layout.lock_file(), PathBuf::from("/vault/.lock"));
        assert_eq!(layout.log_dir(), PathBuf::from("/vault/logs"));
    }

    #[test]
    fn host_defaults_hang_off_home() {
        let paths = AppPaths {
            config: PathBuf::from("/cfg"),
            home: PathBuf::from("/home/u"),
        };
        let host = paths.default_host_dir();
        assert_eq!(host, PathBuf::from("/home/u/.claude"));
        assert_eq!(
            paths.default_identity_candidates(&host),
            vec![
                PathBuf::from("/home/u/.claude/.claude.json"),
                PathBuf::from("/home/u/.claude.json"),
            ]
        );
        assert_eq!(
            AppPaths::default_credentials_file(&host),
            PathBuf::from("/home/u/.claude/.credentials.json")
        );
        assert_eq!(
            paths.default_backup_root(),
            PathBuf::from("/home/u/.claude-swap-backup")
        );
    }
}
