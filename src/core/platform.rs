//! Host platform detection.
//!
//! Detected once at startup; everything platform-specific (vault backend,
//! live secret slot) is chosen from the result rather than branched on at
//! call time.

use serde::Serialize;

use crate::error::{Result, SwapError};

/// Set to a non-empty value to run as root outside a container anyway.
pub const ALLOW_ROOT_ENV: &str = "CSWAP_ALLOW_ROOT";

/// Supported platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOs,
    Linux,
    Wsl,
    Windows,
    Unknown,
}

impl Platform {
    /// Detect the current platform. WSL is Linux with `WSL_DISTRO_NAME` set.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_parts(
            std::env::consts::OS,
            std::env::var_os("WSL_DISTRO_NAME").is_some(),
        )
    }

    /// Pure mapping used by [`Platform::detect`].
    #[must_use]
    pub fn from_parts(os: &str, wsl_distro_set: bool) -> Self {
        match os {
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            "linux" if wsl_distro_set => Self::Wsl,
            "linux" => Self::Linux,
            _ => Self::Unknown,
        }
    }

    /// Whether the platform has a native secret store cswap uses by default.
    /// Linux and WSL default to the file vault.
    #[must_use]
    pub const fn has_native_secret_store(self) -> bool {
        matches!(self, Self::MacOs | Self::Windows)
    }

    /// Display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
            Self::Wsl => "WSL",
            Self::Windows => "Windows",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Refuse to run as root outside a container. A root-run cswap would write
/// root-owned vault files and restore into root's home instead of the
/// user's.
///
/// # Errors
/// `Config` when the effective user is root, no container is detected and
/// `CSWAP_ALLOW_ROOT` is unset.
pub fn ensure_not_root(platform: Platform) -> Result<()> {
    check_not_root(
        effective_uid_is_root(),
        platform,
        |key| std::env::var(key).ok(),
        |path| std::fs::read_to_string(path).ok(),
    )
}

fn check_not_root(
    is_root: bool,
    platform: Platform,
    env: impl Fn(&str) -> Option<String>,
    read: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if !is_root || env(ALLOW_ROOT_ENV).is_some_and(|v| !v.trim().is_empty()) {
        return Ok(());
    }
    if in_container(platform, env, read) {
        tracing::debug!("Running as root inside a container");
        return Ok(());
    }
    Err(SwapError::Config(
        "refusing to run as root outside a container; run cswap as the user who owns the Claude Code login"
            .to_string(),
    ))
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn effective_uid_is_root() -> bool {
    // SAFETY: geteuid takes no arguments and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
const fn effective_uid_is_root() -> bool {
    false
}

/// Container detection from environment markers, `/.dockerenv`, the init
/// process cgroup, and the root mount. `read` returns a file's contents, or
/// `None` when it is missing or unreadable.
pub fn in_container(
    platform: Platform,
    env: impl Fn(&str) -> Option<String>,
    read: impl Fn(&str) -> Option<String>,
) -> bool {
    if ["container", "CONTAINER"]
        .iter()
        .any(|key| env(key).is_some_and(|v| !v.is_empty()))
    {
        return true;
    }
    if platform == Platform::Windows {
        return false;
    }
    if read("/.dockerenv").is_some() {
        return true;
    }
    if read("/proc/1/cgroup").is_some_and(|cgroup| {
        ["docker", "lxc", "containerd", "kubepods"]
            .iter()
            .any(|marker| cgroup.contains(marker))
    }) {
        return true;
    }
    read("/proc/self/mountinfo").is_some_and(|mounts| mounts.lines().any(is_container_root_mount))
}

/// A mountinfo line for `/` backed by overlayfs or naming docker.
fn is_container_root_mount(line: &str) -> bool {
    let Some((mount, fs)) = line.split_once(" - ") else {
        return false;
    };
    let is_root = mount.split_whitespace().nth(4) == Some("/");
    is_root && (fs.split_whitespace().next() == Some("overlay") || line.contains("docker"))
}
