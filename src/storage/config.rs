//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/cswap/config.toml`
//! - macOS: `~/Library/Application Support/com.cswap.cswap/config.toml`
//! - Windows: `%APPDATA%/cswap/cswap/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `CSWAP_CONFIG`: Override config file path
//! - `CSWAP_BACKUP_DIR`: Backup root holding registry, snapshots, file vault
//! - `CSWAP_HOST_DIR`: Host configuration directory (default `~/.claude`)
//! - `CSWAP_HOST_CREDENTIALS_FILE`: Host live credential file
//! - `CSWAP_IDENTITY_FILE`: Host identity file (`oauthAccount` JSON)
//! - `CSWAP_SECRET_BACKEND`: auto, keyring, file
//! - `CSWAP_HOST_SECRET`: auto, keychain, file
//! - `CSWAP_LOCK_TIMEOUT`: Lock wait in seconds
//! - `CSWAP_NO_COLOR` or `NO_COLOR`: Disable colors (1, true, yes)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::{Cli, OutputFormat};
use crate::core::platform::Platform;
use crate::error::{Result, SwapError};
use crate::storage::live_secret::{DEFAULT_KEYCHAIN_SERVICE, SlotChoice, current_user};
use crate::storage::secrets::{BackendChoice, DEFAULT_KEYRING_SERVICE, SecretBackend};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "CSWAP_CONFIG";
/// Environment variable for the backup root.
pub const ENV_BACKUP_DIR: &str = "CSWAP_BACKUP_DIR";
/// Environment variable for the host configuration directory.
pub const ENV_HOST_DIR: &str = "CSWAP_HOST_DIR";
/// Environment variable for the host live credential file.
pub const ENV_HOST_CREDENTIALS_FILE: &str = "CSWAP_HOST_CREDENTIALS_FILE";
/// Environment variable for the host identity file.
pub const ENV_IDENTITY_FILE: &str = "CSWAP_IDENTITY_FILE";
/// Environment variable for the account secret backend.
pub const ENV_SECRET_BACKEND: &str = "CSWAP_SECRET_BACKEND";
/// Environment variable for the host live secret slot.
pub const ENV_HOST_SECRET: &str = "CSWAP_HOST_SECRET";
/// Environment variable for the lock timeout in seconds.
pub const ENV_LOCK_TIMEOUT: &str = "CSWAP_LOCK_TIMEOUT";
/// Environment variable to disable colors.
pub const ENV_NO_COLOR: &str = "CSWAP_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";

const MAX_LOCK_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Where the host keeps its live secret, after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveSlotConfig {
    /// Plain credential file.
    File(PathBuf),
    /// Keychain generic password item.
    Keychain { service: String, account: String },
}

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Output format.
    pub format: OutputFormat,
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
    /// Whether to disable colored output.
    pub no_color: bool,
    /// Whether verbose logging is enabled.
    pub verbose: bool,
    /// Detected platform.
    pub platform: Platform,
    /// Config file that was consulted (may not exist).
    pub config_file: PathBuf,
    /// Backup root.
    pub backup_root: PathBuf,
    /// Host configuration directory.
    pub host_dir: PathBuf,
    /// Identity file candidates, most specific first.
    pub identity_candidates: Vec<PathBuf>,
    /// Account secret backend.
    pub secret_backend: SecretBackend,
    /// Keyring service for account secrets.
    pub keyring_service: String,
    /// Host live secret slot.
    pub live_slot: LiveSlotConfig,
    /// Lock acquisition timeout.
    pub lock_timeout: Duration,
    /// Re-capture the active account before switching away.
    pub recapture_on_switch: bool,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub format: ConfigSource,
    pub no_color: ConfigSource,
    pub backup_root: ConfigSource,
    pub host_dir: ConfigSource,
    pub identity_file: ConfigSource,
    pub secret_backend: ConfigSource,
    pub live_slot: ConfigSource,
    pub lock_timeout: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Environment lookup used during resolution.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - Any resolved value is invalid (e.g., unknown backend)
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Self::resolve_with(cli, &AppPaths::new(), Platform::detect(), &process_env)
    }

    /// Resolution against explicit paths, platform, and environment.
    pub fn resolve_with(
        cli: &Cli,
        paths: &AppPaths,
        platform: Platform,
        env: EnvLookup<'_>,
    ) -> Result<Self> {
        let config_file = env(ENV_CONFIG).map_or_else(|| paths.config_file(), PathBuf::from);
        let config = Config::load_from(&config_file)?;
        config.validate()?;

        let mut sources = ConfigSources::default();
        let expand = |raw: &str| expand_home(raw, &paths.home);

        let format = Self::resolve_format(cli, &mut sources.format);
        let no_color = Self::resolve_no_color(cli, &config, env, &mut sources.no_color);

        let backup_root = Self::resolve_path(
            env(ENV_BACKUP_DIR),
            config.paths.backup_root.as_deref(),
            || paths.default_backup_root(),
            &expand,
            &mut sources.backup_root,
        );
        let host_dir = Self::resolve_path(
            env(ENV_HOST_DIR),
            config.paths.host_config_dir.as_deref(),
            || paths.default_host_dir(),
            &expand,
            &mut sources.host_dir,
        );

        let identity_candidates = if let Some(file) = env(ENV_IDENTITY_FILE) {
            sources.identity_file = ConfigSource::Env;
            vec![expand(&file)]
        } else if let Some(file) = config.paths.identity_file.as_deref() {
            sources.identity_file = ConfigSource::ConfigFile;
            vec![expand(file)]
        } else {
            paths.default_identity_candidates(&host_dir)
        };

        let backend_choice = Self::resolve_choice(
            env(ENV_SECRET_BACKEND),
            &config.secrets.backend,
            ENV_SECRET_BACKEND,
            BackendChoice::from_arg,
            &mut sources.secret_backend,
        )?;
        let secret_backend = SecretBackend::select(backend_choice, platform);

        let slot_choice = Self::resolve_choice(
            env(ENV_HOST_SECRET),
            &config.host.secret,
            ENV_HOST_SECRET,
            SlotChoice::from_arg,
            &mut sources.live_slot,
        )?;
        let credentials_file = env(ENV_HOST_CREDENTIALS_FILE)
            .or_else(|| config.host.credentials_file.clone())
            .map_or_else(|| AppPaths::default_credentials_file(&host_dir), |f| expand(&f));
        let live_slot = if slot_choice.uses_keychain(platform) {
            LiveSlotConfig::Keychain {
                service: config.host.keychain_service.clone(),
                account: current_user(),
            }
        } else {
            LiveSlotConfig::File(credentials_file)
        };

        let lock_timeout = Self::resolve_lock_timeout(env, &config, &mut sources.lock_timeout)?;

        Ok(Self {
            format,
            pretty: cli.pretty,
            no_color,
            verbose: cli.verbose,
            platform,
            config_file,
            backup_root,
            host_dir,
            identity_candidates,
            secret_backend,
            keyring_service: config.secrets.keyring_service.clone(),
            live_slot,
            lock_timeout,
            recapture_on_switch: config.general.recapture_on_switch,
            sources,
        })
    }

    /// Resolve output format setting.
    const fn resolve_format(cli: &Cli, source: &mut ConfigSource) -> OutputFormat {
        if cli.json || !matches!(cli.format, OutputFormat::Human) {
            *source = ConfigSource::Cli;
        }
        cli.effective_format()
    }

    /// Resolve `no_color` setting.
    fn resolve_no_color(
        cli: &Cli,
        config: &Config,
        env: EnvLookup<'_>,
        source: &mut ConfigSource,
    ) -> bool {
        // 1. CLI --no-color flag
        if cli.no_color {
            *source = ConfigSource::Cli;
            return true;
        }

        // 2. Environment variable (CSWAP_NO_COLOR or standard NO_COLOR)
        if env(ENV_NO_COLOR).is_some_and(|v| is_truthy(&v)) || env(ENV_NO_COLOR_STD).is_some() {
            *source = ConfigSource::Env;
            return true;
        }

        // 3. Config file
        if !config.output.color {
            *source = ConfigSource::ConfigFile;
            return true;
        }

        // 4. Default
        *source = ConfigSource::Default;
        false
    }

    fn resolve_path(
        env_value: Option<String>,
        file_value: Option<&str>,
        default: impl FnOnce() -> PathBuf,
        expand: &dyn Fn(&str) -> PathBuf,
        source: &mut ConfigSource,
    ) -> PathBuf {
        if let Some(value) = env_value {
            *source = ConfigSource::Env;
            return expand(&value);
        }
        if let Some(value) = file_value {
            *source = ConfigSource::ConfigFile;
            return expand(value);
        }
        *source = ConfigSource::Default;
        default()
    }

    fn resolve_choice<T: Default>(
        env_value: Option<String>,
        file_value: &str,
        key: &str,
        parse: fn(&str) -> Option<T>,
        source: &mut ConfigSource,
    ) -> Result<T> {
        if let Some(value) = env_value {
            *source = ConfigSource::Env;
            return parse(&value).ok_or_else(|| SwapError::ConfigInvalid {
                key: key.to_string(),
                value: value.clone(),
                message: format!("unrecognized value '{value}'"),
            });
        }
        if file_value.trim().eq_ignore_ascii_case("auto") {
            *source = ConfigSource::Default;
            return Ok(T::default());
        }
        *source = ConfigSource::ConfigFile;
        // validate() has already checked file values.
        Ok(parse(file_value).unwrap_or_default())
    }

    fn resolve_lock_timeout(
        env: EnvLookup<'_>,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Result<Duration> {
        if let Some(value) = env(ENV_LOCK_TIMEOUT) {
            *source = ConfigSource::Env;
            let secs = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| (1..=MAX_LOCK_TIMEOUT_SECS).contains(s))
                .ok_or_else(|| SwapError::ConfigInvalid {
                    key: ENV_LOCK_TIMEOUT.to_string(),
                    value: value.clone(),
                    message: format!("expected seconds between 1 and {MAX_LOCK_TIMEOUT_SECS}"),
                })?;
            return Ok(Duration::from_secs(secs));
        }

        *source = if config.general.lock_timeout_seconds == GeneralConfig::default().lock_timeout_seconds {
            ConfigSource::Default
        } else {
            ConfigSource::ConfigFile
        };
        Ok(Duration::from_secs(config.general.lock_timeout_seconds))
    }
}

/// Check if a value is truthy.
fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Expand a leading `~/` against `home`.
fn expand_home(raw: &str, home: &Path) -> PathBuf {
    let trimmed = raw.trim();
    if trimmed == "~" {
        home.to_path_buf()
    } else if let Some(rest) = trimmed.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(trimmed)
    }
}

// =============================================================================
// Config file
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Path overrides.
    pub paths: PathsConfig,
    /// Account secret storage.
    pub secrets: SecretsConfig,
    /// Host live secret location.
    pub host: HostConfig,
    /// Output settings.
    pub output: OutputConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// How long a mutating command waits for the vault lock.
    pub lock_timeout_seconds: u64,
    /// Re-capture the active account's live state before switching away.
    pub recapture_on_switch: bool,
}

/// Path overrides; unset means platform default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub backup_root: Option<String>,
    pub host_config_dir: Option<String>,
    pub identity_file: Option<String>,
}

/// Account secret storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// auto, keyring, file.
    pub backend: String,
    /// Keyring service name.
    pub keyring_service: String,
}

/// Host live secret settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// auto, keychain, file.
    pub secret: String,
    /// Live credential file (file slot).
    pub credentials_file: Option<String>,
    /// Keychain service of the live item (keychain slot).
    pub keychain_service: String,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Whether to use colors in output.
    pub color: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            lock_timeout_seconds: 10,
            recapture_on_switch: true,
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            secret: "auto".to_string(),
            credentials_file: None,
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path).map_err(|e| SwapError::io_at(path, e))?;
        toml::from_str(&content).map_err(|e| SwapError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - Lock timeout is within 1-300 seconds
    /// - Backend names are recognized
    /// - Service names are non-empty
    pub fn validate(&self) -> Result<()> {
        let timeout = self.general.lock_timeout_seconds;
        if timeout == 0 || timeout > MAX_LOCK_TIMEOUT_SECS {
            return Err(SwapError::ConfigInvalid {
                key: "general.lock_timeout_seconds".to_string(),
                value: timeout.to_string(),
                message: format!("must be between 1 and {MAX_LOCK_TIMEOUT_SECS} seconds"),
            });
        }

        if BackendChoice::from_arg(&self.secrets.backend).is_none() {
            return Err(SwapError::ConfigInvalid {
                key: "secrets.backend".to_string(),
                value: self.secrets.backend.clone(),
                message: "valid backends: auto, keyring, file".to_string(),
            });
        }

        if SlotChoice::from_arg(&self.host.secret).is_none() {
            return Err(SwapError::ConfigInvalid {
                key: "host.secret".to_string(),
                value: self.host.secret.clone(),
                message: "valid values: auto, keychain, file".to_string(),
            });
        }

        for (key, value) in [
            ("secrets.keyring_service", &self.secrets.keyring_service),
            ("host.keychain_service", &self.host.keychain_service),
        ] {
            if value.trim().is_empty() {
                return Err(SwapError::ConfigInvalid {
                    key: key.to_string(),
                    value: value.clone(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
