//! Diagnostic logging via `tracing`.
//!
//! Two sinks. The console sink writes to stderr so command output on stdout
//! stays clean; it is quiet (`error`) unless `--verbose`, `--log-level`,
//! `CSWAP_LOG` or `RUST_LOG` ask for more. The file sink keeps a `debug`
//! trail of every command in daily files under `<backup root>/logs`, or in
//! `CSWAP_LOG_FILE` when that is set.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::util::fsops;

pub const LOG_LEVEL_ENV: &str = "CSWAP_LOG";
pub const LOG_FORMAT_ENV: &str = "CSWAP_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "CSWAP_LOG_FILE";

/// Prefix of the daily files, `cswap.YYYY-MM-DD.log`.
pub const LOG_FILE_PREFIX: &str = "cswap";
/// Daily files kept before the oldest is deleted.
pub const LOG_FILES_KEPT: usize = 3;

/// Console log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "text" => Some(Self::Human),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Console verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    #[default]
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Where the persistent trail goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSink {
    Off,
    /// Append to one file (`CSWAP_LOG_FILE`).
    File(PathBuf),
    /// Daily files in this directory.
    Daily(PathBuf),
}

/// Resolved logging setup for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    /// `RUST_LOG` directives; replace the console level when set.
    pub directives: Option<String>,
    pub file: FileSink,
}

impl LogSettings {
    /// Resolve from CLI flags and the process environment. `log_dir` is
    /// the default home of the daily files; `None` disables them unless
    /// `CSWAP_LOG_FILE` names a file.
    #[must_use]
    pub fn resolve(
        cli_level: Option<&str>,
        json_output: bool,
        verbose: bool,
        log_dir: Option<&Path>,
    ) -> Self {
        Self::resolve_with(cli_level, json_output, verbose, log_dir, |key| {
            std::env::var(key).ok()
        })
    }

    /// [`LogSettings::resolve`] over an arbitrary environment lookup.
    #[must_use]
    pub fn resolve_with(
        cli_level: Option<&str>,
        json_output: bool,
        verbose: bool,
        log_dir: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let level = cli_level
            .and_then(LogLevel::from_arg)
            .or_else(|| env(LOG_LEVEL_ENV).as_deref().and_then(LogLevel::from_arg))
            .unwrap_or(if verbose { LogLevel::Debug } else { LogLevel::Error });
        let format = if json_output {
            LogFormat::Json
        } else {
            env(LOG_FORMAT_ENV)
                .as_deref()
                .and_then(LogFormat::from_arg)
                .unwrap_or_default()
        };
        let file = match env(LOG_FILE_ENV) {
            Some(value) if matches!(value.to_lowercase().as_str(), "off" | "none" | "0") => {
                FileSink::Off
            }
            Some(path) => FileSink::File(PathBuf::from(path)),
            None => log_dir.map_or(FileSink::Off, |dir| FileSink::Daily(dir.to_path_buf())),
        };

        Self {
            level,
            format,
            directives: env("RUST_LOG"),
            file,
        }
    }

    fn console_filter(&self) -> EnvFilter {
        self.directives
            .as_deref()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(format!("cswap={}", self.level.as_filter())))
    }

    /// File sink level: `debug`, or finer when the console asks for it.
    fn file_level(&self) -> LogLevel {
        self.level.max(LogLevel::Debug)
    }
}

/// Install the global subscriber. Keep the returned guard alive until exit;
/// dropping it flushes the file sink. A sink that cannot be opened is
/// skipped, never fatal.
pub fn init(settings: &LogSettings) -> Option<WorkerGuard> {
    let console = match settings.format {
        LogFormat::Human => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .with_filter(settings.console_filter())
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(settings.console_filter())
            .boxed(),
    };
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![console];

    let guard = open_sink(&settings.file).map(|(writer, guard)| {
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(EnvFilter::new(format!(
                    "cswap={}",
                    settings.file_level().as_filter()
                )))
                .boxed(),
        );
        guard
    });

    tracing_subscriber::registry().with(layers).try_init().ok();
    guard
}

fn open_sink(sink: &FileSink) -> Option<(NonBlocking, WorkerGuard)> {
    match sink {
        FileSink::Off => None,
        FileSink::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()?;
            Some(tracing_appender::non_blocking(file))
        }
        FileSink::Daily(dir) => {
            if let Some(root) = dir.parent() {
                fsops::ensure_private_dir(root).ok()?;
            }
            fsops::ensure_private_dir(dir).ok()?;
            let appender = Builder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .max_log_files(LOG_FILES_KEPT)
                .build(dir)
                .ok()?;
            Some(tracing_appender::non_blocking(appender))
        }
    }
}
