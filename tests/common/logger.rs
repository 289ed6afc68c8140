#![allow(dead_code)]
//! Structured per-test logging.
//!
//! Lines go to stderr (shown by `cargo test -- --nocapture`) and, when
//! `TEST_LOG_FILE` is set, are appended to that file.
//!
//! # Environment Variables
//!
//! - `TEST_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! - `TEST_LOG_FILE` - also append lines to this file
//! - `TEST_LOG_JSON` - "1" or "true" for one JSON object per line

use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use super::log_capture::TestLogCapture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

struct Settings {
    min_level: LogLevel,
    json: bool,
    file: Option<String>,
}

fn settings() -> &'static Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS.get_or_init(|| Settings {
        min_level: std::env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
            .unwrap_or(LogLevel::Info),
        json: std::env::var("TEST_LOG_JSON").is_ok_and(|v| v == "1" || v == "true"),
        file: std::env::var("TEST_LOG_FILE").ok(),
    })
}

#[derive(Serialize)]
struct Entry<'a> {
    timestamp: String,
    level: LogLevel,
    test: &'a str,
    phase: &'a str,
    message: &'a str,
    elapsed_ms: u128,
}

/// Per-test logger with phase and duration tracking.
pub struct TestLogger {
    test_name: String,
    phase: std::cell::RefCell<String>,
    started: Instant,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Self {
        let logger = Self {
            test_name: test_name.to_string(),
            phase: std::cell::RefCell::new("setup".to_string()),
            started: Instant::now(),
        };
        logger.emit(LogLevel::Debug, "start");
        logger
    }

    /// Logger plus a capture of the crate's own tracing events.
    pub fn with_capture(test_name: &str) -> (Self, TestLogCapture) {
        (Self::new(test_name), TestLogCapture::start())
    }

    pub fn phase(&self, phase: &str) {
        *self.phase.borrow_mut() = phase.to_string();
        self.emit(LogLevel::Debug, &format!("phase {phase}"));
    }

    pub fn debug(&self, message: &str) {
        self.emit(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.emit(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(LogLevel::Warn, message);
    }

    /// Log a CLI invocation.
    pub fn command(&self, args: &[&str]) {
        self.emit(LogLevel::Info, &format!("$ cswap {}", args.join(" ")));
    }

    pub fn finish_ok(&self) {
        self.emit(LogLevel::Info, "PASS");
    }

    fn emit(&self, level: LogLevel, message: &str) {
        let settings = settings();
        if level < settings.min_level {
            return;
        }
        let phase = self.phase.borrow();
        let elapsed_ms = self.started.elapsed().as_millis();
        let line = if settings.json {
            serde_json::to_string(&Entry {
                timestamp: Utc::now().to_rfc3339(),
                level,
                test: &self.test_name,
                phase: &phase,
                message,
                elapsed_ms,
            })
            .unwrap_or_default()
        } else {
            format!(
                "[{level:<5}] {} [{phase}] +{elapsed_ms}ms {message}",
                self.test_name
            )
        };

        eprintln!("{line}");
        if let Some(path) = &settings.file
            && let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path)
        {
            let _ = writeln!(file, "{line}");
        }
    }
}
