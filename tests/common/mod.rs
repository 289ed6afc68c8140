//! Shared helpers for integration tests.
//!
//! - `logger`: structured per-test logging
//! - `log_capture`: assertions over emitted `tracing` events

pub mod log_capture;
pub mod logger;
