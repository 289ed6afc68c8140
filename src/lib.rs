//! cswap - account switcher for Claude Code
//!
//! Keeps several Claude Code logins side by side. Each managed account is a
//! snapshot of the host configuration directory plus its OAuth credential,
//! held in the platform secret store; switching restores one of them in
//! place.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod render;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, Result, SwapError};
