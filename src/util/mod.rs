//! Utility functions.

pub mod env;
pub mod fsops;
