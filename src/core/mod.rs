//! Swap engine and the host-facing pieces it coordinates.

pub mod engine;
pub mod host;
pub mod lock;
pub mod logging;
pub mod platform;

pub use engine::{EngineSettings, SwapEngine};
pub use host::{HostLayout, Identity};
pub use lock::VaultLock;
pub use platform::Platform;
