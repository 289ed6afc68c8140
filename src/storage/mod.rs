//! On-disk and secret-store state: configuration, paths, the account
//! registry, snapshots, and credential vaults.

pub mod config;
pub mod live_secret;
pub mod paths;
pub mod registry;
pub mod secrets;
pub mod snapshots;

pub use config::{Config, ConfigSource, ConfigSources, LiveSlotConfig, ResolvedConfig};
pub use live_secret::{CredentialsFileSlot, KeychainSlot, LiveSecretSlot};
pub use paths::{AppPaths, BackupLayout};
pub use registry::{Account, Registry};
pub use secrets::{FileSecretStore, KeyringSecretStore, SecretBackend, SecretBlob, SecretStore};
pub use snapshots::{SnapshotMeta, SnapshotStore};
