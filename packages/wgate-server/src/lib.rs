pub(crate) mod client;
pub(crate) mod config;
pub(crate) mod device;
pub(crate) mod error;
pub(crate) mod ip;
pub(crate) mod profile;
pub(crate) mod reconcile;
pub(crate) mod server;
pub(crate) mod server_config;
pub(crate) mod storage;
pub(crate) mod user;
pub(crate) mod wireguard;

pub type ServerResult<T> = core::result::Result<T, error::ServerError>;

pub use client::{ClientConfig, ClientUpdate, NewClient};
pub use config::{ClientDefaults, LinkSettings, StartupConfig};
pub use device::{
    Device, DeviceError, DeviceResult, LinkState, MemoryDevice, Peer, PeerAction, PeerEntry,
};
pub use error::{ServerError, ValidationError};
pub use ip::IpAllocator;
pub use profile::{render_profile, Profile, PRIVATE_KEY_PLACEHOLDER};
pub use reconcile::{diff_peers, reconcile};
pub use server::Server;
pub use server_config::{Endpoint, LinkConfig, ServerConfig};
pub use storage::{JsonFileStore, MemoryStore, SnapshotStore, StorageError, StorageResult};
pub use user::UserConfig;
pub use wireguard::WgCommandDevice;
