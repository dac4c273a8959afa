pub(crate) mod add;
pub(crate) mod genkey;
pub(crate) mod list;
pub(crate) mod profile;
pub(crate) mod remove;
pub(crate) mod serve;

use anyhow::Context;
use std::{path::PathBuf, sync::Arc};
use wgate_crypto::{CryptoError, Key};
use wgate_lib::util::init_logging;
use wgate_server::{
    Device, JsonFileStore, MemoryDevice, MemoryStore, Server, SnapshotStore, StartupConfig,
    WgCommandDevice,
};

#[derive(Debug, clap::Args, Clone)]
pub struct CommonArgs {
    /// Startup config file.
    #[clap(short, long, env = "WGATE_CONFIG", help = "Startup config file.")]
    pub config: Option<PathBuf>,

    /// Overrides `data_dir` from the config file.
    #[clap(long, env = "WGATE_DATA_DIR", help = "Directory holding the snapshot.")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, default_value = "info", help = "Log level used when RUST_LOG is unset.")]
    pub log_level: String,
}

impl CommonArgs {
    pub fn init_logging(&self) -> anyhow::Result<()> {
        init_logging(&self.log_level)
    }

    pub fn startup(&self) -> anyhow::Result<StartupConfig> {
        let startup = match &self.config {
            Some(path) => StartupConfig::try_from(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => StartupConfig::default(),
        };
        Ok(startup.with_data_dir(self.data_dir.clone()))
    }
}

/// Hex or base64.
pub(crate) fn parse_key(s: &str) -> Result<Key, CryptoError> {
    Key::from_hex(s).or_else(|_| Key::from_base64(s))
}

/// Server over the on-disk snapshot. `dry_run` keeps the device in memory.
pub(crate) async fn open_server(
    startup: &StartupConfig,
    dry_run: bool,
) -> anyhow::Result<Server> {
    let store = Arc::new(JsonFileStore::new(startup.snapshot_path()));
    let device: Arc<dyn Device> = if dry_run {
        let device = MemoryDevice::new();
        device.ensure_link(&startup.link.name).await?;
        Arc::new(device)
    } else {
        Arc::new(WgCommandDevice::new())
    };
    Ok(Server::bootstrap(startup, store, device).await?)
}

/// Server over a copy of the snapshot. Nothing is written back.
pub(crate) async fn open_readonly(startup: &StartupConfig) -> anyhow::Result<Server> {
    let path = startup.snapshot_path();
    let snapshot = JsonFileStore::new(&path)
        .load()
        .await?
        .with_context(|| format!("No snapshot at {}", path.display()))?;
    let store = Arc::new(MemoryStore::with_snapshot(snapshot));
    Ok(Server::bootstrap(startup, store, Arc::new(MemoryDevice::new())).await?)
}
