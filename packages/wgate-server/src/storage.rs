use crate::server_config::ServerConfig;
use async_trait::async_trait;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use wgate_lib::util::ensure_dir;

pub type StorageResult<T> = core::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Durable home of the [`ServerConfig`] snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `None` when nothing has been persisted yet.
    async fn load(&self) -> StorageResult<Option<ServerConfig>>;

    /// Replace the stored snapshot. Readers never observe a partial write.
    async fn persist(&self, config: &ServerConfig) -> StorageResult<()>;
}

/// Pretty printed JSON file, replaced through `<path>.tmp` and a rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> StorageResult<Option<ServerConfig>> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No snapshot at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let config: ServerConfig = serde_json::from_slice(&content)?;
        tracing::info!(
            "Loaded snapshot from {:?} ({} users)",
            self.path,
            config.users().len()
        );
        Ok(Some(config))
    }

    async fn persist(&self, config: &ServerConfig) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty())
        {
            ensure_dir(parent)?;
        }

        let content = serde_json::to_vec_pretty(config)?;
        let tmp = self.tmp_path();

        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(0o600);

        let mut file = opts.open(&tmp).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        tracing::debug!("Persisted snapshot to {:?}", self.path);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    snapshot: Option<ServerConfig>,
    persisted: usize,
    failure: Option<String>,
}

/// In-memory [`SnapshotStore`] with failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryStoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(config: ServerConfig) -> Self {
        let store = Self::default();
        store.state().snapshot = Some(config);
        store
    }

    fn state(&self) -> MutexGuard<'_, MemoryStoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_with(&self, reason: impl Into<String>) {
        self.state().failure = Some(reason.into());
    }

    pub fn recover(&self) {
        self.state().failure = None;
    }

    pub fn snapshot(&self) -> Option<ServerConfig> {
        self.state().snapshot.clone()
    }

    /// Number of successful writes.
    pub fn persisted(&self) -> usize {
        self.state().persisted
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> StorageResult<Option<ServerConfig>> {
        let state = self.state();
        if let Some(reason) = &state.failure {
            return Err(StorageError::Unavailable(reason.clone()));
        }
        Ok(state.snapshot.clone())
    }

    async fn persist(&self, config: &ServerConfig) -> StorageResult<()> {
        let mut state = self.state();
        if let Some(reason) = &state.failure {
            return Err(StorageError::Unavailable(reason.clone()));
        }
        state.snapshot = Some(config.clone());
        state.persisted += 1;
        Ok(())
    }
}
