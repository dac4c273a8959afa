use crate::{
    client::{ClientConfig, ClientUpdate, NewClient},
    config::{ClientDefaults, StartupConfig},
    device::Device,
    profile::render_profile,
    reconcile::reconcile,
    server_config::ServerConfig,
    storage::SnapshotStore,
    ServerResult,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use wgate_crypto::Key;

/// Shared entry point for every client operation.
///
/// Reads take the lock shared. Mutations hold it exclusively until the new
/// state is persisted and programmed on the device, so callers never observe
/// memory, snapshot and device disagreeing. A failed commit restores the
/// previous state before the error is returned.
pub struct Server {
    config: RwLock<ServerConfig>,
    store: Arc<dyn SnapshotStore>,
    device: Arc<dyn Device>,
    defaults: ClientDefaults,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn SnapshotStore>,
        device: Arc<dyn Device>,
        defaults: ClientDefaults,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            store,
            device,
            defaults,
        }
    }

    /// Load the last snapshot and lay the startup settings over it.
    pub async fn bootstrap(
        startup: &StartupConfig,
        store: Arc<dyn SnapshotStore>,
        device: Arc<dyn Device>,
    ) -> ServerResult<Self> {
        let overrides = startup.into_server_config()?;

        let mut config = match store.load().await? {
            Some(mut loaded) => {
                loaded.merge_with(&overrides);
                if loaded.allowed_ips.is_empty() {
                    loaded.allowed_ips = overrides.allowed_ips.clone();
                }
                loaded
            }
            None => overrides,
        };
        config.validate()?;

        if config.ensure_private_key() {
            store.persist(&config).await?;
        }
        tracing::info!("Gateway public key {}", config.public_key().to_base64());

        Ok(Self::new(config, store, device, startup.client_defaults()))
    }

    /// Bring the link up and program every stored client on it.
    pub async fn start(&self) -> ServerResult<()> {
        let config = self.config.read().await;
        let link = &config.link;
        tracing::info!("Starting wireguard interface {} on {}", link.name, link.network);

        self.device.enable_forwarding().await?;
        self.device.ensure_link(&link.name).await?;
        self.device
            .set_address(&link.name, link.ip, link.network.prefix_len())
            .await?;
        self.device.set_mtu(&link.name, link.mtu).await?;
        self.device.set_up(&link.name).await?;
        if !link.nat_link.is_empty() {
            self.device.configure_nat(&link.name, &link.nat_link).await?;
        }

        reconcile(self.device.as_ref(), &config).await?;
        Ok(())
    }

    pub async fn public_key(&self) -> Key {
        self.config.read().await.public_key()
    }

    pub async fn snapshot(&self) -> ServerConfig {
        self.config.read().await.clone()
    }

    pub async fn list_clients(&self, user: &str) -> Vec<ClientConfig> {
        self.config
            .read()
            .await
            .list_clients(user)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_client(&self, user: &str, key: &Key) -> ServerResult<ClientConfig> {
        self.config.read().await.get_client(user, key).cloned()
    }

    pub async fn profile(&self, user: &str, key: &Key) -> ServerResult<String> {
        let config = self.config.read().await;
        let client = config.get_client(user, key)?;
        Ok(render_profile(client, &config))
    }

    pub async fn create_client(&self, user: &str, mut req: NewClient) -> ServerResult<ClientConfig> {
        self.defaults.apply_new(&mut req);
        self.mutate(|config| config.add_client(user, req)).await
    }

    pub async fn edit_client(
        &self,
        user: &str,
        key: &Key,
        mut update: ClientUpdate,
    ) -> ServerResult<ClientConfig> {
        self.defaults.apply_update(&mut update);
        self.mutate(|config| config.update_client(user, key, update))
            .await
    }

    pub async fn delete_client(&self, user: &str, key: &Key) -> ServerResult<ClientConfig> {
        self.mutate(|config| config.remove_client(user, key)).await
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ServerConfig) -> ServerResult<T>,
    ) -> ServerResult<T> {
        let mut config = self.config.write().await;
        let previous = config.clone();

        let out = f(&mut *config)?;

        if let Err(e) = self.commit(&config).await {
            tracing::error!("Failed to commit configuration, rolling back: {e}");
            *config = previous;
            self.restore(&config).await;
            return Err(e);
        }
        Ok(out)
    }

    async fn commit(&self, config: &ServerConfig) -> ServerResult<()> {
        self.store.persist(config).await?;
        reconcile(self.device.as_ref(), config).await?;
        Ok(())
    }

    async fn restore(&self, config: &ServerConfig) {
        if let Err(e) = self.store.persist(config).await {
            tracing::warn!("Failed to restore snapshot: {e}");
        }
        if let Err(e) = reconcile(self.device.as_ref(), config).await {
            tracing::warn!("Failed to restore device peers: {e}");
        }
    }
}
