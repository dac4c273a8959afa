//! Network device driver seam.
//!
//! [`Device`] is everything the engine needs from the kernel side: link
//! bring-up, NAT, and incremental peer programming. [`crate::WgCommandDevice`]
//! drives the real `ip`/`wg`/`nft` tools; [`MemoryDevice`] keeps the same
//! state in memory for tests and dry runs.

use async_trait::async_trait;
use ipnet::IpNet;
use std::{
    collections::{BTreeMap, HashMap},
    net::IpAddr,
    sync::{Mutex, MutexGuard},
};
use strum::{AsRefStr, Display};
use thiserror::Error;
use wgate_crypto::{Key, PrivateKey};
use wgate_lib::types::Mtu;

pub type DeviceResult<T> = core::result::Result<T, DeviceError>;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed device output: {0}")]
    Malformed(String),

    #[error("Link {0} does not exist")]
    NoSuchLink(String),

    #[error("Device unavailable: {0}")]
    Unavailable(String),
}

/// A peer as programmed on (or desired for) the device.
///
/// A zero `preshared_key` means no preshared key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Peer {
    pub public_key: Key,
    pub preshared_key: Key,
    pub allowed_ips: Vec<IpNet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PeerAction {
    Add,
    Update,
    Remove,
}

/// One line of an incremental peer update.
///
/// `Add` and `Update` replace the peer's allowed IPs and preshared key with
/// the ones carried here; `Remove` only uses the public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub action: PeerAction,
    pub peer: Peer,
}

impl PeerEntry {
    pub fn add(peer: Peer) -> Self {
        Self {
            action: PeerAction::Add,
            peer,
        }
    }

    pub fn update(peer: Peer) -> Self {
        Self {
            action: PeerAction::Update,
            peer,
        }
    }

    pub fn remove(public_key: Key) -> Self {
        Self {
            action: PeerAction::Remove,
            peer: Peer {
                public_key,
                ..Default::default()
            },
        }
    }

    pub fn public_key(&self) -> &Key {
        &self.peer.public_key
    }
}

#[async_trait]
pub trait Device: Send + Sync {
    async fn enable_forwarding(&self) -> DeviceResult<()>;

    /// Create the WireGuard link, reusing it when it already exists.
    async fn ensure_link(&self, name: &str) -> DeviceResult<()>;

    async fn set_address(&self, name: &str, ip: IpAddr, prefix_len: u8) -> DeviceResult<()>;

    async fn set_mtu(&self, name: &str, mtu: Mtu) -> DeviceResult<()>;

    async fn set_up(&self, name: &str) -> DeviceResult<()>;

    /// Masquerade traffic leaving through `out_link`.
    async fn configure_nat(&self, name: &str, out_link: &str) -> DeviceResult<()>;

    async fn current_peers(&self, name: &str) -> DeviceResult<Vec<Peer>>;

    /// Apply `entries` without touching peers they do not mention.
    async fn apply_peer_diff(
        &self,
        name: &str,
        private_key: &PrivateKey,
        listen_port: u16,
        entries: &[PeerEntry],
    ) -> DeviceResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkState {
    pub address: Option<(IpAddr, u8)>,
    pub mtu: Mtu,
    pub up: bool,
    pub nat: Option<String>,
    pub private_key: Option<PrivateKey>,
    pub listen_port: u16,
    pub peers: BTreeMap<Key, Peer>,
}

#[derive(Debug, Default)]
struct MemoryState {
    forwarding: bool,
    links: HashMap<String, LinkState>,
    applied: Vec<Vec<PeerEntry>>,
    failure: Option<String>,
}

/// In-memory [`Device`].
///
/// Every applied diff is recorded, and [`MemoryDevice::fail_with`] makes
/// all subsequent calls fail until [`MemoryDevice::recover`].
#[derive(Debug, Default)]
pub struct MemoryDevice {
    state: Mutex<MemoryState>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(state: &MemoryState) -> DeviceResult<()> {
        match &state.failure {
            Some(reason) => Err(DeviceError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn with_link<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut LinkState) -> T,
    ) -> DeviceResult<T> {
        let mut state = self.state();
        Self::check(&state)?;
        let link = state
            .links
            .get_mut(name)
            .ok_or_else(|| DeviceError::NoSuchLink(name.to_string()))?;
        Ok(f(link))
    }

    pub fn fail_with(&self, reason: impl Into<String>) {
        self.state().failure = Some(reason.into());
    }

    pub fn recover(&self) {
        self.state().failure = None;
    }

    pub fn forwarding(&self) -> bool {
        self.state().forwarding
    }

    pub fn link(&self, name: &str) -> Option<LinkState> {
        self.state().links.get(name).cloned()
    }

    /// Place a peer on the link directly, as if configured out of band.
    pub fn insert_peer(&self, name: &str, peer: Peer) {
        self.state()
            .links
            .entry(name.to_string())
            .or_default()
            .peers
            .insert(peer.public_key, peer);
    }

    pub fn peers(&self, name: &str) -> Vec<Peer> {
        self.state()
            .links
            .get(name)
            .map(|l| l.peers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn applied(&self) -> Vec<Vec<PeerEntry>> {
        self.state().applied.clone()
    }
}

#[async_trait]
impl Device for MemoryDevice {
    async fn enable_forwarding(&self) -> DeviceResult<()> {
        let mut state = self.state();
        Self::check(&state)?;
        state.forwarding = true;
        Ok(())
    }

    async fn ensure_link(&self, name: &str) -> DeviceResult<()> {
        let mut state = self.state();
        Self::check(&state)?;
        state.links.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn set_address(&self, name: &str, ip: IpAddr, prefix_len: u8) -> DeviceResult<()> {
        self.with_link(name, |l| l.address = Some((ip, prefix_len)))
    }

    async fn set_mtu(&self, name: &str, mtu: Mtu) -> DeviceResult<()> {
        self.with_link(name, |l| l.mtu = mtu)
    }

    async fn set_up(&self, name: &str) -> DeviceResult<()> {
        self.with_link(name, |l| l.up = true)
    }

    async fn configure_nat(&self, name: &str, out_link: &str) -> DeviceResult<()> {
        self.with_link(name, |l| l.nat = Some(out_link.to_string()))
    }

    async fn current_peers(&self, name: &str) -> DeviceResult<Vec<Peer>> {
        self.with_link(name, |l| l.peers.values().cloned().collect())
    }

    async fn apply_peer_diff(
        &self,
        name: &str,
        private_key: &PrivateKey,
        listen_port: u16,
        entries: &[PeerEntry],
    ) -> DeviceResult<()> {
        self.with_link(name, |l| {
            l.private_key = Some(*private_key);
            l.listen_port = listen_port;
            for entry in entries {
                match entry.action {
                    PeerAction::Add | PeerAction::Update => {
                        l.peers.insert(entry.peer.public_key, entry.peer.clone());
                    }
                    PeerAction::Remove => {
                        l.peers.remove(&entry.peer.public_key);
                    }
                }
            }
        })?;
        self.state().applied.push(entries.to_vec());
        Ok(())
    }
}
