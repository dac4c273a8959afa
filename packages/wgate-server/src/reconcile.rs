use crate::{
    device::{Device, DeviceResult, Peer, PeerEntry},
    server_config::ServerConfig,
};
use std::collections::{HashMap, HashSet};
use wgate_crypto::Key;

/// Minimal change list turning `current` into `desired`, matched by public key.
///
/// Every current peer yields either an update carrying the desired fields or
/// a removal; desired peers not on the device are appended as additions.
pub fn diff_peers(desired: &[Peer], current: &[Peer]) -> Vec<PeerEntry> {
    let wanted: HashMap<&Key, &Peer> =
        desired.iter().map(|p| (&p.public_key, p)).collect();
    let mut matched: HashSet<&Key> = HashSet::with_capacity(current.len());
    let mut entries = Vec::with_capacity(desired.len() + current.len());

    for peer in current {
        match wanted.get(&peer.public_key) {
            Some(want) => {
                matched.insert(&peer.public_key);
                entries.push(PeerEntry::update((*want).clone()));
            }
            None => entries.push(PeerEntry::remove(peer.public_key)),
        }
    }

    entries.extend(
        desired
            .iter()
            .filter(|p| !matched.contains(&p.public_key))
            .map(|p| PeerEntry::add(p.clone())),
    );

    entries
}

/// Bring the live link's peers in line with `config`.
pub async fn reconcile(
    device: &dyn Device,
    config: &ServerConfig,
) -> DeviceResult<Vec<PeerEntry>> {
    let link = &config.link.name;
    tracing::debug!("Reconfiguring wireguard interface {link}");

    let current = device.current_peers(link).await?;
    let desired = config.desired_peers();
    let entries = diff_peers(&desired, &current);

    for entry in &entries {
        tracing::debug!(
            key = %entry.public_key(),
            allowed_ips = ?entry.peer.allowed_ips,
            "{} wireguard peer",
            entry.action
        );
    }

    device
        .apply_peer_diff(
            link,
            &config.private_key,
            config.endpoint.port,
            &entries,
        )
        .await?;

    tracing::info!(
        "Reconciled {link}: {} desired, {} on device, {} changes",
        desired.len(),
        current.len(),
        entries.len()
    );
    Ok(entries)
}
