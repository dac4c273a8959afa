use crate::{device::Peer, error::ValidationError};
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use wgate_crypto::Key;
use wgate_lib::types::Mtu;

/// WireGuard's persistent keepalive is a 16 bit interval.
const MAX_KEEPALIVE: i32 = u16::MAX as i32;

/// One tunnel peer owned by a user.
///
/// Empty values (unspecified address, zero key, empty string, zero MTU,
/// epoch timestamps) mean "absent" to [`ClientConfig::merge_with`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub ip: IpAddr,
    #[serde(default)]
    pub allowed_ips: Vec<IpNet>,
    pub public_key: Key,
    #[serde(default)]
    pub preshared_key: Key,
    /// Private key material sealed by the client. Stored, never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub notes: String,
    pub mtu: Mtu,
    #[serde(default)]
    pub dns: Option<IpAddr>,
    #[serde(default)]
    pub keepalive: i32,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            allowed_ips: Vec::new(),
            public_key: Key::default(),
            preshared_key: Key::default(),
            private_key: None,
            name: String::new(),
            notes: String::new(),
            mtu: Mtu::default(),
            dns: None,
            keepalive: 0,
            created: DateTime::<Utc>::default(),
            modified: DateTime::<Utc>::default(),
        }
    }
}

/// Parameters for a new client.
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub allowed_ips: Vec<IpNet>,
    pub public_key: Key,
    pub preshared_key: Key,
    pub private_key: Option<String>,
    pub name: String,
    pub mtu: Mtu,
    pub dns: Option<IpAddr>,
    pub keepalive: Option<i32>,
}

/// Replacement values for an existing client's editable fields.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub allowed_ips: Vec<IpNet>,
    pub preshared_key: Key,
    pub name: String,
    pub notes: String,
    pub mtu: Mtu,
    pub dns: Option<IpAddr>,
    pub keepalive: Option<i32>,
}

pub(crate) fn validate_mtu(mtu: Mtu) -> Result<(), ValidationError> {
    if !mtu.is_valid() {
        return Err(ValidationError::InvalidMtu(mtu.get()));
    }
    Ok(())
}

pub(crate) fn validate_keepalive(keepalive: i32) -> Result<(), ValidationError> {
    if !(0..=MAX_KEEPALIVE).contains(&keepalive) {
        return Err(ValidationError::InvalidKeepalive(keepalive));
    }
    Ok(())
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_mtu(self.mtu)?;
        if self.public_key.is_zero() {
            return Err(ValidationError::InvalidPublicKey);
        }
        if self.ip.is_unspecified() {
            return Err(ValidationError::InvalidIp);
        }
        validate_keepalive(self.keepalive)?;
        Ok(())
    }

    /// Apply `update`, falling back to `default_mtu` for an out of range MTU.
    ///
    /// Nothing is changed when the result would not validate.
    pub fn update(
        &mut self,
        update: ClientUpdate,
        default_mtu: Mtu,
    ) -> Result<(), ValidationError> {
        let ClientUpdate {
            allowed_ips,
            preshared_key,
            name,
            notes,
            mtu,
            dns,
            keepalive,
        } = update;

        let mut next = self.clone();
        next.allowed_ips = allowed_ips;
        next.preshared_key = preshared_key;
        next.name = name;
        next.notes = notes;
        next.mtu = if mtu.is_valid() { mtu } else { default_mtu };
        next.dns = dns;
        next.keepalive = keepalive.unwrap_or_default();
        next.modified = Utc::now();
        next.validate()?;

        *self = next;
        Ok(())
    }

    pub fn merge_with(&mut self, other: &ClientConfig) {
        if !other.ip.is_unspecified() {
            self.ip = other.ip;
        }
        if !other.allowed_ips.is_empty() {
            self.allowed_ips = other.allowed_ips.clone();
        }
        if !other.public_key.is_zero() {
            self.public_key = other.public_key;
        }
        if !other.preshared_key.is_zero() {
            self.preshared_key = other.preshared_key;
        }
        if other.private_key.as_deref().is_some_and(|k| !k.is_empty()) {
            self.private_key = other.private_key.clone();
        }
        if !other.name.is_empty() {
            self.name = other.name.clone();
        }
        if !other.notes.is_empty() {
            self.notes = other.notes.clone();
        }
        if !other.mtu.is_unset() {
            self.mtu = other.mtu;
        }
        if other.created != DateTime::<Utc>::default() {
            self.created = other.created;
        }
        if other.modified != DateTime::<Utc>::default() {
            self.modified = other.modified;
        }
        if other.dns.is_some() {
            self.dns = other.dns;
        }
        if other.keepalive != 0 {
            self.keepalive = other.keepalive;
        }
    }

    /// The client's own address as a single-host route.
    pub fn host_route(&self) -> IpNet {
        IpNet::from(self.ip)
    }

    /// Desired device peer: host route first, then the extra ranges.
    pub fn peer(&self) -> Peer {
        let mut allowed_ips = Vec::with_capacity(1 + self.allowed_ips.len());
        allowed_ips.push(self.host_route());
        allowed_ips.extend(self.allowed_ips.iter().copied());

        Peer {
            public_key: self.public_key,
            preshared_key: self.preshared_key,
            allowed_ips,
        }
    }
}
