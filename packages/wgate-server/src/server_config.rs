use crate::{
    client::{validate_mtu, ClientConfig, ClientUpdate, NewClient},
    device::Peer,
    error::ServerError,
    ip::IpAllocator,
    user::UserConfig,
    ServerResult,
};
use chrono::Utc;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    net::{IpAddr, Ipv4Addr},
};
use wgate_crypto::{Key, PrivateKey};
use wgate_lib::{constant::UNNAMED_CLIENT, types::Mtu};

/// Public UDP endpoint clients connect to. `port` is also the listen port.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: IpAddr,
    pub port: u16,
    #[serde(default)]
    pub zone: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            zone: String::new(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.host {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) if self.zone.is_empty() => write!(f, "[{}]:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}%{}]:{}", ip, self.zone, self.port),
        }
    }
}

/// The gateway's WireGuard link.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub name: String,
    /// The gateway's own address inside `network`.
    pub ip: IpAddr,
    pub network: IpNet,
    pub mtu: Mtu,
    #[serde(default)]
    pub nat_link: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            network: IpNet::default(),
            mtu: Mtu::default(),
            nat_link: String::new(),
        }
    }
}

fn is_empty_network(net: &IpNet) -> bool {
    net.prefix_len() == 0 && net.addr().is_unspecified()
}

impl LinkConfig {
    pub fn merge_with(&mut self, other: &LinkConfig) {
        if !other.name.is_empty() {
            self.name = other.name.clone();
        }
        if !other.ip.is_unspecified() {
            self.ip = other.ip;
        }
        if !is_empty_network(&other.network) {
            self.network = other.network;
        }
        if other.mtu.is_valid() {
            self.mtu = other.mtu;
        }
        if !other.nat_link.is_empty() {
            self.nat_link = other.nat_link.clone();
        }
    }
}

/// Root aggregate: gateway parameters plus every user's clients.
///
/// Client public keys and addresses are unique across all users.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub private_key: PrivateKey,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub allowed_ips: Vec<IpNet>,
    pub link: LinkConfig,
    /// Zero means unlimited.
    #[serde(default)]
    pub max_clients_per_user: usize,
    pub default_peer_mtu: Mtu,
    #[serde(default)]
    users: BTreeMap<String, UserConfig>,
}

impl ServerConfig {
    pub fn new(
        private_key: PrivateKey,
        endpoint: Endpoint,
        allowed_ips: Vec<IpNet>,
        max_clients_per_user: usize,
        default_peer_mtu: Mtu,
        link: LinkConfig,
    ) -> Self {
        Self {
            private_key,
            endpoint,
            allowed_ips,
            link,
            max_clients_per_user,
            default_peer_mtu,
            users: BTreeMap::new(),
        }
    }

    /// Generate a private key if none was loaded or configured.
    ///
    /// Returns true when a key was generated.
    pub fn ensure_private_key(&mut self) -> bool {
        if !self.private_key.is_zero() {
            return false;
        }
        tracing::info!("No gateway private key configured, generating one");
        self.private_key = PrivateKey::generate();
        true
    }

    pub fn public_key(&self) -> Key {
        self.private_key.public_key()
    }

    pub fn users(&self) -> &BTreeMap<String, UserConfig> {
        &self.users
    }

    pub fn user(&self, user: &str) -> Option<&UserConfig> {
        self.users.get(user)
    }

    pub fn get_client(&self, user: &str, key: &Key) -> ServerResult<&ClientConfig> {
        self.users
            .get(user)
            .ok_or(ServerError::ClientNotFound)?
            .get(key)
    }

    fn owner_of(&self, key: &Key) -> Option<&str> {
        self.users
            .iter()
            .find(|(_, u)| u.contains(key))
            .map(|(name, _)| name.as_str())
    }

    pub fn add_client(&mut self, user: &str, req: NewClient) -> ServerResult<ClientConfig> {
        let count = self.count_clients(user);
        if self.max_clients_per_user > 0 && count >= self.max_clients_per_user {
            tracing::error!(
                "User {user:?} has too many clients ({count}/{})",
                self.max_clients_per_user
            );
            return Err(ServerError::TooManyClients {
                user: user.to_string(),
                limit: self.max_clients_per_user,
            });
        }

        let NewClient {
            allowed_ips,
            public_key,
            preshared_key,
            private_key,
            name,
            mtu,
            dns,
            keepalive,
        } = req;

        if public_key.is_zero() {
            return Err(crate::error::ValidationError::InvalidPublicKey.into());
        }
        if let Some(owner) = self.owner_of(&public_key) {
            tracing::warn!(key = %public_key, "Public key already used by {owner:?}");
            return Err(ServerError::KeyInUse(public_key));
        }

        let name = if name.is_empty() {
            tracing::debug!("No client name, using default: {UNNAMED_CLIENT:?}");
            UNNAMED_CLIENT.to_string()
        } else {
            name
        };

        let ip = self.allocate_ip()?;

        let mtu = if mtu.is_valid() {
            mtu
        } else {
            tracing::debug!(
                "Client MTU {mtu} is invalid, using default {}",
                self.default_peer_mtu
            );
            self.default_peer_mtu
        };

        let now = Utc::now();
        let client = ClientConfig {
            ip,
            allowed_ips,
            public_key,
            preshared_key,
            private_key,
            name,
            notes: String::new(),
            mtu,
            dns,
            keepalive: keepalive.unwrap_or_default(),
            created: now,
            modified: now,
        };
        client.validate()?;

        self.users
            .entry(user.to_string())
            .or_default()
            .add(client.clone());
        tracing::info!(user, key = %client.public_key, ip = %client.ip, "Added client");
        Ok(client)
    }

    pub fn update_client(
        &mut self,
        user: &str,
        key: &Key,
        update: ClientUpdate,
    ) -> ServerResult<ClientConfig> {
        let default_mtu = self.default_peer_mtu;
        let client = self
            .users
            .get_mut(user)
            .ok_or(ServerError::ClientNotFound)?
            .get_mut(key)?;
        client.update(update, default_mtu)?;
        Ok(client.clone())
    }

    pub fn remove_client(&mut self, user: &str, key: &Key) -> ServerResult<ClientConfig> {
        let roster = self.users.get_mut(user).ok_or(ServerError::ClientNotFound)?;
        let removed = roster.remove(key)?;
        if roster.is_empty() {
            self.users.remove(user);
        }
        Ok(removed)
    }

    pub fn count_clients(&self, user: &str) -> usize {
        self.users.get(user).map(UserConfig::count).unwrap_or(0)
    }

    pub fn list_clients(&self, user: &str) -> Vec<&ClientConfig> {
        self.users
            .get(user)
            .map(|u| u.list().collect())
            .unwrap_or_default()
    }

    /// Every client of every user.
    pub fn list_all_clients(&self) -> impl Iterator<Item = &ClientConfig> {
        self.users.values().flat_map(UserConfig::list)
    }

    pub fn allocator(&self) -> IpAllocator {
        IpAllocator::new(
            self.link.network,
            self.link.ip,
            self.list_all_clients().map(|c| c.ip),
        )
    }

    fn allocate_ip(&self) -> ServerResult<IpAddr> {
        self.allocator().next()
    }

    pub fn desired_peers(&self) -> Vec<Peer> {
        self.list_all_clients().map(ClientConfig::peer).collect()
    }

    /// Override scalar and link fields with the non-empty values of `other`.
    ///
    /// Users are left alone.
    pub fn merge_with(&mut self, other: &ServerConfig) {
        if !other.private_key.is_zero() {
            self.private_key = other.private_key;
        }
        self.link.merge_with(&other.link);
        if !other.endpoint.host.is_unspecified() {
            self.endpoint.host = other.endpoint.host;
        }
        if other.endpoint.port != 0 {
            self.endpoint.port = other.endpoint.port;
        }
        if !other.endpoint.zone.is_empty() {
            self.endpoint.zone = other.endpoint.zone.clone();
        }
        if other.max_clients_per_user != 0 {
            self.max_clients_per_user = other.max_clients_per_user;
        }
        if !other.default_peer_mtu.is_unset() {
            self.default_peer_mtu = other.default_peer_mtu;
        }
    }

    /// Check the loaded state before serving from it.
    pub fn validate(&self) -> ServerResult<()> {
        if self.link.name.is_empty() {
            return Err(ServerError::InvalidConfig("link name is empty".into()));
        }
        if !self.link.network.contains(&self.link.ip) {
            return Err(ServerError::InvalidConfig(format!(
                "gateway address {} is outside {}",
                self.link.ip, self.link.network
            )));
        }
        validate_mtu(self.link.mtu)?;
        validate_mtu(self.default_peer_mtu)?;

        let mut ips = std::collections::HashSet::new();
        for (user, roster) in self.users.iter() {
            for client in roster.list() {
                client.validate()?;
                if client.ip == self.link.ip || !ips.insert(client.ip) {
                    return Err(ServerError::InvalidConfig(format!(
                        "address {} of client {} ({user}) is not unique",
                        client.ip, client.public_key
                    )));
                }
            }
        }
        let keys: usize = self.users.values().map(UserConfig::count).sum();
        let distinct: std::collections::HashSet<&Key> =
            self.list_all_clients().map(|c| &c.public_key).collect();
        if distinct.len() != keys {
            return Err(ServerError::InvalidConfig(
                "a public key is registered to more than one user".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn link() -> LinkConfig {
        LinkConfig {
            name: "wg0".to_string(),
            ip: "10.0.0.1".parse().unwrap(),
            network: "10.0.0.0/24".parse().unwrap(),
            mtu: Mtu::new(1420),
            nat_link: "eth0".to_string(),
        }
    }

    fn server(max: usize) -> ServerConfig {
        ServerConfig::new(
            PrivateKey::from(Key::new([0xee; 32])),
            Endpoint {
                host: "203.0.113.1".parse().unwrap(),
                port: 51820,
                zone: String::new(),
            },
            vec!["0.0.0.0/0".parse().unwrap()],
            max,
            Mtu::new(1420),
            link(),
        )
    }

    fn req(k: u8) -> NewClient {
        NewClient {
            public_key: Key::new([k; 32]),
            mtu: Mtu::new(1400),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_client_allocates_distinct_addresses() {
        let mut s = server(0);
        let network: IpNet = "10.0.0.0/24".parse().unwrap();
        let mut seen = std::collections::HashSet::new();
        for k in 1..=50u8 {
            let c = s.add_client("alice", req(k)).unwrap();
            assert_ne!(c.ip, s.link.ip);
            assert!(network.contains(&c.ip));
            assert!(seen.insert(c.ip));
        }
        assert_eq!(s.count_clients("alice"), 50);
    }

    #[test]
    fn test_add_client_defaults() {
        let mut s = server(0);
        let c = s
            .add_client(
                "alice",
                NewClient {
                    public_key: Key::new([1; 32]),
                    mtu: Mtu::new(9000),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(c.name, UNNAMED_CLIENT);
        assert_eq!(c.mtu, Mtu::new(1420));
        assert_eq!(c.ip, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(c.created, c.modified);
        assert_eq!(c.keepalive, 0);
    }

    #[test]
    fn test_addresses_unique_across_users() {
        let mut s = server(0);
        let a = s.add_client("alice", req(1)).unwrap();
        let b = s.add_client("bob", req(2)).unwrap();
        assert_ne!(a.ip, b.ip);
        assert_eq!(s.list_all_clients().count(), 2);
        assert_eq!(s.desired_peers().len(), 2);
    }

    #[test]
    fn test_public_key_unique_across_users() {
        let mut s = server(0);
        s.add_client("alice", req(1)).unwrap();
        assert!(matches!(
            s.add_client("bob", req(1)),
            Err(ServerError::KeyInUse(_))
        ));
        assert!(matches!(
            s.add_client("alice", req(1)),
            Err(ServerError::KeyInUse(_))
        ));
        assert_eq!(s.list_all_clients().count(), 1);
    }

    #[test]
    fn test_zero_public_key_rejected() {
        let mut s = server(0);
        let err = s.add_client("alice", req(0)).unwrap_err();
        assert!(matches!(
            err,
            ServerError::Validation(ValidationError::InvalidPublicKey)
        ));
        assert!(s.user("alice").is_none());
    }

    #[test]
    fn test_negative_keepalive_rejected_without_side_effects() {
        let mut s = server(0);
        let mut r = req(1);
        r.keepalive = Some(-1);
        assert!(matches!(
            s.add_client("alice", r),
            Err(ServerError::Validation(ValidationError::InvalidKeepalive(-1)))
        ));
        assert_eq!(s.count_clients("alice"), 0);
    }

    #[test]
    fn test_per_user_limit() {
        let mut s = server(2);
        s.add_client("alice", req(1)).unwrap();
        s.add_client("alice", req(2)).unwrap();
        assert!(matches!(
            s.add_client("alice", req(3)),
            Err(ServerError::TooManyClients { limit: 2, .. })
        ));
        // other users have their own quota
        s.add_client("bob", req(4)).unwrap();
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let mut s = server(0);
        for k in 1..=20u8 {
            s.add_client("alice", req(k)).unwrap();
        }
    }

    #[test]
    fn test_range_exhausted() {
        let mut s = server(0);
        s.link.network = "10.0.0.0/30".parse().unwrap();
        s.add_client("alice", req(1)).unwrap();
        s.add_client("alice", req(2)).unwrap();
        assert!(matches!(
            s.add_client("alice", req(3)),
            Err(ServerError::RangeExhausted)
        ));
    }

    #[test]
    fn test_removed_address_is_reused() {
        let mut s = server(0);
        let a = s.add_client("alice", req(1)).unwrap();
        s.add_client("alice", req(2)).unwrap();
        s.remove_client("alice", &a.public_key).unwrap();
        let c = s.add_client("alice", req(3)).unwrap();
        assert_eq!(c.ip, a.ip);
    }

    #[test]
    fn test_get_and_remove_not_found() {
        let mut s = server(0);
        assert!(matches!(
            s.get_client("nobody", &Key::new([1; 32])),
            Err(ServerError::ClientNotFound)
        ));
        s.add_client("alice", req(1)).unwrap();
        assert!(matches!(
            s.get_client("alice", &Key::new([2; 32])),
            Err(ServerError::ClientNotFound)
        ));
        // a client is only visible to its owner
        assert!(matches!(
            s.get_client("bob", &Key::new([1; 32])),
            Err(ServerError::ClientNotFound)
        ));
        assert!(matches!(
            s.remove_client("bob", &Key::new([1; 32])),
            Err(ServerError::ClientNotFound)
        ));
        s.remove_client("alice", &Key::new([1; 32])).unwrap();
        assert!(s.user("alice").is_none());
    }

    #[test]
    fn test_update_client() {
        let mut s = server(0);
        let c = s.add_client("alice", req(1)).unwrap();
        let updated = s
            .update_client(
                "alice",
                &c.public_key,
                ClientUpdate {
                    name: "renamed".to_string(),
                    notes: "n".to_string(),
                    mtu: Mtu::new(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.mtu, Mtu::new(1420));
        assert_eq!(updated.ip, c.ip);
        assert_eq!(s.get_client("alice", &c.public_key).unwrap(), &updated);
    }

    #[test]
    fn test_merge_with_empty_changes_nothing() {
        let mut s = server(3);
        let before = s.clone();
        s.merge_with(&ServerConfig::default());
        assert_eq!(s, before);
    }

    #[test]
    fn test_merge_with_each_field() {
        let mut s = server(3);
        s.add_client("alice", req(1)).unwrap();

        let mut other = ServerConfig::default();
        other.private_key = PrivateKey::from(Key::new([0x11; 32]));
        let mut merged = s.clone();
        merged.merge_with(&other);
        assert_eq!(merged.private_key, other.private_key);
        assert_eq!(merged.endpoint, s.endpoint);

        let mut other = ServerConfig::default();
        other.endpoint.host = "198.51.100.7".parse().unwrap();
        let mut merged = s.clone();
        merged.merge_with(&other);
        assert_eq!(merged.endpoint.host, other.endpoint.host);
        assert_eq!(merged.endpoint.port, 51820);

        let mut other = ServerConfig::default();
        other.endpoint.port = 4500;
        let mut merged = s.clone();
        merged.merge_with(&other);
        assert_eq!(merged.endpoint.port, 4500);
        assert_eq!(merged.endpoint.host, s.endpoint.host);

        let mut other = ServerConfig::default();
        other.endpoint.zone = "eth1".to_string();
        let mut merged = s.clone();
        merged.merge_with(&other);
        assert_eq!(merged.endpoint.zone, "eth1");

        let mut other = ServerConfig::default();
        other.max_clients_per_user = 7;
        let mut merged = s.clone();
        merged.merge_with(&other);
        assert_eq!(merged.max_clients_per_user, 7);

        let mut other = ServerConfig::default();
        other.default_peer_mtu = Mtu::new(1300);
        let mut merged = s.clone();
        merged.merge_with(&other);
        assert_eq!(merged.default_peer_mtu, Mtu::new(1300));

        // users and server allowed IPs are never merged
        let mut other = ServerConfig::default();
        other.allowed_ips = vec!["10.1.0.0/16".parse().unwrap()];
        other.add_client("bob", req(2)).unwrap();
        let mut merged = s.clone();
        merged.merge_with(&other);
        assert_eq!(merged.allowed_ips, s.allowed_ips);
        assert_eq!(merged.users(), s.users());
    }

    #[test]
    fn test_link_merge_each_field() {
        let base = link();

        let mut l = base.clone();
        l.merge_with(&LinkConfig::default());
        assert_eq!(l, base);

        let mut l = base.clone();
        l.merge_with(&LinkConfig {
            name: "wg9".to_string(),
            ..Default::default()
        });
        assert_eq!(l.name, "wg9");
        assert_eq!(l.ip, base.ip);

        let mut l = base.clone();
        l.merge_with(&LinkConfig {
            ip: "10.9.0.1".parse().unwrap(),
            ..Default::default()
        });
        assert_eq!(l.ip, "10.9.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(l.network, base.network);

        let mut l = base.clone();
        l.merge_with(&LinkConfig {
            network: "10.9.0.0/16".parse().unwrap(),
            ..Default::default()
        });
        assert_eq!(l.network, "10.9.0.0/16".parse::<IpNet>().unwrap());

        let mut l = base.clone();
        l.merge_with(&LinkConfig {
            mtu: Mtu::new(1280),
            ..Default::default()
        });
        assert_eq!(l.mtu, Mtu::new(1280));

        // an out of range MTU is not taken
        let mut l = base.clone();
        l.merge_with(&LinkConfig {
            mtu: Mtu::new(9000),
            ..Default::default()
        });
        assert_eq!(l.mtu, base.mtu);

        let mut l = base.clone();
        l.merge_with(&LinkConfig {
            nat_link: "ens3".to_string(),
            ..Default::default()
        });
        assert_eq!(l.nat_link, "ens3");
    }

    #[test]
    fn test_endpoint_display() {
        let v4 = Endpoint {
            host: "203.0.113.1".parse().unwrap(),
            port: 51820,
            zone: String::new(),
        };
        assert_eq!(v4.to_string(), "203.0.113.1:51820");
        let v6 = Endpoint {
            host: "fe80::1".parse().unwrap(),
            port: 51820,
            zone: "eth0".to_string(),
        };
        assert_eq!(v6.to_string(), "[fe80::1%eth0]:51820");
    }

    #[test]
    fn test_validate_snapshot() {
        let mut s = server(0);
        s.add_client("alice", req(1)).unwrap();
        s.add_client("bob", req(2)).unwrap();
        s.validate().unwrap();

        let mut bad = s.clone();
        bad.link.ip = "192.168.0.1".parse().unwrap();
        assert!(matches!(bad.validate(), Err(ServerError::InvalidConfig(_))));

        let mut dup = s.clone();
        let mut copy = dup.get_client("alice", &Key::new([1; 32])).unwrap().clone();
        copy.public_key = Key::new([3; 32]);
        dup.users.get_mut("bob").unwrap().add(copy);
        assert!(matches!(dup.validate(), Err(ServerError::InvalidConfig(_))));
    }
}
