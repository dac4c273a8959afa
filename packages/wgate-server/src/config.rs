use crate::{
    client::{validate_keepalive, validate_mtu, ClientUpdate, NewClient},
    error::ServerError,
    server_config::{Endpoint, LinkConfig, ServerConfig},
    ServerResult,
};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    net::{IpAddr, SocketAddr, ToSocketAddrs},
    path::{Path, PathBuf},
};
use wgate_crypto::PrivateKey;
use wgate_lib::{
    constant::{
        DEFAULT_ALLOWED_IPS, DEFAULT_DATA_DIR, DEFAULT_ENDPOINT, DEFAULT_GATEWAY_CIDR,
        DEFAULT_MTU, SNAPSHOT_FILENAME, WIREGUARD_INTERFACE,
    },
    types::Mtu,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LinkSettings {
    pub name: String,
    /// Gateway address and network in CIDR form, e.g. `172.31.255.1/24`.
    pub address: String,
    pub mtu: u16,
    pub nat_link: Option<String>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            name: WIREGUARD_INTERFACE.to_string(),
            address: DEFAULT_GATEWAY_CIDR.to_string(),
            mtu: DEFAULT_MTU,
            nat_link: None,
        }
    }
}

/// Values filled into create and edit requests that leave them unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientDefaults {
    pub dns: Option<IpAddr>,
    pub keepalive: Option<i32>,
}

impl ClientDefaults {
    pub fn apply_new(&self, req: &mut NewClient) {
        req.dns = req.dns.or(self.dns);
        req.keepalive = req.keepalive.or(self.keepalive);
    }

    pub fn apply_update(&self, update: &mut ClientUpdate) {
        update.dns = update.dns.or(self.dns);
        update.keepalive = update.keepalive.or(self.keepalive);
    }
}

/// Startup configuration read from a YAML file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StartupConfig {
    pub data_dir: PathBuf,
    pub link: LinkSettings,
    pub endpoint: String,
    pub zone: String,
    pub allowed_ips: Vec<IpNet>,
    pub max_clients_per_user: usize,
    pub peer_mtu: u16,
    pub client_dns: Option<IpAddr>,
    pub client_keepalive: Option<i32>,
    /// Hex, quoted in YAML so an all-digit key is not read as a number.
    pub private_key: Option<PrivateKey>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            link: LinkSettings::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            zone: String::new(),
            allowed_ips: DEFAULT_ALLOWED_IPS.parse::<IpNet>().into_iter().collect(),
            max_clients_per_user: 0,
            peer_mtu: DEFAULT_MTU,
            client_dns: None,
            client_keepalive: None,
            private_key: None,
        }
    }
}

impl StartupConfig {
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILENAME)
    }

    pub fn client_defaults(&self) -> ClientDefaults {
        ClientDefaults {
            dns: self.client_dns,
            keepalive: self.client_keepalive,
        }
    }

    fn endpoint_addr(&self) -> ServerResult<SocketAddr> {
        if let Ok(addr) = self.endpoint.parse::<SocketAddr>() {
            return Ok(addr);
        }
        self.endpoint
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ServerError::InvalidConfig(format!(
                    "endpoint {} did not resolve",
                    self.endpoint
                ))
            })
    }

    /// Build the gateway parameters these settings describe. No users.
    pub fn into_server_config(&self) -> ServerResult<ServerConfig> {
        let address: IpNet = self.link.address.parse()?;
        let endpoint = self.endpoint_addr()?;

        let link_mtu = Mtu::new(self.link.mtu);
        let peer_mtu = Mtu::new(self.peer_mtu);
        validate_mtu(link_mtu)?;
        validate_mtu(peer_mtu)?;
        if let Some(keepalive) = self.client_keepalive {
            validate_keepalive(keepalive)?;
        }

        let link = LinkConfig {
            name: self.link.name.clone(),
            ip: address.addr(),
            network: address.trunc(),
            mtu: link_mtu,
            nat_link: self.link.nat_link.clone().unwrap_or_default(),
        };

        Ok(ServerConfig::new(
            self.private_key.unwrap_or_default(),
            Endpoint {
                host: endpoint.ip(),
                port: endpoint.port(),
                zone: self.zone.clone(),
            },
            self.allowed_ips.clone(),
            self.max_clients_per_user,
            peer_mtu,
            link,
        ))
    }
}

impl TryFrom<&PathBuf> for StartupConfig {
    type Error = ServerError;
    fn try_from(p: &PathBuf) -> ServerResult<Self> {
        StartupConfig::try_from(p.as_path())
    }
}

impl TryFrom<&Path> for StartupConfig {
    type Error = ServerError;
    fn try_from(p: &Path) -> ServerResult<Self> {
        let file = File::open(p)?;
        let content: serde_yaml::Value = serde_yaml::from_reader(file)?;
        Self::from_value(content)
    }
}

impl TryFrom<&str> for StartupConfig {
    type Error = ServerError;
    fn try_from(s: &str) -> ServerResult<Self> {
        let content: serde_yaml::Value = serde_yaml::from_str(s)?;
        Self::from_value(content)
    }
}

impl StartupConfig {
    fn from_value(content: serde_yaml::Value) -> ServerResult<Self> {
        if content.is_null() {
            return Ok(Self::default());
        }
        let config: StartupConfig = serde_yaml::from_value(content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use std::io::Write;
    use wgate_crypto::Key;

    const FULL: &str = r#"
data_dir: /tmp/wgate
link:
  name: wg7
  address: 10.8.0.1/16
  mtu: 1400
  nat_link: eth0
endpoint: 203.0.113.5:4500
zone: ""
allowed_ips:
  - 10.8.0.0/16
  - 192.168.0.0/24
max_clients_per_user: 3
peer_mtu: 1380
client_dns: 1.1.1.1
client_keepalive: 25
private_key: "0101010101010101010101010101010101010101010101010101010101010101"
"#;

    #[test]
    fn test_full_document() {
        let startup = StartupConfig::try_from(FULL).unwrap();
        assert_eq!(startup.snapshot_path(), PathBuf::from("/tmp/wgate/config.json"));
        assert_eq!(
            startup.client_defaults(),
            ClientDefaults {
                dns: Some("1.1.1.1".parse().unwrap()),
                keepalive: Some(25),
            }
        );

        let config = startup.into_server_config().unwrap();
        assert_eq!(config.link.name, "wg7");
        assert_eq!(config.link.ip, "10.8.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(config.link.network, "10.8.0.0/16".parse::<IpNet>().unwrap());
        assert_eq!(config.link.mtu, Mtu::new(1400));
        assert_eq!(config.link.nat_link, "eth0");
        assert_eq!(config.endpoint.to_string(), "203.0.113.5:4500");
        assert_eq!(config.allowed_ips.len(), 2);
        assert_eq!(config.max_clients_per_user, 3);
        assert_eq!(config.default_peer_mtu, Mtu::new(1380));
        assert_eq!(*config.private_key.as_key(), Key::new([1; 32]));
        assert!(config.users().is_empty());
    }

    #[test]
    fn test_defaults() {
        for doc in ["", "{}", "link: {}"] {
            let startup = StartupConfig::try_from(doc).unwrap();
            assert_eq!(startup, StartupConfig::default());
        }

        let config = StartupConfig::default().into_server_config().unwrap();
        assert_eq!(config.link.name, WIREGUARD_INTERFACE);
        assert_eq!(config.link.ip, "172.31.255.1".parse::<IpAddr>().unwrap());
        assert_eq!(
            config.link.network,
            "172.31.255.0/24".parse::<IpNet>().unwrap()
        );
        assert!(config.link.nat_link.is_empty());
        assert_eq!(config.endpoint.port, 51820);
        assert_eq!(config.allowed_ips, vec!["0.0.0.0/0".parse::<IpNet>().unwrap()]);
        assert_eq!(config.max_clients_per_user, 0);
        assert!(config.private_key.is_zero());
    }

    #[test]
    fn test_data_dir_override() {
        let startup = StartupConfig::default().with_data_dir(Some("/srv/wg".into()));
        assert_eq!(startup.snapshot_path(), PathBuf::from("/srv/wg/config.json"));
        let startup = startup.with_data_dir(None);
        assert_eq!(startup.data_dir, PathBuf::from("/srv/wg"));
    }

    #[test]
    fn test_hostname_endpoint_resolves() {
        let startup = StartupConfig {
            endpoint: "localhost:51820".to_string(),
            ..Default::default()
        };
        let config = startup.into_server_config().unwrap();
        assert_eq!(config.endpoint.port, 51820);
        assert!(config.endpoint.host.is_loopback());
    }

    #[test]
    fn test_invalid_values() {
        let bad_address = StartupConfig {
            link: LinkSettings {
                address: "172.31.255.1".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            bad_address.into_server_config(),
            Err(ServerError::NetParse(_))
        ));

        let bad_mtu = StartupConfig {
            peer_mtu: 9000,
            ..Default::default()
        };
        assert!(matches!(
            bad_mtu.into_server_config(),
            Err(ServerError::Validation(ValidationError::InvalidMtu(9000)))
        ));

        for keepalive in [-1, 65536] {
            let doc = format!("client_keepalive: {keepalive}");
            let startup = StartupConfig::try_from(doc.as_str()).unwrap();
            match startup.into_server_config() {
                Err(ServerError::Validation(ValidationError::InvalidKeepalive(k))) => {
                    assert_eq!(k, keepalive)
                }
                other => panic!("unexpected result {other:?}"),
            }
        }
        let edge = StartupConfig::try_from("client_keepalive: 65535").unwrap();
        assert!(edge.into_server_config().is_ok());

        assert!(matches!(
            StartupConfig::try_from("private_key: nothex"),
            Err(ServerError::Yaml(_))
        ));

        let digits = "1".repeat(64);
        let err = StartupConfig::try_from(format!("private_key: {digits}").as_str())
            .unwrap_err()
            .to_string();
        assert!(err.contains("quoted string"), "{err}");
        let quoted = StartupConfig::try_from(format!("private_key: \"{digits}\"").as_str())
            .unwrap();
        assert!(quoted.private_key.is_some());
    }

    #[test]
    fn test_client_defaults_fill_only_unset() {
        let defaults = ClientDefaults {
            dns: Some("9.9.9.9".parse().unwrap()),
            keepalive: Some(25),
        };

        let mut req = NewClient::default();
        defaults.apply_new(&mut req);
        assert_eq!(req.dns, defaults.dns);
        assert_eq!(req.keepalive, Some(25));

        let mut update = ClientUpdate {
            dns: Some("1.1.1.1".parse().unwrap()),
            keepalive: Some(0),
            ..Default::default()
        };
        defaults.apply_update(&mut update);
        assert_eq!(update.dns, Some("1.1.1.1".parse().unwrap()));
        assert_eq!(update.keepalive, Some(0));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let startup = StartupConfig::try_from(file.path()).unwrap();
        assert_eq!(startup.link.name, "wg7");
        let from_buf = StartupConfig::try_from(&file.path().to_path_buf()).unwrap();
        assert_eq!(startup, from_buf);
    }
}
