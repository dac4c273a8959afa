use crate::{client::ClientConfig, server_config::ServerConfig};
use ipnet::IpNet;
use std::fmt;

/// Written in place of the private key when the client stored none.
pub const PRIVATE_KEY_PLACEHOLDER: &str = "<client private key>";

/// wg-quick tunnel profile for one client of a gateway.
pub struct Profile<'a> {
    client: &'a ClientConfig,
    server: &'a ServerConfig,
}

impl<'a> Profile<'a> {
    pub fn new(client: &'a ClientConfig, server: &'a ServerConfig) -> Self {
        Self { client, server }
    }
}

impl fmt::Display for Profile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let client = self.client;
        let server = self.server;

        if !client.name.is_empty() {
            writeln!(f, "# {}", client.name)?;
        }
        writeln!(f, "[Interface]")?;
        writeln!(f, "Address = {}", client.host_route())?;
        writeln!(
            f,
            "PrivateKey = {}",
            client
                .private_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .unwrap_or(PRIVATE_KEY_PLACEHOLDER)
        )?;
        if let Some(dns) = client.dns {
            writeln!(f, "DNS = {dns}")?;
        }
        writeln!(f, "MTU = {}", client.mtu)?;

        writeln!(f)?;
        writeln!(f, "[Peer]")?;
        writeln!(f, "PublicKey = {}", server.public_key().to_base64())?;
        writeln!(
            f,
            "AllowedIPs = {}",
            server
                .allowed_ips
                .iter()
                .map(IpNet::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )?;
        writeln!(f, "Endpoint = {}", server.endpoint)?;
        if client.keepalive > 0 {
            writeln!(f, "PersistentKeepalive = {}", client.keepalive)?;
        }
        if !client.preshared_key.is_zero() {
            writeln!(f, "PresharedKey = {}", client.preshared_key.to_base64())?;
        }
        Ok(())
    }
}

pub fn render_profile(client: &ClientConfig, server: &ServerConfig) -> String {
    Profile::new(client, server).to_string()
}
