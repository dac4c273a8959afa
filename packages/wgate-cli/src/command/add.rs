use crate::command::{open_server, parse_key, CommonArgs};
use clap::Parser;
use ipnet::IpNet;
use std::net::IpAddr;
use wgate_crypto::Key;
use wgate_lib::types::Mtu;
use wgate_server::NewClient;

#[derive(Debug, Parser, Clone)]
#[clap(name = "wgate add", about = "Register a client for a user", version)]
pub struct Args {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[clap(short, long, help = "User owning the client.")]
    pub user: String,

    #[clap(long, value_parser = parse_key, help = "Client public key, hex or base64.")]
    pub public_key: Key,

    #[clap(long, value_parser = parse_key, help = "Preshared key, hex or base64.")]
    pub preshared_key: Option<Key>,

    /// Opaque, client-sealed private key material to store with the client.
    #[clap(long, help = "Sealed private key material.")]
    pub private_key: Option<String>,

    #[clap(short, long, default_value = "", help = "Client name.")]
    pub name: String,

    /// Out of range values fall back to the gateway default.
    #[clap(long, default_value_t = 0, help = "Client MTU.")]
    pub mtu: u16,

    #[clap(long, help = "DNS server for the client.")]
    pub dns: Option<IpAddr>,

    #[clap(long, help = "Persistent keepalive in seconds.")]
    pub keepalive: Option<i32>,

    #[clap(long = "allowed-ip", help = "Extra range routed to the client. Repeatable.")]
    pub allowed_ips: Vec<IpNet>,

    #[clap(long, help = "Do not touch the kernel.")]
    pub dry_run: bool,
}

impl From<Args> for NewClient {
    fn from(args: Args) -> Self {
        NewClient {
            allowed_ips: args.allowed_ips,
            public_key: args.public_key,
            preshared_key: args.preshared_key.unwrap_or_default(),
            private_key: args.private_key,
            name: args.name,
            mtu: Mtu::new(args.mtu),
            dns: args.dns,
            keepalive: args.keepalive,
        }
    }
}

pub async fn exec(args: Args) -> anyhow::Result<()> {
    args.common.init_logging()?;
    let startup = args.common.startup()?;
    let server = open_server(&startup, args.dry_run).await?;

    let user = args.user.clone();
    let client = server.create_client(&user, args.into()).await?;
    tracing::info!("Added client {} at {}", client.public_key, client.ip);
    println!("{}", serde_json::to_string_pretty(&client)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_new_client() {
        let key = Key::new([1; 32]).to_base64();
        let args = Args::try_parse_from([
            "add",
            "--user",
            "alice",
            "--public-key",
            key.as_str(),
            "--mtu",
            "1380",
            "--keepalive",
            "25",
            "--allowed-ip",
            "10.1.0.0/16",
            "--allowed-ip",
            "10.2.0.0/16",
        ])
        .unwrap();

        let req = NewClient::from(args);
        assert_eq!(req.public_key, Key::new([1; 32]));
        assert!(req.preshared_key.is_zero());
        assert_eq!(req.mtu, Mtu::new(1380));
        assert_eq!(req.keepalive, Some(25));
        assert_eq!(req.dns, None);
        assert_eq!(req.allowed_ips.len(), 2);
    }
}
