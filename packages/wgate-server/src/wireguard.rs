use crate::device::{Device, DeviceError, DeviceResult, Peer, PeerAction, PeerEntry};
use async_trait::async_trait;
use ipnet::IpNet;
use std::{
    collections::HashMap,
    net::IpAddr,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{io::AsyncWriteExt, process::Command};
use wgate_crypto::{Key, PrivateKey};
use wgate_lib::{constant::IPV4_FORWARD_PATH, types::Mtu};

const NONE: &str = "(none)";
const DEV_NULL: &str = "/dev/null";

/// [`Device`] backed by the `ip`, `wg` and `nft` command line tools.
#[derive(Debug, Clone)]
pub struct WgCommandDevice {
    forward_path: PathBuf,
}

impl Default for WgCommandDevice {
    fn default() -> Self {
        Self {
            forward_path: PathBuf::from(IPV4_FORWARD_PATH),
        }
    }
}

impl WgCommandDevice {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> DeviceResult<String> {
        let command = format!("{program} {}", args.join(" "));
        tracing::debug!("Running `{command}`");

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(DeviceError::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Like `run`, but an "already exists" failure counts as success.
    async fn run_idempotent(&self, program: &str, args: &[String]) -> DeviceResult<()> {
        match self.run(program, args, None).await {
            Ok(_) => Ok(()),
            Err(DeviceError::Command { stderr, .. }) if already_exists(&stderr) => {
                tracing::debug!("Reusing existing state: {stderr}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn already_exists(stderr: &str) -> bool {
    stderr.contains("File exists") || stderr.contains("already assigned")
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Masquerade rules for traffic from `link` leaving via `out_link`.
///
/// Only the `wgate` table is replaced; other rulesets are left alone.
pub fn nat_script(link: &str, out_link: &str) -> String {
    format!(
        "add table ip wgate
flush table ip wgate
table ip wgate {{
    chain forward {{
        type filter hook forward priority filter; policy accept;
        iifname \"{link}\" accept
        oifname \"{link}\" ct state established,related accept
    }}
    chain postrouting {{
        type nat hook postrouting priority srcnat; policy accept;
        oifname \"{out_link}\" masquerade
    }}
}}
"
    )
}

/// Peers listed by `wg show <link> dump`.
///
/// The first line describes the interface itself and is skipped.
pub fn parse_dump(dump: &str) -> DeviceResult<Vec<Peer>> {
    let mut peers = Vec::new();
    for line in dump.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            return Err(DeviceError::Malformed(format!(
                "expected at least 4 fields in peer line {line:?}"
            )));
        }

        let public_key = Key::from_base64(fields[0])
            .map_err(|e| DeviceError::Malformed(format!("peer key: {e}")))?;
        let preshared_key = match fields[1] {
            NONE => Key::default(),
            psk => Key::from_base64(psk)
                .map_err(|e| DeviceError::Malformed(format!("preshared key: {e}")))?,
        };
        let allowed_ips = match fields[3] {
            NONE | "" => Vec::new(),
            list => list
                .split(',')
                .map(|net| net.trim().parse::<IpNet>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DeviceError::Malformed(format!("allowed ips: {e}")))?,
        };

        peers.push(Peer {
            public_key,
            preshared_key,
            allowed_ips,
        });
    }
    Ok(peers)
}

/// Arguments for one `wg set` call applying `entries`.
///
/// `key_files` maps each non-zero preshared key to the file holding it.
pub fn wg_set_args(
    link: &str,
    private_key_file: &Path,
    listen_port: u16,
    entries: &[PeerEntry],
    key_files: &HashMap<Key, PathBuf>,
) -> Vec<String> {
    let mut out = args(["set", link, "private-key"]);
    out.push(private_key_file.display().to_string());
    out.push("listen-port".to_string());
    out.push(listen_port.to_string());

    for entry in entries {
        out.push("peer".to_string());
        out.push(entry.public_key().to_base64());
        match entry.action {
            PeerAction::Remove => out.push("remove".to_string()),
            PeerAction::Add | PeerAction::Update => {
                out.push("preshared-key".to_string());
                out.push(
                    key_files
                        .get(&entry.peer.preshared_key)
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| DEV_NULL.to_string()),
                );
                out.push("allowed-ips".to_string());
                out.push(
                    entry
                        .peer
                        .allowed_ips
                        .iter()
                        .map(IpNet::to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                );
            }
        }
    }
    out
}

async fn write_key_file(dir: &Path, name: &str, key: &Key) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    opts.mode(0o600);

    let mut file = opts.open(&path).await?;
    file.write_all(key.to_base64().as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}

#[async_trait]
impl Device for WgCommandDevice {
    async fn enable_forwarding(&self) -> DeviceResult<()> {
        tokio::fs::write(&self.forward_path, b"1\n").await?;
        tracing::info!("Enabled IPv4 forwarding");
        Ok(())
    }

    async fn ensure_link(&self, name: &str) -> DeviceResult<()> {
        self.run_idempotent("ip", &args(["link", "add", "dev", name, "type", "wireguard"]))
            .await
    }

    async fn set_address(&self, name: &str, ip: IpAddr, prefix_len: u8) -> DeviceResult<()> {
        let cidr = format!("{ip}/{prefix_len}");
        self.run_idempotent("ip", &args(["address", "add", cidr.as_str(), "dev", name]))
            .await
    }

    async fn set_mtu(&self, name: &str, mtu: Mtu) -> DeviceResult<()> {
        let mtu = mtu.to_string();
        self.run("ip", &args(["link", "set", "dev", name, "mtu", mtu.as_str()]), None)
            .await?;
        Ok(())
    }

    async fn set_up(&self, name: &str) -> DeviceResult<()> {
        self.run("ip", &args(["link", "set", "dev", name, "up"]), None)
            .await?;
        Ok(())
    }

    async fn configure_nat(&self, name: &str, out_link: &str) -> DeviceResult<()> {
        let script = nat_script(name, out_link);
        self.run("nft", &args(["-f", "-"]), Some(script.as_bytes()))
            .await?;
        tracing::info!("Masquerading {name} traffic through {out_link}");
        Ok(())
    }

    async fn current_peers(&self, name: &str) -> DeviceResult<Vec<Peer>> {
        let dump = self.run("wg", &args(["show", name, "dump"]), None).await?;
        parse_dump(&dump)
    }

    async fn apply_peer_diff(
        &self,
        name: &str,
        private_key: &PrivateKey,
        listen_port: u16,
        entries: &[PeerEntry],
    ) -> DeviceResult<()> {
        let dir = tempfile::Builder::new().prefix("wgate").tempdir()?;
        let private_key_file =
            write_key_file(dir.path(), "private", private_key.as_key()).await?;

        let mut key_files = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            let psk = entry.peer.preshared_key;
            if psk.is_zero() || key_files.contains_key(&psk) {
                continue;
            }
            let path = write_key_file(dir.path(), &format!("psk{i}"), &psk).await?;
            key_files.insert(psk, path);
        }

        let set = wg_set_args(name, &private_key_file, listen_port, entries, &key_files);
        self.run("wg", &set, None).await?;
        Ok(())
    }
}
