pub const WIREGUARD_INTERFACE: &str = "wg0";

pub const DEFAULT_DATA_DIR: &str = "/var/lib/wgate";

pub const SNAPSHOT_FILENAME: &str = "config.json";

pub const DEFAULT_GATEWAY_CIDR: &str = "172.31.255.1/24";

pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:51820";

pub const DEFAULT_ALLOWED_IPS: &str = "0.0.0.0/0";

pub const DEFAULT_MTU: u16 = 1420;

pub const UNNAMED_CLIENT: &str = "Unnamed Client";

pub const IPV4_FORWARD_PATH: &str = "/proc/sys/net/ipv4/ip_forward";
