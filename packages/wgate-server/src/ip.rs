use crate::{error::ServerError, ServerResult};
use ipnet::IpNet;
use std::{
    collections::HashSet,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

/// Finds the next free address in a network.
///
/// The scan starts at the network base and walks upward one address at a
/// time, so the result only depends on the network and the allocated set.
#[derive(Debug)]
pub struct IpAllocator {
    network: IpNet,
    allocated: HashSet<IpAddr>,
}

impl IpAllocator {
    /// `gateway` is always treated as taken.
    pub fn new(
        network: IpNet,
        gateway: IpAddr,
        assigned: impl IntoIterator<Item = IpAddr>,
    ) -> Self {
        let mut allocated: HashSet<IpAddr> = assigned.into_iter().collect();
        allocated.insert(gateway);
        Self { network, allocated }
    }

    pub fn next(&self) -> ServerResult<IpAddr> {
        let start = self.network.network();
        let mut ip = start;
        loop {
            ip = increment(ip);
            if ip == start || !self.network.contains(&ip) {
                tracing::warn!("No free address left in {}", self.network);
                return Err(ServerError::RangeExhausted);
            }
            if !self.allocated.contains(&ip) {
                tracing::debug!("Allocated IP {ip}");
                return Ok(ip);
            }
        }
    }
}

/// Big-endian add-one with carry. The all-ones address wraps to zero.
pub fn increment(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => {
            let mut octets = v4.octets();
            increment_bytes(&mut octets);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        IpAddr::V6(v6) => {
            let mut octets = v6.octets();
            increment_bytes(&mut octets);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    }
}

fn increment_bytes(bytes: &mut [u8]) {
    for b in bytes.iter_mut().rev() {
        *b = b.wrapping_add(1);
        if *b != 0 {
            break;
        }
    }
}
