//! Local network interface inspection
//!
//! Derives the set of IPv4 broadcast addresses to probe and computes
//! which device hosts fall outside every derived broadcast domain.
//! The snapshot is taken fresh on every call; interface sets change at
//! runtime (VPNs, docking, DHCP renewals).

use std::collections::HashSet;
use std::net::Ipv4Addr;

use pnet::datalink;
use pnet::ipnetwork::{IpNetwork, Ipv4Network};

/// One interface address as relevant to probing.
#[derive(Debug, Clone)]
pub(crate) struct NicAddr {
    pub up: bool,
    pub loopback: bool,
    pub net: Ipv4Network,
}

fn snapshot() -> Vec<NicAddr> {
    let mut nics = Vec::new();
    for iface in datalink::interfaces() {
        for ip in &iface.ips {
            if let IpNetwork::V4(net) = ip {
                nics.push(NicAddr {
                    up: iface.is_up(),
                    loopback: iface.is_loopback(),
                    net: *net,
                });
            }
        }
    }
    nics
}

pub(crate) fn derive(nics: &[NicAddr]) -> Vec<Ipv4Addr> {
    let mut addrs = Vec::new();
    for nic in nics {
        if !nic.up || nic.loopback {
            continue;
        }
        // /31 and /32 networks have no usable broadcast address.
        if nic.net.prefix() >= 31 {
            continue;
        }
        if nic.net.ip().is_unspecified() {
            continue;
        }
        let broadcast = nic.net.broadcast();
        if !addrs.contains(&broadcast) {
            addrs.push(broadcast);
        }
    }
    addrs
}

/// Broadcast addresses of the machine's usable IPv4 interfaces, one per
/// distinct network, deduplicated.
pub fn broadcast_addrs() -> Vec<Ipv4Addr> {
    derive(&snapshot())
}

/// The /24-equivalent network prefix of an address (top 3 octets).
pub fn prefix24(addr: Ipv4Addr) -> [u8; 3] {
    let octets = addr.octets();
    [octets[0], octets[1], octets[2]]
}

/// Hosts whose /24 prefix is not covered by any broadcast address.
///
/// Those are devices behind networks this machine does not own a
/// broadcast domain for; the watchdog keeps them alive individually.
pub fn uncovered_hosts(hosts: &[Ipv4Addr], broadcasts: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let covered: HashSet<[u8; 3]> = broadcasts.iter().map(|a| prefix24(*a)).collect();
    let mut seen = HashSet::new();
    hosts
        .iter()
        .copied()
        .filter(|host| !covered.contains(&prefix24(*host)))
        .filter(|host| seen.insert(*host))
        .collect()
}
