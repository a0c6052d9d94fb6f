//! Ethernet interface discovery.
//!
//! The fieldbus stack needs the interface's IPv4 address, netmask and MAC
//! before it can bind. A missing interface or an unconfigured address is
//! a startup failure; the process exits nonzero.

use anyhow::{bail, Context, Result};
use std::net::Ipv4Addr;

/// Addressing of one Ethernet interface.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// Kernel interface index.
    pub index: u32,
    /// IPv4 address.
    pub ip: Ipv4Addr,
    /// IPv4 netmask.
    pub netmask: Ipv4Addr,
    /// Derived gateway (host .1 of the address's /24).
    pub gateway: Ipv4Addr,
    /// Hardware address.
    pub mac: [u8; 6],
    /// Interface MTU.
    pub mtu: u32,
}

impl InterfaceInfo {
    /// MAC address in canonical colon notation.
    #[must_use]
    pub fn mac_string(&self) -> String {
        let m = &self.mac;
        format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Gateway assumed at host .1 of the interface's /24.
fn derive_gateway(ip: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = ip.octets();
    Ipv4Addr::new(a, b, c, 1)
}

fn read_mtu(name: &str) -> Option<u32> {
    std::fs::read_to_string(format!("/sys/class/net/{name}/mtu"))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Resolve addressing for `name` from the kernel.
///
/// # Errors
///
/// Fails when the interface does not exist, carries no usable IPv4
/// address, or has no hardware address.
#[cfg(target_os = "linux")]
pub fn probe(name: &str) -> Result<InterfaceInfo> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::if_nametoindex;

    let index =
        if_nametoindex(name).with_context(|| format!("no such Ethernet interface: {name}"))?;

    let mut ip = None;
    let mut netmask = None;
    let mut mac = None;

    for ifaddr in getifaddrs().context("failed to enumerate interface addresses")? {
        if ifaddr.interface_name != name {
            continue;
        }
        if let Some(address) = ifaddr.address.as_ref() {
            if let Some(sin) = address.as_sockaddr_in() {
                ip = Some(sin.ip());
                netmask = ifaddr
                    .netmask
                    .as_ref()
                    .and_then(|m| m.as_sockaddr_in().map(|s| s.ip()));
            } else if let Some(link) = address.as_link_addr() {
                mac = link.addr();
            }
        }
    }

    let ip = ip.with_context(|| format!("interface {name} has no IPv4 address"))?;
    if ip.is_unspecified() {
        bail!("invalid IP address on {name}");
    }
    let mac = mac.with_context(|| format!("interface {name} has no hardware address"))?;

    Ok(InterfaceInfo {
        index,
        ip,
        netmask: netmask.unwrap_or_else(|| Ipv4Addr::new(255, 255, 255, 0)),
        gateway: derive_gateway(ip),
        mac,
        mtu: read_mtu(name).unwrap_or(1500),
    })
}

/// Non-Linux fallback; the bridge only deploys on Linux field devices.
#[cfg(not(target_os = "linux"))]
pub fn probe(name: &str) -> Result<InterfaceInfo> {
    bail!("interface discovery not supported on this platform: {name}")
}
