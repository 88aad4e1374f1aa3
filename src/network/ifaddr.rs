//! Host interface address enumeration
//!
//! Non-VNET jails can only use addresses already configured on a host
//! interface, so callers check requested jail addresses against this list.

use crate::error::{Error, Result};
use nix::ifaddrs::getifaddrs;
use serde::Serialize;
use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};

/// One IPv4 or IPv6 address on a host interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceAddr {
    /// Interface name (e.g., "em0")
    pub interface: String,
    pub addr: IpAddr,
}

/// Enumerate every IPv4 and IPv6 address on every interface
pub fn enum_addrs() -> Result<Vec<InterfaceAddr>> {
    let addrs =
        getifaddrs().map_err(|e| Error::Network(format!("getifaddrs failed: {}", e)))?;

    Ok(addrs
        .filter_map(|ifa| {
            let storage = ifa.address?;
            let addr = if let Some(sin) = storage.as_sockaddr_in() {
                IpAddr::V4(*SocketAddrV4::from(*sin).ip())
            } else if let Some(sin6) = storage.as_sockaddr_in6() {
                IpAddr::V6(*SocketAddrV6::from(*sin6).ip())
            } else {
                return None;
            };

            Some(InterfaceAddr {
                interface: ifa.interface_name,
                addr,
            })
        })
        .collect())
}

/// Addresses from `wanted` that no host interface carries
pub fn missing<'a>(host: &[InterfaceAddr], wanted: &'a [IpAddr]) -> Vec<&'a IpAddr> {
    wanted
        .iter()
        .filter(|ip| !host.iter().any(|h| h.addr == **ip))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_missing() {
        let host = vec![
            InterfaceAddr {
                interface: "lo0".into(),
                addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            },
            InterfaceAddr {
                interface: "lo0".into(),
                addr: IpAddr::V6(Ipv6Addr::LOCALHOST),
            },
        ];
        let wanted = vec![
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
        ];

        assert_eq!(missing(&host, &wanted), vec![&wanted[1]]);
        assert!(missing(&host, &[]).is_empty());
    }

    #[test]
    fn test_enum_addrs() {
        let addrs = enum_addrs().unwrap();
        assert!(addrs.iter().all(|a| !a.interface.is_empty()));
    }
}
