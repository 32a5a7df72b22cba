//! Address bookkeeping for the host running the server.

use log::warn;
use std::net::{IpAddr, Ipv4Addr};

/// List the host's non-loopback IPv4 addresses, sorted ascending.
pub fn get_address_list() -> Vec<String> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            warn!("interface enumeration failed: {}", err);
            return vec![];
        }
    };

    let mut address_list: Vec<String> = interfaces
        .iter()
        .filter(|interface| !interface.is_loopback())
        .filter_map(|interface| match interface.ip() {
            IpAddr::V4(ip) => Some(ip.to_string()),
            IpAddr::V6(_) => None,
        })
        .collect();

    address_list.sort();
    address_list
}

/// Pick the address worth advertising by default: the first RFC 1918 private
/// address in the list, the first entry when none is private, and the empty
/// string for an empty list.
pub fn select_default_address(address_list: &[String]) -> String {
    for address in address_list {
        if let Ok(ip) = address.parse::<Ipv4Addr>() {
            if ip.is_private() {
                return address.clone();
            }
        }
    }

    address_list.first().cloned().unwrap_or_default()
}
