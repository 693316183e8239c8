//! Target allow-list matching.
//!
//! Entries are `*`, an exact host name or IP, or a CIDR block
//! (`10.0.0.0/8`, `2001:db8::/32`). Host names compare case-insensitively.
//! An empty list is not handled here; callers decide what "no entries"
//! means for their source.

use std::net::IpAddr;

/// Whether `target` matches any entry. A missing target matches only `*`.
pub fn is_allowed_target(target: Option<&str>, allowlist: &[String]) -> bool {
    allowlist.iter().any(|entry| entry_matches(target, entry.trim()))
}

fn entry_matches(target: Option<&str>, entry: &str) -> bool {
    if entry == "*" {
        return true;
    }
    let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) else {
        return false;
    };

    if let Some((network, prefix)) = entry.split_once('/') {
        return match (target.parse::<IpAddr>(), network.parse::<IpAddr>(), prefix.parse::<u32>()) {
            (Ok(ip), Ok(net), Ok(bits)) => cidr_contains(net, bits, ip),
            _ => false,
        };
    }

    match (target.parse::<IpAddr>(), entry.parse::<IpAddr>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => target.eq_ignore_ascii_case(entry),
    }
}

fn cidr_contains(network: IpAddr, bits: u32, ip: IpAddr) -> bool {
    match (network, ip) {
        (IpAddr::V4(net), IpAddr::V4(ip)) if bits <= 32 => {
            let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
            (u32::from(net) & mask) == (u32::from(ip) & mask)
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) if bits <= 128 => {
            let mask = if bits == 0 { 0 } else { u128::MAX << (128 - bits) };
            (u128::from(net) & mask) == (u128::from(ip) & mask)
        }
        _ => false,
    }
}
