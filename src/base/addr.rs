//! Helpers for `host:port` endpoint strings.

use crate::base::neterror::NetError;
use std::net::IpAddr;

/// Splits `host:port` or `[host]:port` into its parts.
///
/// Brackets are stripped from IPv6 literals. A missing port, or an IPv6
/// literal without brackets, yields [`NetError::MissingPort`].
pub fn split_host_port(address: &str) -> Result<(&str, &str), NetError> {
    let missing = || NetError::MissingPort(address.to_string());
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(missing)?;
        let port = tail.strip_prefix(':').ok_or_else(missing)?;
        if port.contains(':') {
            return Err(missing());
        }
        return Ok((host, port));
    }
    let (host, port) = address.rsplit_once(':').ok_or_else(missing)?;
    if host.contains(':') {
        return Err(missing());
    }
    Ok((host, port))
}

/// Joins a host and a port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Parses a decimal port number.
pub fn parse_port(port: &str) -> Result<u16, NetError> {
    port.parse::<u16>()
        .map_err(|_| NetError::InvalidPort(port.to_string()))
}

/// Returns true when `candidate` is an IPv4 or IPv6 literal.
pub fn is_ip_addr(candidate: &str) -> bool {
    candidate.parse::<IpAddr>().is_ok()
}

/// Returns whether `candidate` is an IPv6 literal.
///
/// Fails with [`NetError::InvalidIp`] when it is not an IP literal at all.
pub fn is_ipv6(candidate: &str) -> Result<bool, NetError> {
    match candidate.parse::<IpAddr>() {
        Ok(ip) => Ok(ip.is_ipv6()),
        Err(_) => Err(NetError::InvalidIp),
    }
}
