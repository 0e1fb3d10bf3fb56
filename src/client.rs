use crate::Settings;
use core::net::IpAddr;
use tracing::trace;

/// Remove port and IPv6 square brackets from a forwarded address.
fn bare_address(val: &str) -> &str {
    if let Some(rest) = val.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }

    match val.split_once(':') {
        // a single colon is a port separator, more is an IPv6 address
        Some((host, port)) if !port.contains(':') => host,
        _ => val,
    }
}

/// Resolve the client ip address of a request given the trusted proxies settings
///
/// When reverse proxy is enabled and the immediate peer is trusted, the `X-Forwarded-For` values
/// are read from right to left, skipping trusted proxies and invalid values: the first untrusted
/// address is the client. If no such address exists, the peer is returned.
///
/// # Example
/// ```
/// use inferred_proxies::{client_ip, Settings};
///
/// let mut settings = Settings::new();
/// settings.enable_reverse_proxy();
/// settings.add_reverse_proxy_address("192.0.2.1");
///
/// let ip = client_ip(&settings, "192.0.2.1".parse().unwrap(), Some("192.0.2.100"));
///
/// assert_eq!(ip, "192.0.2.100".parse::<std::net::IpAddr>().unwrap());
/// ```
pub fn client_ip(settings: &Settings, peer: IpAddr, forwarded_for: Option<&str>) -> IpAddr {
    if settings.reverse_proxy() != Some(true) || !settings.is_ip_trusted(&peer) {
        return peer;
    }

    let Some(forwarded_for) = forwarded_for else {
        return peer;
    };

    for value in forwarded_for.split(',').map(|s| s.trim()).rev() {
        match bare_address(value).parse::<IpAddr>() {
            Ok(ip) if settings.is_ip_trusted(&ip) => continue,
            Ok(ip) => return ip,
            Err(_) => trace!(value, "skip invalid x-forwarded-for value"),
        }
    }

    peer
}
