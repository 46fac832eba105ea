//! Host fact detection.

use std::net::UdpSocket;

use tracing::debug;
use url::Url;

use crate::domain::resolved::Host;

/// Address used when nothing better can be determined.
pub const LOOPBACK: &str = "127.0.0.1";

impl Host {
    /// Detect host facts from `DOCKER_HOST` and the network configuration.
    pub fn detect() -> Self {
        Self::detect_with(std::env::var("DOCKER_HOST").ok().as_deref())
    }

    /// Detect host facts given an explicit `DOCKER_HOST` value.
    ///
    /// A remote daemon address wins, since published ports live on that
    /// machine. Otherwise the address of the primary outbound interface is
    /// used, falling back to loopback.
    pub fn detect_with(docker_host: Option<&str>) -> Self {
        if let Some(ip) = docker_host.and_then(remote_daemon_host) {
            debug!(ip = %ip, "host ip from DOCKER_HOST");
            return Host::new(ip);
        }
        let ip = primary_interface_ip().unwrap_or_else(|| LOOPBACK.to_string());
        debug!(ip = %ip, "host ip from primary interface");
        Host::new(ip)
    }
}

/// Host part of a TCP `DOCKER_HOST` that does not point at this machine.
pub fn remote_daemon_host(docker_host: &str) -> Option<String> {
    let url = Url::parse(docker_host).ok()?;
    if !matches!(url.scheme(), "tcp" | "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    if matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0" | "[::1]" | "::1") {
        return None;
    }
    Some(host.to_string())
}

/// Local address of the interface that routes to the outside world.
///
/// Connecting a UDP socket sends no packets; it only selects a route.
fn primary_interface_ip() -> Option<String> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(("10.255.255.255", 1)).ok()?;
    let addr = socket.local_addr().ok()?;
    if addr.ip().is_unspecified() {
        return None;
    }
    Some(addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_daemon_host() {
        assert_eq!(
            remote_daemon_host("tcp://192.168.59.103:2376"),
            Some("192.168.59.103".to_string())
        );
        assert_eq!(
            remote_daemon_host("tcp://docker.internal:2375"),
            Some("docker.internal".to_string())
        );
    }

    #[test]
    fn test_local_daemon_host_ignored() {
        assert_eq!(remote_daemon_host("tcp://127.0.0.1:2375"), None);
        assert_eq!(remote_daemon_host("tcp://localhost:2375"), None);
        assert_eq!(remote_daemon_host("unix:///var/run/docker.sock"), None);
        assert_eq!(remote_daemon_host("not a url"), None);
    }

    #[test]
    fn test_detect_with_remote_daemon() {
        let host = Host::detect_with(Some("tcp://10.1.2.3:2376"));
        assert_eq!(host.ip, "10.1.2.3");
    }

    #[test]
    fn test_detect_without_daemon_yields_address() {
        let host = Host::detect_with(None);
        assert!(host.ip.parse::<std::net::IpAddr>().is_ok());
    }
}
