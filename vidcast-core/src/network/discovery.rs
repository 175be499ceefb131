//! Local address discovery.
//!
//! "Connecting" a UDP socket sends no packets but makes the OS pick the
//! outbound interface for the route, whose address is then readable via
//! `local_addr`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::warn;

/// Well-known public endpoint used when no peer address is known yet.
pub const DEFAULT_PROBE_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

/// The local IP address the OS would use to reach `remote`.
///
/// Falls back to `127.0.0.1` when no route exists.
pub async fn outbound_ip(remote: SocketAddr) -> IpAddr {
    match probe(remote).await {
        Ok(ip) => ip,
        Err(e) => {
            warn!("failed to discover local address towards {remote}: {e}");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

async fn probe(remote: SocketAddr) -> std::io::Result<IpAddr> {
    let bind: SocketAddr = match remote {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(remote).await?;
    Ok(socket.local_addr()?.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_route_uses_loopback() {
        let ip = outbound_ip("127.0.0.1:9".parse().unwrap()).await;
        assert!(ip.is_loopback());
    }
}
