use netdev::ipnet::Ipv4Net;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Address a UDP socket is connected to when picking the outbound interface.
const OUTBOUND_TARGET: &str = "8.8.8.8:53";

/// First IPv4 address of `host`, or `None` when it does not resolve in time.
/// Dotted quads are returned as is.
pub async fn resolve_ipv4(host: &str, limit: Duration) -> Option<Ipv4Addr> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Some(addr);
    }
    if host.is_empty() {
        return None;
    }

    match timeout(limit, tokio::net::lookup_host((host, 0))).await {
        Ok(Ok(addrs)) => addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next(),
        Ok(Err(e)) => {
            log::debug!("DNS lookup for {} failed: {}", host, e);
            None
        }
        Err(_) => {
            log::debug!("DNS lookup for {} timed out", host);
            None
        }
    }
}

/// Local IPv4 address of the outbound interface.
///
/// Connecting a UDP socket sends nothing but makes the kernel pick the route
/// and source address. Falls back to the first non-loopback interface, then
/// to loopback.
pub async fn my_ip_address(limit: Duration) -> Ipv4Addr {
    match timeout(limit, outbound_address()).await {
        Ok(Ok(addr)) => return addr,
        Ok(Err(e)) => log::debug!("Outbound address lookup failed: {}", e),
        Err(_) => log::debug!("Outbound address lookup timed out"),
    }
    first_interface_address().unwrap_or(Ipv4Addr::LOCALHOST)
}

async fn outbound_address() -> std::io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(OUTBOUND_TARGET).await?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(v4) if !v4.is_unspecified() => Ok(v4),
        other => Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("unusable local address {}", other),
        )),
    }
}

fn first_interface_address() -> Option<Ipv4Addr> {
    first_usable(
        netdev::get_interfaces()
            .into_iter()
            .filter(|interface| !interface.is_loopback())
            .flat_map(|interface| interface.ipv4.into_iter()),
    )
}

fn first_usable(nets: impl IntoIterator<Item = Ipv4Net>) -> Option<Ipv4Addr> {
    nets.into_iter()
        .map(|net| net.addr())
        .find(|addr| !addr.is_loopback() && !addr.is_unspecified())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_literal_addresses_skip_lookup() {
        assert_eq!(
            resolve_ipv4("198.95.249.79", Duration::from_millis(10)).await,
            Some(Ipv4Addr::new(198, 95, 249, 79))
        );
    }

    #[tokio::test]
    async fn test_localhost_resolves_to_ipv4() {
        let addr = resolve_ipv4("localhost", Duration::from_secs(2)).await;
        assert!(addr.map(|a| a.is_loopback()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_none() {
        assert_eq!(resolve_ipv4("", Duration::from_secs(1)).await, None);
        assert_eq!(resolve_ipv4("host.invalid", Duration::from_secs(2)).await, None);
    }

    #[test]
    fn test_first_usable_takes_interface_address_not_network() {
        let nets = vec![
            "127.0.0.1/8".parse::<Ipv4Net>().unwrap(),
            "0.0.0.0/0".parse::<Ipv4Net>().unwrap(),
            "192.168.1.37/24".parse::<Ipv4Net>().unwrap(),
        ];
        assert_eq!(first_usable(nets), Some(Ipv4Addr::new(192, 168, 1, 37)));
        assert_eq!(first_usable(Vec::new()), None);
    }

    #[tokio::test]
    async fn test_my_ip_address_is_ipv4() {
        let addr = my_ip_address(Duration::from_secs(1)).await;
        assert!(!addr.is_unspecified());
    }
}
