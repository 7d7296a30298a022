use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};

use crate::domain::{ConnectRequest, ProxyError, ProxyTarget, Result};
use crate::ports::SocksVersion;

/// Runs the SOCKS handshake on an already connected `socket`. The proxy
/// resolves the destination name (SOCKS4a / SOCKS5 remote DNS).
pub async fn handshake(
    socket: TcpStream,
    proxy: &ProxyTarget,
    version: SocksVersion,
    request: &ConnectRequest,
) -> Result<TcpStream> {
    let target = (request.host.as_str(), request.port);
    let failed = |e: tokio_socks::Error| ProxyError::Io(format!("SOCKS handshake with {} failed: {}", proxy, e));

    let stream = match version {
        SocksVersion::V5 => match &proxy.credentials {
            Some((user, pass)) => Socks5Stream::connect_with_password_and_socket(socket, target, user, pass)
                .await
                .map_err(failed)?
                .into_inner(),
            None => Socks5Stream::connect_with_socket(socket, target)
                .await
                .map_err(failed)?
                .into_inner(),
        },
        SocksVersion::V4 => Socks4Stream::connect_with_socket(socket, target)
            .await
            .map_err(failed)?
            .into_inner(),
    };
    Ok(stream)
}
