//! Socket transports for each kind of fallback candidate.

mod socks;
mod tls;
mod tunnel;

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::domain::{AsyncStream, ConnectRequest, ProxyError, ProxySocket, ProxyTarget, Result, StreamMode};
use crate::ports::{SocksVersion, TransportPort};

pub use tunnel::{basic_auth, tunnel};

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Sent to every HTTP proxy, on CONNECT and on forwarded requests.
    pub proxy_headers: Vec<(String, String)>,
    pub accept_invalid_certs: bool,
    pub connect_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            proxy_headers: Vec::new(),
            accept_invalid_certs: false,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// [`TransportPort`] over real TCP sockets.
pub struct NetworkTransport {
    options: TransportOptions,
    tls: TlsConnector,
}

impl NetworkTransport {
    pub fn new(options: TransportOptions) -> Result<Self> {
        let tls = tls::connector(options.accept_invalid_certs)?;
        Ok(Self { options, tls })
    }

    async fn tcp(&self, address: &str) -> Result<TcpStream> {
        let stream = timeout(self.options.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| ProxyError::Timeout)?
            .map_err(|e| ProxyError::Io(format!("connect to {} failed: {}", address, e)))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Finishes a stream that already reaches the destination.
    async fn finish(&self, stream: Box<dyn AsyncStream>, request: &ConnectRequest) -> Result<ProxySocket> {
        match request.mode {
            StreamMode::Tls => Ok(ProxySocket::tunneled(tls::wrap(&self.tls, &request.host, stream).await?)),
            StreamMode::Plain | StreamMode::Tunnel => Ok(ProxySocket::tunneled(stream)),
        }
    }

    fn proxy_headers(&self, proxy: &ProxyTarget) -> Vec<(String, String)> {
        let mut headers = self.options.proxy_headers.clone();
        if let Some(auth) = basic_auth(proxy) {
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case("proxy-authorization"));
            headers.push(("Proxy-Authorization".to_string(), auth));
        }
        headers
    }
}

#[async_trait]
impl TransportPort for NetworkTransport {
    async fn connect_direct(&self, request: &ConnectRequest) -> Result<ProxySocket> {
        let stream = self.tcp(&request.authority()).await?;
        self.finish(Box::new(stream), request).await
    }

    async fn connect_via_http_proxy(
        &self,
        proxy: &ProxyTarget,
        secure_proxy: bool,
        request: &ConnectRequest,
    ) -> Result<ProxySocket> {
        let tcp = self.tcp(&proxy.address()).await?;
        let mut stream: Box<dyn AsyncStream> = if secure_proxy {
            tls::wrap(&self.tls, &proxy.host, Box::new(tcp)).await?
        } else {
            Box::new(tcp)
        };
        let headers = self.proxy_headers(proxy);

        if request.mode == StreamMode::Plain {
            return Ok(ProxySocket::forwarding(stream, headers));
        }
        tunnel(&mut stream, &request.authority(), &headers).await?;
        self.finish(stream, request).await
    }

    async fn connect_via_socks(
        &self,
        proxy: &ProxyTarget,
        version: SocksVersion,
        request: &ConnectRequest,
    ) -> Result<ProxySocket> {
        let tcp = self.tcp(&proxy.address()).await?;
        let stream = socks::handshake(tcp, proxy, version, request).await?;
        self.finish(Box::new(stream), request).await
    }
}
