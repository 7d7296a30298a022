use crate::domain::{ConnectRequest, ProxySocket, ProxyTarget, Result};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksVersion {
    /// SOCKS4a, hostname resolved by the proxy
    V4,
    /// SOCKS5 with remote DNS
    V5,
}

/// Port for establishing one socket toward the destination of a request,
/// either directly or through a single proxy hop.
#[async_trait]
pub trait TransportPort: Send + Sync {
    async fn connect_direct(&self, request: &ConnectRequest) -> Result<ProxySocket>;

    /// `secure_proxy` wraps the proxy leg itself in TLS (the `HTTPS` directive).
    async fn connect_via_http_proxy(
        &self,
        proxy: &ProxyTarget,
        secure_proxy: bool,
        request: &ConnectRequest,
    ) -> Result<ProxySocket>;

    async fn connect_via_socks(
        &self,
        proxy: &ProxyTarget,
        version: SocksVersion,
        request: &ConnectRequest,
    ) -> Result<ProxySocket>;
}
