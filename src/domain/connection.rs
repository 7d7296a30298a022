use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Any bidirectional byte stream a transport can hand back.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A connected socket produced by the fallback chain.
///
/// `Forwarding` streams end at an HTTP proxy that expects absolute-form
/// requests carrying `headers`; `Tunneled` streams reach the destination
/// itself (directly, via CONNECT or via SOCKS).
pub enum ProxyConnection<T> {
    Forwarding { inner: T, headers: Vec<(String, String)> },
    Tunneled { inner: T },
}

pub type ProxySocket = ProxyConnection<Box<dyn AsyncStream>>;

impl<T> ProxyConnection<T> {
    pub fn is_forwarding(&self) -> bool {
        matches!(self, ProxyConnection::Forwarding { .. })
    }

    /// Headers every request sent over a forwarding stream must carry.
    pub fn forwarding_headers(&self) -> &[(String, String)] {
        match self {
            ProxyConnection::Forwarding { headers, .. } => headers,
            ProxyConnection::Tunneled { .. } => &[],
        }
    }

    pub fn get_ref(&self) -> &T {
        match self {
            ProxyConnection::Forwarding { inner, .. } | ProxyConnection::Tunneled { inner } => inner,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            ProxyConnection::Forwarding { inner, .. } | ProxyConnection::Tunneled { inner } => inner,
        }
    }
}

impl ProxySocket {
    pub fn tunneled<S: AsyncStream + 'static>(stream: S) -> Self {
        ProxyConnection::Tunneled {
            inner: Box::new(stream),
        }
    }

    pub fn forwarding<S: AsyncStream + 'static>(stream: S, headers: Vec<(String, String)>) -> Self {
        ProxyConnection::Forwarding {
            inner: Box::new(stream),
            headers,
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for ProxyConnection<T> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            ProxyConnection::Forwarding { inner, .. } => Pin::new(inner).poll_read(cx, buf),
            ProxyConnection::Tunneled { inner } => Pin::new(inner).poll_read(cx, buf),
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for ProxyConnection<T> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match &mut *self {
            ProxyConnection::Forwarding { inner, .. } => Pin::new(inner).poll_write(cx, buf),
            ProxyConnection::Tunneled { inner } => Pin::new(inner).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            ProxyConnection::Forwarding { inner, .. } => Pin::new(inner).poll_flush(cx),
            ProxyConnection::Tunneled { inner } => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            ProxyConnection::Forwarding { inner, .. } => Pin::new(inner).poll_shutdown(cx),
            ProxyConnection::Tunneled { inner } => Pin::new(inner).poll_shutdown(cx),
        }
    }
}
