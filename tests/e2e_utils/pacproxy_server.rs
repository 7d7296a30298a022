#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use pacproxy::adapters::{serve, AttemptTracker, HyperProxyAdapter, NetworkTransport, TransportOptions};
use pacproxy::domain::{DispatchOptions, ProxyDispatcher};

use super::file_loader;

/// The local proxy front-end on an ephemeral port.
pub struct TestPacproxyServer {
    addr: SocketAddr,
    tracker: Arc<AttemptTracker>,
    _server_handle: JoinHandle<()>,
}

impl TestPacproxyServer {
    pub async fn start(pac_uri: &str, transport: TransportOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let tracker = Arc::new(AttemptTracker::default());
        let dispatcher = ProxyDispatcher::new(
            file_loader(pac_uri)?,
            Arc::new(NetworkTransport::new(transport)?),
            DispatchOptions::default(),
        )
        .with_observer(tracker.clone());
        let adapter = Arc::new(HyperProxyAdapter::new(Arc::new(dispatcher)));

        let server_handle = tokio::spawn(async move {
            if let Err(e) = serve(listener, adapter).await {
                eprintln!("[TestPacproxyServer] {}", e);
            }
        });

        Ok(Self {
            addr,
            tracker,
            _server_handle: server_handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn tracker(&self) -> &AttemptTracker {
        &self.tracker
    }
}
