use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use super::HyperProxyAdapter;
use crate::domain::Result;

/// Accepts proxy clients on `listener` until accepting fails.
pub async fn serve(listener: TcpListener, adapter: Arc<HyperProxyAdapter>) -> Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let adapter = adapter.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let adapter = adapter.clone();
                async move { Ok::<_, hyper::Error>(adapter.handle(req).await) }
            });

            if let Err(err) = ServerBuilder::new(TokioExecutor::new())
                .http1()
                .preserve_header_case(true)
                .title_case_headers(true)
                .serve_connection_with_upgrades(io, service)
                .await
            {
                log::debug!("Connection from {} ended: {}", peer, err);
            }
        });
    }
}
