mod e2e_utils;

use e2e_utils::{file_loader, EchoServer, IntermediateProxy, PacFixture, Socks5Server};
use pacproxy::adapters::{AttemptStats, AttemptTracker, NetworkTransport, TransportOptions};
use pacproxy::domain::{ConnectRequest, DispatchOptions, ProxyDispatcher, ProxyError, ProxySocket, StreamMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A local port nothing listens on.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn dispatcher(pac: &PacFixture, transport: TransportOptions, options: DispatchOptions) -> ProxyDispatcher {
    ProxyDispatcher::new(
        file_loader(&pac.uri()).expect("Failed to build loader"),
        Arc::new(NetworkTransport::new(transport).expect("Failed to build transport")),
        options,
    )
}

fn tunnel_to(port: u16) -> ConnectRequest {
    ConnectRequest::new("127.0.0.1", port, false).with_mode(StreamMode::Tunnel)
}

async fn assert_echoes(socket: &mut ProxySocket) {
    socket.write_all(b"ping").await.expect("Should write through socket");
    let mut buf = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), socket.read_exact(&mut buf))
        .await
        .expect("Echo within timeout")
        .expect("Should read echo");
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_falls_back_from_refused_proxy_to_socks5() {
    let echo = EchoServer::start().await.unwrap();
    let socks = Socks5Server::start().await.unwrap();
    let dead = closed_port().await;
    let pac = PacFixture::returning(&format!(
        "PROXY 127.0.0.1:{}; SOCKS5 127.0.0.1:{}; DIRECT",
        dead,
        socks.addr().port()
    ))
    .unwrap();

    let tracker = Arc::new(AttemptTracker::default());
    let dispatcher =
        dispatcher(&pac, TransportOptions::default(), DispatchOptions::default()).with_observer(tracker.clone());

    let mut socket = dispatcher.connect(&tunnel_to(echo.addr().port())).await.unwrap();
    assert!(!socket.is_forwarding());
    assert_echoes(&mut socket).await;

    assert_eq!(socks.destinations(), vec![format!("127.0.0.1:{}", echo.addr().port())]);
    let stats = tracker.stats();
    assert_eq!(stats["PROXY"], AttemptStats { connected: 0, failed: 1 });
    assert_eq!(stats["SOCKS5"], AttemptStats { connected: 1, failed: 0 });
    assert!(!stats.contains_key("DIRECT"), "DIRECT must not be tried after a success");
}

#[tokio::test]
async fn test_tunnels_through_http_proxy() {
    let echo = EchoServer::start().await.unwrap();
    let proxy = IntermediateProxy::start().await.unwrap();
    let pac = PacFixture::returning(&format!("PROXY 127.0.0.1:{}", proxy.addr().port())).unwrap();

    let dispatcher = dispatcher(&pac, TransportOptions::default(), DispatchOptions::default());
    let mut socket = dispatcher.connect(&tunnel_to(echo.addr().port())).await.unwrap();
    assert_echoes(&mut socket).await;

    let requests = proxy.requests();
    assert_eq!(requests.len(), 1);
    assert!(
        requests[0].starts_with(&format!("CONNECT 127.0.0.1:{} HTTP/1.1", echo.addr().port())),
        "Unexpected request: {}",
        requests[0]
    );
}

#[tokio::test]
async fn test_plain_request_gets_forwarding_socket_with_proxy_headers() {
    let proxy = IntermediateProxy::start().await.unwrap();
    let pac = PacFixture::returning(&format!("HTTP alice:secret@127.0.0.1:{}", proxy.addr().port())).unwrap();
    let transport = TransportOptions {
        proxy_headers: vec![
            ("X-Team".to_string(), "blue".to_string()),
            ("Proxy-Authorization".to_string(), "Bearer stale".to_string()),
        ],
        ..Default::default()
    };

    let dispatcher = dispatcher(&pac, transport, DispatchOptions::default());
    let socket = dispatcher
        .connect(&ConnectRequest::new("example.com", 80, false))
        .await
        .unwrap();

    assert!(socket.is_forwarding());
    assert_eq!(
        socket.forwarding_headers(),
        &[
            ("X-Team".to_string(), "blue".to_string()),
            ("Proxy-Authorization".to_string(), "Basic YWxpY2U6c2VjcmV0".to_string()),
        ]
    );
    assert!(proxy.requests().is_empty(), "Nothing is sent before the first request");
}

#[tokio::test]
async fn test_every_candidate_failing_reports_all_of_them() {
    let dead = closed_port().await;
    let pac = PacFixture::returning(&format!(
        "PROXY 127.0.0.1:{port}; SOCKS 127.0.0.1:{port}; BOGUS thing",
        port = dead
    ))
    .unwrap();

    let dispatcher = dispatcher(&pac, TransportOptions::default(), DispatchOptions::default());
    let err = match dispatcher.connect(&tunnel_to(dead)).await {
        Ok(_) => panic!("No candidate should connect"),
        Err(e) => e,
    };

    let failures = match err {
        ProxyError::AllCandidatesFailed(failures) => failures,
        other => panic!("Unexpected error: {}", other),
    };
    let directives: Vec<_> = failures.iter().map(|f| f.directive.as_str()).collect();
    assert_eq!(
        directives,
        vec![
            format!("PROXY 127.0.0.1:{}", dead).as_str(),
            format!("SOCKS 127.0.0.1:{}", dead).as_str(),
            "BOGUS thing",
        ]
    );
    assert!(failures[2].reason.contains("Could not determine proxy type"));
}

#[tokio::test]
async fn test_fallback_to_direct_is_appended() {
    let echo = EchoServer::start().await.unwrap();
    let dead = closed_port().await;
    let pac = PacFixture::returning(&format!("PROXY 127.0.0.1:{}", dead)).unwrap();

    let options = DispatchOptions {
        fallback_to_direct: true,
        ..Default::default()
    };
    let dispatcher = dispatcher(&pac, TransportOptions::default(), options);
    let mut socket = dispatcher.connect(&tunnel_to(echo.addr().port())).await.unwrap();
    assert_echoes(&mut socket).await;
}

#[tokio::test]
async fn test_falsy_result_means_direct() {
    let echo = EchoServer::start().await.unwrap();
    let pac = PacFixture::new("function FindProxyForURL(url, host) { return null; }").unwrap();

    let dispatcher = dispatcher(&pac, TransportOptions::default(), DispatchOptions::default());
    let request = tunnel_to(echo.addr().port());
    let directives = dispatcher.directives_for(&request).await.unwrap();
    assert_eq!(directives.len(), 1);
    assert!(directives[0].is_direct());

    let mut socket = dispatcher.connect(&request).await.unwrap();
    assert_echoes(&mut socket).await;
}
