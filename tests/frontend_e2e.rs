mod e2e_utils;

use e2e_utils::{EchoServer, HttpOrigin, IntermediateProxy, PacFixture, TestPacproxyServer};
use pacproxy::adapters::TransportOptions;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Reads from `stream` until `needle` shows up or the peer closes.
async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .expect("Should receive data within timeout")
            .expect("Should be able to read");
        received.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&received).into_owned();
        if n == 0 || text.contains(needle) {
            return text;
        }
    }
}

#[tokio::test]
async fn test_connect_tunnels_directly() {
    let echo = EchoServer::start().await.unwrap();
    let pac = PacFixture::returning("DIRECT").unwrap();
    let server = TestPacproxyServer::start(&pac.uri(), TransportOptions::default())
        .await
        .expect("Failed to start pacproxy");

    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    let target = echo.addr();
    stream
        .write_all(format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let head = read_until(&mut stream, "\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.1 200"), "Expected 200 for CONNECT, got: {}", head);

    stream.write_all(b"hello through the tunnel").await.unwrap();
    let echoed = read_until(&mut stream, "tunnel").await;
    assert_eq!(echoed, "hello through the tunnel");
    assert_eq!(server.tracker().stats()["DIRECT"].connected, 1);
}

#[tokio::test]
async fn test_absolute_form_request_goes_direct() {
    let origin = HttpOrigin::start().await.unwrap();
    let pac = PacFixture::returning("DIRECT").unwrap();
    let server = TestPacproxyServer::start(&pac.uri(), TransportOptions::default())
        .await
        .unwrap();

    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    let target = origin.addr();
    stream
        .write_all(
            format!("GET http://{target}/hello?x=1 HTTP/1.1\r\nHost: {target}\r\nConnection: close\r\n\r\n").as_bytes(),
        )
        .await
        .unwrap();

    let response = read_until(&mut stream, "origin says /hello?x=1").await;
    assert!(response.starts_with("HTTP/1.1 200"), "Unexpected response: {}", response);
    assert!(response.ends_with("origin says /hello?x=1"), "Unexpected response: {}", response);
}

#[tokio::test]
async fn test_absolute_form_request_is_forwarded_through_http_proxy() {
    let origin = HttpOrigin::start().await.unwrap();
    let proxy = IntermediateProxy::start().await.unwrap();
    let pac = PacFixture::returning(&format!("PROXY 127.0.0.1:{}", proxy.addr().port())).unwrap();
    let transport = TransportOptions {
        proxy_headers: vec![("X-Team".to_string(), "blue".to_string())],
        ..Default::default()
    };
    let server = TestPacproxyServer::start(&pac.uri(), transport).await.unwrap();

    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    let target = origin.addr();
    stream
        .write_all(
            format!("GET http://{target}/via-proxy HTTP/1.1\r\nHost: {target}\r\nConnection: close\r\n\r\n").as_bytes(),
        )
        .await
        .unwrap();

    let response = read_until(&mut stream, "origin says /via-proxy").await;
    assert!(response.contains("origin says /via-proxy"), "Unexpected response: {}", response);

    let requests = proxy.requests();
    assert_eq!(requests.len(), 1);
    assert!(
        requests[0].starts_with(&format!("GET http://{}/via-proxy HTTP/1.1", target)),
        "Proxy should see the absolute URI: {}",
        requests[0]
    );
    assert!(requests[0].contains("X-Team: blue"), "Missing proxy header: {}", requests[0]);
}

#[tokio::test]
async fn test_connect_with_no_working_candidate_is_bad_gateway() {
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let pac = PacFixture::returning(&format!("PROXY 127.0.0.1:{}", dead)).unwrap();
    let server = TestPacproxyServer::start(&pac.uri(), TransportOptions::default())
        .await
        .unwrap();

    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    stream
        .write_all(b"CONNECT example.invalid:443 HTTP/1.1\r\nHost: example.invalid:443\r\n\r\n")
        .await
        .unwrap();

    let response = read_until(&mut stream, "proxies").await;
    assert!(response.starts_with("HTTP/1.1 502"), "Expected 502, got: {}", response);
    assert_eq!(server.tracker().stats()["PROXY"].failed, 1);
}
