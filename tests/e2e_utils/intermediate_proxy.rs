#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A small HTTP proxy: `CONNECT` tunnels and absolute-form forwarding.
/// Every request head it receives is recorded.
pub struct IntermediateProxy {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    _handle: JoinHandle<()>,
}

impl IntermediateProxy {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(Self::handle_connection(socket, recorded.clone()));
            }
        });

        Ok(Self {
            addr,
            requests,
            _handle: handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Request heads seen so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    async fn handle_connection(mut socket: TcpStream, requests: Arc<Mutex<Vec<String>>>) {
        let Some(head) = read_head(&mut socket).await else {
            return;
        };
        eprintln!("[IntermediateProxy] Received request:\n{}", head);
        if let Ok(mut requests) = requests.lock() {
            requests.push(head.clone());
        }

        let first_line = head.lines().next().unwrap_or_default().to_string();
        let parts: Vec<&str> = first_line.split_whitespace().collect();
        if parts.len() < 2 {
            return;
        }

        if parts[0] == "CONNECT" {
            Self::handle_connect(socket, parts[1]).await;
        } else if let Some(rest) = parts[1].strip_prefix("http://") {
            Self::handle_forward(socket, &head, parts[0], rest).await;
        } else {
            let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        }
    }

    async fn handle_connect(mut socket: TcpStream, target: &str) {
        match TcpStream::connect(target).await {
            Ok(mut upstream) => {
                if socket
                    .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
                    .await
                    .is_ok()
                {
                    let _ = tokio::io::copy_bidirectional(&mut socket, &mut upstream).await;
                }
            }
            Err(_) => {
                let _ = socket.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
            }
        }
    }

    async fn handle_forward(mut socket: TcpStream, head: &str, method: &str, rest: &str) {
        let (authority, path) = match rest.find('/') {
            Some(slash) => rest.split_at(slash),
            None => (rest, "/"),
        };

        match TcpStream::connect(authority).await {
            Ok(mut upstream) => {
                let mut request = format!("{} {} HTTP/1.1\r\n", method, path);
                for line in head.lines().skip(1) {
                    if line.is_empty() || line.to_ascii_lowercase().starts_with("proxy-") {
                        continue;
                    }
                    request.push_str(line);
                    request.push_str("\r\n");
                }
                request.push_str("\r\n");

                if upstream.write_all(request.as_bytes()).await.is_ok() {
                    let _ = tokio::io::copy_bidirectional(&mut socket, &mut upstream).await;
                }
            }
            Err(_) => {
                let _ = socket.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
            }
        }
    }
}

async fn read_head(socket: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return None,
        }
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}
