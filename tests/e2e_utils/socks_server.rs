#![cfg(test)]
#![allow(dead_code)]

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// No-auth SOCKS5 server supporting `CONNECT` only. Records the requested
/// destinations.
pub struct Socks5Server {
    addr: SocketAddr,
    destinations: Arc<Mutex<Vec<String>>>,
    _handle: JoinHandle<()>,
}

impl Socks5Server {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let destinations = Arc::new(Mutex::new(Vec::new()));

        let recorded = destinations.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    if let Err(e) = Self::handle_connection(socket, recorded).await {
                        eprintln!("[Socks5Server] {}", e);
                    }
                });
            }
        });

        Ok(Self {
            addr,
            destinations,
            _handle: handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn destinations(&self) -> Vec<String> {
        self.destinations.lock().map(|d| d.clone()).unwrap_or_default()
    }

    async fn handle_connection(mut socket: TcpStream, destinations: Arc<Mutex<Vec<String>>>) -> std::io::Result<()> {
        let mut greeting = [0u8; 2];
        socket.read_exact(&mut greeting).await?;
        let mut methods = vec![0u8; greeting[1] as usize];
        socket.read_exact(&mut methods).await?;
        socket.write_all(&[0x05, 0x00]).await?;

        let mut request = [0u8; 4];
        socket.read_exact(&mut request).await?;
        let host = match request[3] {
            0x01 => {
                let mut ip = [0u8; 4];
                socket.read_exact(&mut ip).await?;
                Ipv4Addr::from(ip).to_string()
            }
            0x04 => {
                let mut ip = [0u8; 16];
                socket.read_exact(&mut ip).await?;
                Ipv6Addr::from(ip).to_string()
            }
            _ => {
                let mut len = [0u8; 1];
                socket.read_exact(&mut len).await?;
                let mut name = vec![0u8; len[0] as usize];
                socket.read_exact(&mut name).await?;
                String::from_utf8_lossy(&name).into_owned()
            }
        };
        let port = socket.read_u16().await?;
        let destination = if host.contains(':') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };
        if let Ok(mut destinations) = destinations.lock() {
            destinations.push(destination.clone());
        }

        match TcpStream::connect(&destination).await {
            Ok(mut upstream) => {
                socket.write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await?;
                tokio::io::copy_bidirectional(&mut socket, &mut upstream).await?;
            }
            Err(_) => {
                // Connection refused
                socket.write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await?;
            }
        }
        Ok(())
    }
}
