#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod echo_server;
pub mod intermediate_proxy;
pub mod pac_fixture;
pub mod pacproxy_server;
pub mod socks_server;

pub use echo_server::{EchoServer, HttpOrigin};
pub use intermediate_proxy::IntermediateProxy;
pub use pac_fixture::{file_loader, PacFixture};
pub use pacproxy_server::TestPacproxyServer;
pub use socks_server::Socks5Server;
