pub mod fetch;
pub mod hyper_server;
pub mod pac_resolver;
pub mod sandbox;
pub mod tracking;
pub mod transport;

pub use fetch::SchemeFetcher;
pub use hyper_server::{serve, HyperProxyAdapter};
pub use pac_resolver::*;
pub use tracking::*;
pub use transport::{NetworkTransport, TransportOptions};
