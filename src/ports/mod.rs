pub mod fetcher;
pub mod observer;
pub mod resolver;
pub mod transport;

pub use fetcher::UriFetcherPort;
pub use observer::AttemptObserver;
pub use resolver::{FindProxyPort, ResolverFactoryPort};
pub use transport::{SocksVersion, TransportPort};
