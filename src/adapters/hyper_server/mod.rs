mod adapter;
mod server;

pub use adapter::HyperProxyAdapter;
pub use server::serve;
