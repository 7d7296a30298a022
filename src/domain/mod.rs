pub mod connection;
pub mod degenerator;
pub mod directive;
pub mod errors;
pub mod loader;
pub mod models;
pub mod service;
pub mod values;

pub use connection::*;
pub use degenerator::{degenerate, AsyncName};
pub use directive::*;
pub use errors::*;
pub use loader::PacLoader;
pub use models::*;
pub use service::{normalize_result, DispatchOptions, ProxyDispatcher};
pub use values::*;
