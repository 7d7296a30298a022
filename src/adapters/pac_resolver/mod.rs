mod calendar;
mod dns;
mod hosts;
mod library;
mod resolver;

pub use library::function_library;
pub use resolver::{create_pac_resolver, PacResolver, PacResolverFactory, ResolverOptions};
