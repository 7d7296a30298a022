use tracing_subscriber::EnvFilter;

use crate::domain::{ProxyError, Result};

/// Filter used when `RUST_LOG` is not set.
pub fn default_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "pacproxy=info",
        1 => "pacproxy=debug",
        _ => "trace",
    }
}

/// Installs the global subscriber. `log` records are routed through it too.
pub fn init(verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(verbose)))
        .map_err(|e| ProxyError::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| ProxyError::Config(format!("Failed to install logger: {}", e)))
}
