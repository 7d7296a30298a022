use crate::domain::{HostValue, Result};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// A compiled `FindProxyForURL` decision function
#[async_trait]
pub trait FindProxyPort: Send + Sync {
    /// Evaluate the script for `url`; `host` defaults to the URL hostname.
    ///
    /// Returns exactly what the script returned, falsy values included.
    async fn find_proxy(&self, url: &Url, host: Option<&str>) -> Result<HostValue>;

    /// The transformed source the resolver was compiled from.
    fn source(&self) -> &str;
}

/// Port for turning PAC script bytes into a decision function
#[async_trait]
pub trait ResolverFactoryPort: Send + Sync {
    async fn create(&self, source: Vec<u8>, label: Option<String>) -> Result<Arc<dyn FindProxyPort>>;
}
