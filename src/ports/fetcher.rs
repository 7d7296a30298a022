use crate::domain::{CacheToken, FetchedSource, Result};
use async_trait::async_trait;
use url::Url;

/// Port for loading PAC script bytes from a URI
#[async_trait]
pub trait UriFetcherPort: Send + Sync {
    /// Fetch the bytes behind `uri`.
    ///
    /// `cache` is the token from the previous successful fetch. An unchanged
    /// source yields `Err(ProxyError::NotModified)` and a missing one
    /// `Err(ProxyError::NotFound)`, never a generic fetch error.
    async fn fetch(&self, uri: &Url, cache: Option<&CacheToken>) -> Result<FetchedSource>;
}
