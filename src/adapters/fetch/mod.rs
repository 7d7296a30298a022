//! URI fetchers for PAC sources, one per scheme.

mod data;
mod file;
mod ftp;
mod http;

use async_trait::async_trait;
use url::Url;

use crate::domain::{CacheToken, FetchedSource, ProxyError, Result};
use crate::ports::UriFetcherPort;

pub use data::fetch_data;
pub use file::fetch_file;
pub use ftp::fetch_ftp;
pub use http::HttpFetcher;

/// Dispatches on the URI scheme: `data`, `file`, `ftp`, `http`, `https`.
pub struct SchemeFetcher {
    http: HttpFetcher,
}

impl SchemeFetcher {
    pub fn new(accept_invalid_certs: bool) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(accept_invalid_certs)?,
        })
    }
}

#[async_trait]
impl UriFetcherPort for SchemeFetcher {
    async fn fetch(&self, uri: &Url, cache: Option<&CacheToken>) -> Result<FetchedSource> {
        match uri.scheme() {
            "data" => fetch_data(uri, cache),
            "file" => fetch_file(uri, cache).await,
            "ftp" => fetch_ftp(uri, cache).await,
            "http" | "https" => self.http.fetch(uri, cache).await,
            other => Err(ProxyError::InvalidInput(format!(
                "Unsupported protocol \"{}\" specified in URI: \"{}\"",
                other, uri
            ))),
        }
    }
}
