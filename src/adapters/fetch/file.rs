use std::io::ErrorKind;
use tokio::io::AsyncReadExt;
use url::Url;

use crate::domain::models::TokenState;
use crate::domain::{CacheToken, FetchedSource, ProxyError, Result};

/// Reads a `file:` URI. Not modified while the mtime stays the same.
pub async fn fetch_file(uri: &Url, cache: Option<&CacheToken>) -> Result<FetchedSource> {
    let path = uri
        .to_file_path()
        .map_err(|_| ProxyError::InvalidInput(format!("\"{}\" is not a local file path", uri)))?;

    let mut file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ProxyError::NotFound(uri.to_string())),
        Err(e) => return Err(e.into()),
    };

    let modified = file.metadata().await?.modified()?;
    if let Some(CacheToken(TokenState::Modified(previous))) = cache {
        if *previous == modified {
            log::debug!("{} unchanged since last fetch", path.display());
            return Err(ProxyError::NotModified);
        }
    }

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await?;
    Ok(FetchedSource {
        bytes,
        token: CacheToken(TokenState::Modified(modified)),
    })
}
