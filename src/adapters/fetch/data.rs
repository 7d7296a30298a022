use base64::Engine;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::domain::models::TokenState;
use crate::domain::{CacheToken, FetchedSource, ProxyError, Result, SourceHash};

/// Reads a `data:` URI. The token is a digest of the whole URI, so the same
/// URI presented twice is not modified.
pub fn fetch_data(uri: &Url, cache: Option<&CacheToken>) -> Result<FetchedSource> {
    let digest = SourceHash::of(uri.as_str().as_bytes()).as_str().to_string();
    if let Some(CacheToken(TokenState::Digest(previous))) = cache {
        if *previous == digest {
            log::debug!("data: URI digest {} unchanged", digest);
            return Err(ProxyError::NotModified);
        }
    }

    let bytes = decode(uri)?;
    Ok(FetchedSource {
        bytes,
        token: CacheToken(TokenState::Digest(digest)),
    })
}

fn decode(uri: &Url) -> Result<Vec<u8>> {
    let rest = &uri.as_str()["data:".len()..];
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ProxyError::InvalidInput(format!("Malformed data: URI \"{}\"", uri)))?;

    let payload: Vec<u8> = percent_decode_str(payload).collect();
    if meta.split(';').any(|param| param.eq_ignore_ascii_case("base64")) {
        let compact: Vec<u8> = payload.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| ProxyError::InvalidInput(format!("Invalid base64 in data: URI: {}", e)))
    } else {
        Ok(payload)
    }
}
