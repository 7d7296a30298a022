use reqwest::header::{HeaderMap, CACHE_CONTROL, ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{redirect, Client, StatusCode};
use std::time::{Duration, SystemTime};
use url::Url;

use crate::domain::models::TokenState;
use crate::domain::{CacheToken, FetchedSource, ProxyError, Result};

const MAX_REDIRECTS: usize = 5;

/// `http:` and `https:` fetcher with freshness and conditional requests.
///
/// Never goes through a proxy itself: the PAC file is what decides the proxy.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(accept_invalid_certs: bool) -> Result<Self> {
        let client = Client::builder()
            .no_proxy()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| ProxyError::Fetch(format!("HTTP client error: {}", e)))?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, uri: &Url, cache: Option<&CacheToken>) -> Result<FetchedSource> {
        let previous = match cache {
            Some(CacheToken(TokenState::Http {
                href,
                etag,
                last_modified,
                fresh_until,
            })) if href.as_str() == uri.as_str() => Some((etag, last_modified, *fresh_until)),
            _ => None,
        };

        let mut request = self.client.get(uri.as_str());
        if let Some((etag, last_modified, fresh)) = previous {
            if fresh.map(|t| SystemTime::now() < t).unwrap_or(false) {
                log::debug!("Cached response for {} is still fresh", uri);
                return Err(ProxyError::NotModified);
            }
            if let Some(last_modified) = last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
            }
            if let Some(etag) = etag {
                request = request.header(IF_NONE_MATCH, etag.as_str());
            }
        }

        log::debug!("GET {}", uri);
        let response = request
            .send()
            .await
            .map_err(|e| ProxyError::Fetch(format!("PAC download error: {}", e)))?;

        let status = response.status();
        match status {
            StatusCode::NOT_MODIFIED => return Err(ProxyError::NotModified),
            StatusCode::NOT_FOUND => return Err(ProxyError::NotFound(uri.to_string())),
            s if !s.is_success() => return Err(ProxyError::Fetch(format!("HTTP error {} for {}", s, uri))),
            _ => {}
        }

        let headers = response.headers();
        let token = CacheToken(TokenState::Http {
            href: uri.to_string(),
            etag: header_string(headers, ETAG),
            last_modified: header_string(headers, LAST_MODIFIED),
            fresh_until: fresh_until(headers, SystemTime::now()),
        });

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProxyError::Fetch(format!("PAC read error: {}", e)))?;

        Ok(FetchedSource {
            bytes: bytes.to_vec(),
            token,
        })
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Until when a response may be reused without asking the server again.
/// `Cache-Control` wins over `Expires`.
fn fresh_until(headers: &HeaderMap, received: SystemTime) -> Option<SystemTime> {
    if let Some(cache_control) = header_string(headers, CACHE_CONTROL) {
        for directive in cache_control.split(',').map(str::trim) {
            let (name, value) = directive.split_once('=').unwrap_or((directive, ""));
            match name.to_ascii_lowercase().as_str() {
                "max-age" => {
                    let seconds = value.trim_matches('"').parse::<u64>().ok()?;
                    return Some(received + Duration::from_secs(seconds));
                }
                "no-cache" | "no-store" => return None,
                _ => {}
            }
        }
        return None;
    }

    let expires = header_string(headers, EXPIRES)?;
    let expires = chrono::DateTime::parse_from_rfc2822(&expires).ok()?;
    Some(SystemTime::from(expires))
}
