use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, SystemTime};
use url::Url;

use super::{ProxyDirective, ProxyError, Result};

/// How the stream handed back to the caller is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Wrap TLS to the destination before returning.
    Tls,
    /// Plain stream; an HTTP proxy may be used in forwarding mode.
    Plain,
    /// Raw bytes end to end; every proxy hop must tunnel.
    Tunnel,
}

/// What the caller wants to reach.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub path: String,
    pub mode: StreamMode,
}

impl ConnectRequest {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
            path: "/".to_string(),
            mode: if secure { StreamMode::Tls } else { StreamMode::Plain },
        }
    }

    /// Path plus optional query, as in the request line.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') { path } else { format!("/{}", path) };
        self
    }

    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| ProxyError::InvalidInput(format!("No host in {}", url)))?;
        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            scheme => return Err(ProxyError::InvalidInput(format!("Unsupported scheme: {}", scheme))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProxyError::InvalidInput(format!("No port in {}", url)))?;

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self::new(host.trim_start_matches('[').trim_end_matches(']'), port, secure).with_path(path))
    }

    pub fn default_port(&self) -> u16 {
        if self.secure {
            443
        } else {
            80
        }
    }

    /// `host:port` authority, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Normalized URL handed to `FindProxyForURL`; the port is left out when
    /// it is the scheme default.
    pub fn url(&self) -> Result<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let raw = if self.port == self.default_port() {
            format!("{}://{}{}", scheme, host, self.path)
        } else {
            format!("{}://{}:{}{}", scheme, host, self.port, self.path)
        };

        Url::parse(&raw).map_err(|e| ProxyError::InvalidInput(format!("Invalid request URL {}: {}", raw, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Connected,
    Failed(String),
}

/// One fallback candidate attempt, reported to observers.
#[derive(Debug, Clone)]
pub struct DispatchAttempt {
    pub dispatch_id: uuid::Uuid,
    pub target: String,
    pub directive: ProxyDirective,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

impl DispatchAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Connected
    }
}

/// Content hash of PAC script bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHash(String);

impl SourceHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token from the last successful fetch, handed back on the next
/// fetch so the source can answer "not modified".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheToken(pub(crate) TokenState);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenState {
    Digest(String),
    Modified(SystemTime),
    Http {
        href: String,
        etag: Option<String>,
        last_modified: Option<String>,
        fresh_until: Option<SystemTime>,
    },
    Ftp {
        href: String,
        modified: String,
    },
}

impl CacheToken {
    /// Token carrying a caller-chosen tag, for fetchers outside this crate.
    pub fn opaque(tag: impl Into<String>) -> Self {
        CacheToken(TokenState::Digest(tag.into()))
    }
}

/// Bytes of a fetched source plus the token to present next time.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub bytes: Vec<u8>,
    pub token: CacheToken,
}
