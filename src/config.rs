use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::adapters::{ResolverOptions, TransportOptions};
use crate::domain::{DispatchOptions, ProxyError, Result};

const APP_NAME: &str = "pacproxy";

/// Settings read from the `pacproxy` config file. Every field is optional
/// in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// PAC script location (`file:`, `http(s):`, `ftp:`, `data:`, optionally `pac+` prefixed).
    pub pac_url: Option<String>,
    pub bind: String,
    pub fallback_to_direct: bool,
    pub attempt_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub host_call_timeout_ms: u64,
    pub dns_timeout_ms: u64,
    pub source_label: Option<String>,
    pub accept_invalid_certs: bool,
    pub proxy_headers: BTreeMap<String, String>,
    pub loop_iteration_limit: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pac_url: None,
            bind: "127.0.0.1:8889".to_string(),
            fallback_to_direct: false,
            attempt_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            host_call_timeout_ms: 5_000,
            dns_timeout_ms: 3_000,
            source_label: None,
            accept_invalid_certs: false,
            proxy_headers: BTreeMap::new(),
            loop_iteration_limit: 1_000_000,
        }
    }
}

impl AppConfig {
    /// Loads `path`, or the per-user `pacproxy` config when no path is given.
    /// A missing file yields (and writes) the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let loaded = match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, None),
        };
        loaded.map_err(|e| ProxyError::Config(format!("Failed to load configuration: {}", e)))
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            fallback_to_direct: self.fallback_to_direct,
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            source_label: self.source_label.clone(),
            host_call_timeout: Duration::from_millis(self.host_call_timeout_ms),
            dns_timeout: Duration::from_millis(self.dns_timeout_ms),
            loop_iteration_limit: self.loop_iteration_limit,
            ..Default::default()
        }
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            proxy_headers: self
                .proxy_headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            accept_invalid_certs: self.accept_invalid_certs,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}
