use super::library::function_library;
use crate::adapters::sandbox::{self, SandboxFunction, SandboxOptions};
use crate::domain::{degenerate, AsyncName, HostValue, ProxyError, Result, SandboxBindings};
use crate::ports::{FindProxyPort, ResolverFactoryPort};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

const ENTRY: &str = "FindProxyForURL";

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Extra host functions; they win over library functions of the same name.
    pub sandbox_extensions: SandboxBindings,
    pub source_label: Option<String>,
    pub host_call_timeout: Duration,
    pub dns_timeout: Duration,
    pub loop_iteration_limit: u64,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        let sandbox = SandboxOptions::default();
        Self {
            sandbox_extensions: SandboxBindings::new(),
            source_label: None,
            host_call_timeout: sandbox.host_call_timeout,
            dns_timeout: Duration::from_secs(3),
            loop_iteration_limit: sandbox.loop_iteration_limit,
        }
    }
}

/// A compiled PAC script
pub struct PacResolver {
    function: SandboxFunction,
}

impl PacResolver {
    /// Evaluates `FindProxyForURL(url, host)`.
    pub async fn find_proxy_for(&self, url: &Url, host: Option<&str>) -> Result<HostValue> {
        let host = match host.or_else(|| url.host_str()) {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => {
                return Err(ProxyError::InvalidInput(format!(
                    "Could not determine `host` from URL \"{}\"",
                    url
                )))
            }
        };

        self.function
            .call(vec![HostValue::String(url.as_str().to_string()), HostValue::String(host)])
            .await
    }
}

#[async_trait]
impl FindProxyPort for PacResolver {
    async fn find_proxy(&self, url: &Url, host: Option<&str>) -> Result<HostValue> {
        self.find_proxy_for(url, host).await
    }

    fn source(&self) -> &str {
        self.function.source()
    }
}

/// Compiles PAC source bytes into a [`PacResolver`].
///
/// Every asynchronous host function seeds the async rewrite, so script
/// functions that reach one of them (directly or through other script
/// functions) are turned into `async` functions and their calls awaited.
pub async fn create_pac_resolver(source: &[u8], options: ResolverOptions) -> Result<PacResolver> {
    let defaults = SandboxOptions::default();
    let label = options.source_label.unwrap_or(defaults.source_label);

    let text = std::str::from_utf8(source)
        .map_err(|e| ProxyError::Parse(format!("{}: PAC file is not valid UTF-8: {}", label, e)))?;

    let mut bindings = function_library(options.dns_timeout);
    bindings.extend(options.sandbox_extensions);

    let seeds: Vec<AsyncName> = bindings
        .iter()
        .filter(|(_, f)| f.is_async())
        .map(|(name, _)| AsyncName::from(name.as_str()))
        .collect();
    let transformed = degenerate(text, &seeds).map_err(|e| match e {
        ProxyError::Parse(message) => ProxyError::Parse(format!("{}: {}", label, message)),
        other => other,
    })?;

    let sandbox_options = SandboxOptions {
        source_label: label,
        host_call_timeout: options.host_call_timeout,
        loop_iteration_limit: options.loop_iteration_limit,
        recursion_limit: defaults.recursion_limit,
    };

    let function = sandbox::compile(&transformed, ENTRY, bindings, sandbox_options).await?;
    Ok(PacResolver { function })
}

/// [`ResolverFactoryPort`] backed by [`create_pac_resolver`].
pub struct PacResolverFactory {
    options: ResolverOptions,
}

impl PacResolverFactory {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ResolverFactoryPort for PacResolverFactory {
    async fn create(&self, source: Vec<u8>, label: Option<String>) -> Result<Arc<dyn FindProxyPort>> {
        let mut options = self.options.clone();
        if label.is_some() {
            options.source_label = label;
        }
        let label = options.source_label.clone().unwrap_or_default();

        let resolver = create_pac_resolver(&source, options).await?;
        info!("Compiled PAC script {} ({} bytes)", label, source.len());
        Ok(Arc::new(resolver))
    }
}
