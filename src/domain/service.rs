use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;
use uuid::Uuid;

use super::{
    parse_directives, with_direct_fallback, AttemptOutcome, CandidateFailure, ConnectRequest, DispatchAttempt,
    HostValue, PacLoader, ProxyDirective, ProxyError, ProxySocket, Result,
};
use crate::ports::{AttemptObserver, SocksVersion, TransportPort};

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Append `DIRECT` when the script result does not contain it.
    pub fallback_to_direct: bool,
    /// Upper bound for one candidate connection attempt.
    pub attempt_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            fallback_to_direct: false,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Resolves a routing decision with the PAC script and walks the resulting
/// fallback chain until one candidate yields a socket.
#[derive(Clone)]
pub struct ProxyDispatcher {
    loader: PacLoader,
    transport: Arc<dyn TransportPort>,
    observers: Vec<Arc<dyn AttemptObserver>>,
    options: DispatchOptions,
}

impl ProxyDispatcher {
    pub fn new(loader: PacLoader, transport: Arc<dyn TransportPort>, options: DispatchOptions) -> Self {
        Self {
            loader,
            transport,
            observers: Vec::new(),
            options,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn loader(&self) -> &PacLoader {
        &self.loader
    }

    /// Raw value returned by `FindProxyForURL`.
    pub async fn evaluate(&self, url: &Url, host: Option<&str>) -> Result<HostValue> {
        let resolver = self.loader.resolve().await?;
        resolver.find_proxy(url, host).await
    }

    /// Ordered candidates for `request`, after normalization and the optional
    /// `DIRECT` fallback.
    pub async fn directives_for(&self, request: &ConnectRequest) -> Result<Vec<ProxyDirective>> {
        let url = request.url()?;
        let value = self.evaluate(&url, Some(request.host.as_str())).await?;
        let directives = parse_directives(&normalize_result(&value));
        Ok(with_direct_fallback(directives, self.options.fallback_to_direct))
    }

    pub async fn connect(&self, request: &ConnectRequest) -> Result<ProxySocket> {
        let dispatch_id = Uuid::new_v4();
        let directives = self.directives_for(request).await?;
        log::debug!(
            "Dispatch {} to {}: {} candidate(s)",
            dispatch_id,
            request.authority(),
            directives.len()
        );

        let mut attempted: Vec<ProxyDirective> = Vec::with_capacity(directives.len());
        let mut failures = Vec::new();

        for directive in directives {
            if attempted.contains(&directive) {
                continue;
            }
            attempted.push(directive.clone());

            let started = Instant::now();
            let result = match timeout(self.options.attempt_timeout, self.attempt(&directive, request)).await {
                Ok(result) => result,
                Err(_) => Err(ProxyError::Timeout),
            };

            match result {
                Ok(socket) => {
                    self.notify(dispatch_id, request, &directive, AttemptOutcome::Connected, started);
                    tracing::info!(
                        dispatch = %dispatch_id,
                        target = %request.authority(),
                        via = %directive,
                        "Connected"
                    );
                    return Ok(socket);
                }
                Err(e) => {
                    let reason = e.to_string();
                    log::debug!("Candidate {} for {} failed: {}", directive, request.authority(), reason);
                    self.notify(
                        dispatch_id,
                        request,
                        &directive,
                        AttemptOutcome::Failed(reason.clone()),
                        started,
                    );
                    failures.push(CandidateFailure {
                        directive: directive.to_string(),
                        reason,
                    });
                }
            }
        }

        Err(ProxyError::AllCandidatesFailed(failures))
    }

    async fn attempt(&self, directive: &ProxyDirective, request: &ConnectRequest) -> Result<ProxySocket> {
        match directive {
            ProxyDirective::Direct => self.transport.connect_direct(request).await,
            ProxyDirective::Proxy(target) | ProxyDirective::Http(target) => {
                self.transport.connect_via_http_proxy(target, false, request).await
            }
            ProxyDirective::Https(target) => self.transport.connect_via_http_proxy(target, true, request).await,
            ProxyDirective::Socks(target) | ProxyDirective::Socks5(target) => {
                self.transport.connect_via_socks(target, SocksVersion::V5, request).await
            }
            ProxyDirective::Socks4(target) => self.transport.connect_via_socks(target, SocksVersion::V4, request).await,
            ProxyDirective::Unknown(raw) => Err(ProxyError::CandidateConnect {
                directive: raw.clone(),
                reason: format!("Could not determine proxy type for: {}", raw),
            }),
        }
    }

    fn notify(
        &self,
        dispatch_id: Uuid,
        request: &ConnectRequest,
        directive: &ProxyDirective,
        outcome: AttemptOutcome,
        started: Instant,
    ) {
        if self.observers.is_empty() {
            return;
        }
        let attempt = DispatchAttempt {
            dispatch_id,
            target: request.authority(),
            directive: directive.clone(),
            outcome,
            elapsed: started.elapsed(),
        };
        for observer in &self.observers {
            observer.on_attempt(&attempt);
        }
    }
}

/// Falsy or blank results mean `DIRECT`; other values are stringified.
pub fn normalize_result(value: &HostValue) -> String {
    let raw = value.to_js_string();
    if !value.is_truthy() || raw.trim().is_empty() {
        "DIRECT".to_string()
    } else {
        raw
    }
}
