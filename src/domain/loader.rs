use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

use super::{CacheToken, ProxyError, Result, SourceHash};
use crate::ports::{FindProxyPort, ResolverFactoryPort, UriFetcherPort};

type PendingResolve = Shared<BoxFuture<'static, Result<Arc<dyn FindProxyPort>>>>;

/// Fetches a PAC script and keeps the resolver compiled from it.
///
/// A resolver is recompiled only when the fetched bytes hash differently from
/// the ones it was built from. Concurrent callers share one in-flight load.
#[derive(Clone)]
pub struct PacLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    uri: Url,
    label: String,
    fetcher: Arc<dyn UriFetcherPort>,
    factory: Arc<dyn ResolverFactoryPort>,
    state: Mutex<LoaderState>,
    compile_count: AtomicUsize,
}

#[derive(Default)]
struct LoaderState {
    current: Option<CompiledResolver>,
    in_flight: Option<(u64, PendingResolve)>,
    generation: u64,
}

struct CompiledResolver {
    resolver: Arc<dyn FindProxyPort>,
    hash: SourceHash,
    token: CacheToken,
}

impl PacLoader {
    /// `uri` may carry a `pac+` prefix (`pac+https://...`). The source label
    /// defaults to the URI itself.
    pub fn new(
        uri: &str,
        fetcher: Arc<dyn UriFetcherPort>,
        factory: Arc<dyn ResolverFactoryPort>,
        label: Option<String>,
    ) -> Result<Self> {
        let raw = uri.strip_prefix("pac+").unwrap_or(uri);
        let uri = Url::parse(raw).map_err(|e| ProxyError::InvalidInput(format!("Invalid PAC URI {}: {}", raw, e)))?;
        let label = label.unwrap_or_else(|| uri.to_string());

        Ok(Self {
            inner: Arc::new(LoaderInner {
                uri,
                label,
                fetcher,
                factory,
                state: Mutex::new(LoaderState::default()),
                compile_count: AtomicUsize::new(0),
            }),
        })
    }

    pub fn uri(&self) -> &Url {
        &self.inner.uri
    }

    /// Number of times a resolver has been compiled.
    pub fn compile_count(&self) -> usize {
        self.inner.compile_count.load(Ordering::SeqCst)
    }

    /// The resolver currently on record, without fetching.
    pub async fn current(&self) -> Option<Arc<dyn FindProxyPort>> {
        let state = self.inner.state.lock().await;
        state.current.as_ref().map(|c| c.resolver.clone())
    }

    /// Returns an up to date resolver, refetching the source and recompiling
    /// when it changed.
    pub async fn resolve(&self) -> Result<Arc<dyn FindProxyPort>> {
        let (generation, pending) = {
            let mut state = self.inner.state.lock().await;
            match &state.in_flight {
                Some((generation, pending)) => (*generation, pending.clone()),
                None => {
                    state.generation += 1;
                    let generation = state.generation;
                    let inner = self.inner.clone();
                    let pending = async move { inner.load().await }.boxed().shared();
                    state.in_flight = Some((generation, pending.clone()));
                    (generation, pending)
                }
            }
        };

        let result = pending.await;

        let mut state = self.inner.state.lock().await;
        if matches!(&state.in_flight, Some((current, _)) if *current == generation) {
            state.in_flight = None;
        }

        result
    }
}

impl LoaderInner {
    async fn load(self: Arc<Self>) -> Result<Arc<dyn FindProxyPort>> {
        let previous = {
            let state = self.state.lock().await;
            state
                .current
                .as_ref()
                .map(|c| (c.resolver.clone(), c.hash.clone(), c.token.clone()))
        };

        let fetched = match self.fetcher.fetch(&self.uri, previous.as_ref().map(|p| &p.2)).await {
            Ok(fetched) => fetched,
            Err(ProxyError::NotModified) => {
                return match previous {
                    Some((resolver, _, _)) => {
                        log::debug!("PAC source {} not modified, reusing resolver", self.uri);
                        Ok(resolver)
                    }
                    None => Err(ProxyError::NotModified),
                };
            }
            Err(e) => return Err(e),
        };

        let hash = SourceHash::of(&fetched.bytes);
        if let Some((resolver, previous_hash, _)) = previous {
            if previous_hash == hash {
                log::debug!("PAC source {} unchanged ({}), reusing resolver", self.uri, hash);
                let mut state = self.state.lock().await;
                if let Some(current) = state.current.as_mut() {
                    current.token = fetched.token;
                }
                return Ok(resolver);
            }
        }

        self.compile_count.fetch_add(1, Ordering::SeqCst);
        let resolver = self.factory.create(fetched.bytes, Some(self.label.clone())).await?;
        tracing::info!(uri = %self.uri, hash = %hash, "Compiled PAC resolver");

        let replaced = {
            let mut state = self.state.lock().await;
            state.current.replace(CompiledResolver {
                resolver: resolver.clone(),
                hash,
                token: fetched.token,
            })
        };
        // The previous sandbox is released only once the new one is on record.
        drop(replaced);

        Ok(resolver)
    }
}
