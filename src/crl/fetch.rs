use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::SWEEP_INTERVAL;
use super::disk_cache::DiskCache;
use super::errors::FetchError;
use super::memory_cache::MemoryCache;
use super::model::RevocationList;
use crate::config::{CrlConfig, ValidatorConfig};

/// The result a CRL fetch delivers to every coalesced caller.
pub type FetchOutcome = Result<Arc<RevocationList>, FetchError>;

/// Cache policy of a single `get_crl` call, taken from the per-connection
/// validator configuration.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub in_memory_cache: bool,
    pub on_disk_cache: bool,
    pub download_timeout: Duration,
}

impl From<&ValidatorConfig> for FetchOptions {
    fn from(config: &ValidatorConfig) -> Self {
        Self {
            in_memory_cache: config.in_memory_cache,
            on_disk_cache: config.on_disk_cache,
            download_timeout: config.download_timeout(),
        }
    }
}

/// Transport used to download raw CRL bytes. Seam for tests and for callers
/// that bring their own HTTP stack.
#[async_trait]
pub trait CrlTransport: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// Default transport: plain HTTP(S) GET, body treated as DER regardless of
/// the declared content type.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crl-validator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CrlTransport for HttpTransport {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;
        Ok(body.to_vec())
    }
}

fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout.as_millis() as u64)
    } else {
        FetchError::Http(error.to_string())
    }
}

/// Cancellable handle of a periodic background task. The task runs once
/// immediately and then on every period; it is aborted on drop so a
/// discarded service cannot keep a runtime busy.
#[derive(Debug)]
pub(crate) struct Sweeper {
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub(crate) fn spawn<F, Fut>(name: &'static str, period: Duration, task: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                debug!(task = name, "running cache sweep");
                task().await;
            }
        });
        Self { handle }
    }

    pub(crate) fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Inner {
    memory: MemoryCache,
    disk: DiskCache,
    transport: Arc<dyn CrlTransport>,
    /// In-flight downloads keyed by URL; at most one per URL at a time.
    pending: Mutex<HashMap<String, broadcast::Sender<FetchOutcome>>>,
    sweepers: OnceLock<Vec<Sweeper>>,
}

/// Process-wide CRL store: two-tier cache plus a coalescing fetch
/// coordinator. Construct once per process; clones share all state.
#[derive(Clone)]
pub struct CrlCacheService {
    inner: Arc<Inner>,
}

impl CrlCacheService {
    pub fn new(config: &CrlConfig) -> Result<Self, FetchError> {
        let transport = Arc::new(HttpTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }

    /// Service over a caller-supplied transport.
    pub fn with_transport(config: &CrlConfig, transport: Arc<dyn CrlTransport>) -> Self {
        let validity = config.cache_validity();
        Self {
            inner: Arc::new(Inner {
                memory: MemoryCache::new(validity),
                disk: DiskCache::new(config.cache_dir(), validity),
                transport,
                pending: Mutex::new(HashMap::new()),
                sweepers: OnceLock::new(),
            }),
        }
    }

    /// Returns the decoded CRL for `url`, consulting the in-memory cache,
    /// then the disk cache, then the network. Concurrent calls for the same
    /// URL share a single download and receive the same outcome; caches are
    /// populated before the outcome is delivered to any waiter.
    pub async fn get_crl(&self, url: &str, options: FetchOptions) -> FetchOutcome {
        self.ensure_sweepers(&options);

        if let Some(rx) = self.subscribe_pending(url) {
            debug!(%url, "awaiting CRL fetch already in flight");
            return await_outcome(rx).await;
        }

        if options.in_memory_cache {
            if let Some(crl) = self.inner.memory.get(url) {
                debug!(%url, "returning CRL from in-memory cache");
                return Ok(crl);
            }
        }

        if options.on_disk_cache {
            if let Some(crl) = self.inner.disk.read(url).await {
                if options.in_memory_cache {
                    self.inner.memory.set(url, Arc::clone(&crl));
                }
                debug!(%url, "returning CRL from disk cache");
                return Ok(crl);
            }
        }

        let rx = self.start_or_join_fetch(url, options);
        await_outcome(rx).await
    }

    /// Stops the background sweepers. Dropping the last clone of the service
    /// has the same effect.
    pub fn stop_sweepers(&self) {
        if let Some(sweepers) = self.inner.sweepers.get() {
            for sweeper in sweepers {
                sweeper.stop();
            }
        }
    }

    /// The sweepers start on the first `get_crl` call, at most once per
    /// service, for the caches that first call has enabled.
    fn ensure_sweepers(&self, options: &FetchOptions) {
        self.inner.sweepers.get_or_init(|| {
            let mut sweepers = Vec::new();
            if options.in_memory_cache {
                debug!("starting in-memory CRL cache sweeper");
                let memory = self.inner.memory.clone();
                sweepers.push(Sweeper::spawn("crl-memory-cache", SWEEP_INTERVAL, move || {
                    let memory = memory.clone();
                    async move { memory.sweep() }
                }));
            }
            if options.on_disk_cache {
                debug!("starting on-disk CRL cache sweeper");
                let disk = self.inner.disk.clone();
                sweepers.push(Sweeper::spawn("crl-disk-cache", SWEEP_INTERVAL, move || {
                    let disk = disk.clone();
                    async move { disk.sweep().await }
                }));
            }
            sweepers
        });
    }

    fn subscribe_pending(&self, url: &str) -> Option<broadcast::Receiver<FetchOutcome>> {
        let pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.get(url).map(|tx| tx.subscribe())
    }

    /// Registers this URL as in flight and spawns the download, or joins a
    /// fetch another caller registered since the cache lookups.
    fn start_or_join_fetch(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> broadcast::Receiver<FetchOutcome> {
        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match pending.entry(url.to_string()) {
            Entry::Occupied(entry) => entry.get().subscribe(),
            Entry::Vacant(slot) => {
                let (tx, rx) = broadcast::channel(1);
                slot.insert(tx.clone());

                // The download runs detached so a caller that gives up
                // cannot strand the other waiters mid-flight
                let inner = Arc::clone(&self.inner);
                let url = url.to_string();
                tokio::spawn(async move {
                    let outcome = download(&inner, &url, options).await;
                    inner
                        .pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&url);
                    let _ = tx.send(outcome);
                });
                rx
            }
        }
    }
}

async fn await_outcome(mut rx: broadcast::Receiver<FetchOutcome>) -> FetchOutcome {
    match rx.recv().await {
        Ok(outcome) => outcome,
        Err(_) => Err(FetchError::Canceled),
    }
}

async fn download(inner: &Inner, url: &str, options: FetchOptions) -> FetchOutcome {
    debug!(%url, "downloading CRL");
    let raw = inner.transport.fetch(url, options.download_timeout).await?;

    debug!(%url, bytes = raw.len(), "decoding CRL");
    let crl = RevocationList::from_der(&raw)
        .map_err(|e| FetchError::Decode(e.to_string()))
        .inspect_err(|error| warn!(%url, %error, "downloaded CRL is not valid DER"))?;
    let crl = Arc::new(crl);

    if options.in_memory_cache {
        debug!(%url, "saving CRL to in-memory cache");
        inner.memory.set(url, Arc::clone(&crl));
    }
    if options.on_disk_cache {
        debug!(%url, "saving CRL to disk cache");
        inner.disk.write(url, &raw).await;
    }

    Ok(crl)
}
