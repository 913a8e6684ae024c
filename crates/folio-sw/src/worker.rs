//! The offline cache worker: install, fetch interception, activation.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use folio_net::{Fetch, Request};
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use url::Url;

use crate::backend::CacheBackend;
use crate::cache::{CacheStorage, CachedResponse, RequestKey};
use crate::clients::Clients;
use crate::pull_through::{Populate, PullThroughCache};
use crate::{FetchResponse, ServiceWorkerError, ServiceWorkerId, ServiceWorkerState};

// ==================== Configuration ====================

/// What one deployed generation of the worker caches.
#[derive(Debug, Clone)]
pub struct CacheWorkerConfig {
    /// Cache generation identifier; names the only bucket kept on activation.
    pub generation: String,

    /// Root-relative paths or absolute URLs to precache.
    pub precache: Vec<String>,

    /// Origin the worker serves.
    pub origin: Url,
}

impl CacheWorkerConfig {
    pub fn new(generation: impl Into<String>, origin: Url) -> Self {
        Self {
            generation: generation.into(),
            precache: Vec::new(),
            origin,
        }
    }

    pub fn with_precache<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = entries.into_iter().map(Into::into).collect();
        self
    }
}

// ==================== Outcomes ====================

/// One manifest entry that could not be precached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheFailure {
    pub url: String,
    pub reason: String,
}

/// Result of the install phase. Install itself never fails.
#[derive(Debug, Clone, Default)]
pub struct InstallOutcome {
    /// URLs stored in the bucket.
    pub cached: Vec<String>,

    /// Entries that failed; when non-empty nothing was stored.
    pub failed: Vec<PrecacheFailure>,

    /// Whether the worker asks to activate without waiting.
    pub skip_waiting: bool,
}

impl InstallOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A bucket that could not be evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionFailure {
    pub bucket: String,
    pub reason: String,
}

/// Result of the activate phase.
#[derive(Debug, Clone, Default)]
pub struct ActivateOutcome {
    /// Buckets deleted.
    pub evicted: Vec<String>,

    /// Buckets whose deletion failed; retried on the next activation.
    pub failed: Vec<EvictionFailure>,

    /// Client IDs now controlled by this worker.
    pub claimed: Vec<String>,
}

// ==================== Worker ====================

/// One generation of the offline cache worker.
pub struct OfflineCacheWorker {
    id: ServiceWorkerId,
    script_url: Url,
    scope: Url,
    config: CacheWorkerConfig,
    state: AtomicU8,
    backend: Arc<dyn CacheBackend>,
    fetcher: Arc<dyn Fetch>,
    clients: Arc<RwLock<Clients>>,
}

impl std::fmt::Debug for OfflineCacheWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineCacheWorker")
            .field("id", &self.id)
            .field("script_url", &self.script_url.as_str())
            .field("generation", &self.config.generation)
            .field("state", &self.state())
            .finish()
    }
}

impl OfflineCacheWorker {
    /// Create a worker with its own storage and client list.
    ///
    /// The script defaults to `/sw.js` and the scope to `/` on the origin.
    pub fn new(config: CacheWorkerConfig, fetcher: Arc<dyn Fetch>) -> Self {
        let scope = config.origin.join("/").unwrap_or_else(|_| config.origin.clone());
        let script_url = scope.join("sw.js").unwrap_or_else(|_| scope.clone());

        Self {
            id: ServiceWorkerId::new(),
            script_url,
            scope,
            config,
            state: AtomicU8::new(ServiceWorkerState::Parsed as u8),
            backend: Arc::new(CacheStorage::new()),
            fetcher,
            clients: Arc::new(RwLock::new(Clients::new())),
        }
    }

    /// Use a shared storage backend.
    pub fn with_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Use a shared client list.
    pub fn with_clients(mut self, clients: Arc<RwLock<Clients>>) -> Self {
        self.clients = clients;
        self
    }

    /// Set the script URL and the scope it controls.
    pub fn with_script(mut self, script_url: Url, scope: Url) -> Self {
        self.script_url = script_url;
        self.scope = scope;
        self
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn script_url(&self) -> &Url {
        &self.script_url
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn generation(&self) -> &str {
        &self.config.generation
    }

    pub fn state(&self) -> ServiceWorkerState {
        ServiceWorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ServiceWorkerState) {
        debug!(worker = self.id.raw(), ?state, "Worker state change");
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.state() == ServiceWorkerState::Activated
    }

    pub fn is_redundant(&self) -> bool {
        self.state() == ServiceWorkerState::Redundant
    }

    fn cache(&self) -> PullThroughCache {
        PullThroughCache::new(
            self.config.generation.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.fetcher),
        )
    }

    // ==================== Install ====================

    /// Precache the manifest into this generation's bucket.
    ///
    /// Always completes. A failed precache is logged at debug level and the
    /// worker still asks to skip waiting, so activation is never held back.
    #[instrument(skip(self), fields(generation = %self.config.generation))]
    pub async fn install(&self) -> InstallOutcome {
        self.set_state(ServiceWorkerState::Installing);

        let mut outcome = InstallOutcome {
            skip_waiting: true,
            ..Default::default()
        };

        match self.precache().await {
            Ok(cached) => {
                debug!(entries = cached.len(), "Precache complete");
                outcome.cached = cached;
            }
            Err(failed) => {
                for failure in &failed {
                    debug!(url = %failure.url, reason = %failure.reason, "Cache install failed");
                }
                outcome.failed = failed;
            }
        }

        self.set_state(ServiceWorkerState::Installed);
        info!(
            cached = outcome.cached.len(),
            failed = outcome.failed.len(),
            "Worker installed"
        );
        outcome
    }

    async fn precache(&self) -> Result<Vec<String>, Vec<PrecacheFailure>> {
        let generation = self.config.generation.as_str();

        self.backend.open(generation).await.map_err(|e| {
            vec![PrecacheFailure {
                url: generation.to_string(),
                reason: e.to_string(),
            }]
        })?;
        debug!(cache = generation, "Opened cache");

        let mut failures = Vec::new();
        let mut urls = Vec::with_capacity(self.config.precache.len());
        for entry in &self.config.precache {
            match self.config.origin.join(entry) {
                Ok(url) => urls.push(url),
                Err(e) => failures.push(PrecacheFailure {
                    url: entry.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        let origin = self.config.origin.origin();
        let responses = join_all(urls.iter().map(|url| {
            let request = Request::get(url.clone()).from_origin(origin.clone());
            self.fetcher.fetch(request)
        }))
        .await;

        let mut entries = Vec::with_capacity(urls.len());
        for (url, result) in urls.iter().zip(responses) {
            match result {
                Ok(response) if response.ok() => {
                    entries.push((RequestKey::get(url), CachedResponse::from_response(&response)));
                }
                Ok(response) => failures.push(PrecacheFailure {
                    url: url.to_string(),
                    reason: format!("status {}", response.status.as_u16()),
                }),
                Err(e) => failures.push(PrecacheFailure {
                    url: url.to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        if !failures.is_empty() {
            return Err(failures);
        }

        let cached: Vec<String> = urls.iter().map(Url::to_string).collect();
        self.backend
            .store_all(generation, entries)
            .await
            .map_err(|e| {
                cached
                    .iter()
                    .map(|url| PrecacheFailure {
                        url: url.clone(),
                        reason: e.to_string(),
                    })
                    .collect::<Vec<_>>()
            })?;

        Ok(cached)
    }

    // ==================== Activate ====================

    /// Evict every other generation, then claim open clients.
    #[instrument(skip(self), fields(generation = %self.config.generation))]
    pub async fn activate(&self) -> ActivateOutcome {
        self.set_state(ServiceWorkerState::Activating);

        let mut outcome = ActivateOutcome::default();

        let names = match self.backend.keys().await {
            Ok(names) => names,
            Err(e) => {
                debug!(error = %e, "Listing caches failed");
                Vec::new()
            }
        };

        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| *name != self.config.generation)
            .collect();

        let results = join_all(stale.iter().map(|name| self.backend.delete(name))).await;
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(true) => {
                    debug!(cache = %name, "Evicted stale cache");
                    outcome.evicted.push(name);
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(cache = %name, error = %e, "Cache eviction failed");
                    outcome.failed.push(EvictionFailure {
                        bucket: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        outcome.claimed = self.clients.write().await.claim(self.id, &self.scope);

        self.set_state(ServiceWorkerState::Activated);
        info!(
            evicted = outcome.evicted.len(),
            claimed = outcome.claimed.len(),
            "Worker activated"
        );
        outcome
    }

    // ==================== Fetch ====================

    /// Intercept a request and expose the cache side effect.
    ///
    /// Requests without a requester origin are issued on behalf of the
    /// worker's own origin, so cross-origin responses are never `Basic`.
    pub async fn intercept(
        &self,
        request: Request,
    ) -> Result<(FetchResponse, Populate), ServiceWorkerError> {
        let request = if request.origin.is_some() {
            request
        } else {
            request.from_origin(self.config.origin.origin())
        };
        self.cache().get_or_fetch(request).await
    }

    /// Intercept a request; any store runs detached.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchResponse, ServiceWorkerError> {
        let (response, _populate) = self.intercept(request).await?;
        Ok(response)
    }
}
