//! Registration and routing (`navigator.serviceWorker`).

use std::sync::Arc;

use folio_net::{Fetch, Request};
use hashbrown::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use url::Url;

use crate::cache::CacheStorage;
use crate::clients::{Client, Clients};
use crate::worker::{ActivateOutcome, CacheWorkerConfig, InstallOutcome, OfflineCacheWorker};
use crate::{FetchResponse, ServiceWorkerError, ServiceWorkerId, ServiceWorkerState};

// ==================== Registration ====================

/// Options for service worker registration.
#[derive(Debug, Clone, Default)]
pub struct RegistrationOptions {
    /// Scope URL; defaults to the script's directory.
    pub scope: Option<String>,

    /// Cache generation the script was deployed with.
    pub generation: String,

    /// Precache manifest the script was deployed with.
    pub precache: Vec<String>,
}

/// A service worker registration.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    /// Installing worker.
    pub installing: Option<Arc<OfflineCacheWorker>>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<Arc<OfflineCacheWorker>>,

    /// Active worker.
    pub active: Option<Arc<OfflineCacheWorker>>,
}

impl ServiceWorkerRegistration {
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Get the active worker.
    pub fn get_active(&self) -> Option<&Arc<OfflineCacheWorker>> {
        self.active.as_ref()
    }

    /// Start installing a new worker, superseding any installing one.
    pub fn update(&mut self, worker: Arc<OfflineCacheWorker>) {
        if let Some(old) = self.installing.replace(worker) {
            old.set_state(ServiceWorkerState::Redundant);
        }
    }

    /// Transition installing to waiting, if `id` is still the installing worker.
    pub fn install_complete(&mut self, id: ServiceWorkerId) -> bool {
        match self.installing.take() {
            Some(worker) if worker.id() == id => {
                if let Some(old) = self.waiting.replace(worker) {
                    old.set_state(ServiceWorkerState::Redundant);
                }
                true
            }
            other => {
                self.installing = other;
                false
            }
        }
    }

    /// Promote the waiting worker, retiring the previous active one.
    pub fn promote_waiting(&mut self) -> Option<Arc<OfflineCacheWorker>> {
        let worker = self.waiting.take()?;
        if let Some(old) = self.active.replace(Arc::clone(&worker)) {
            old.set_state(ServiceWorkerState::Redundant);
        }
        Some(worker)
    }

    /// Unregister (mark every worker redundant).
    pub fn unregister(&mut self) {
        for worker in [self.active.take(), self.waiting.take(), self.installing.take()]
            .into_iter()
            .flatten()
        {
            worker.set_state(ServiceWorkerState::Redundant);
        }
    }
}

// ==================== Events ====================

/// Service worker events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        registration_scope: String,
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A new worker started installing.
    UpdateFound { registration_scope: String },
    /// A client is now routed through a different worker.
    ControllerChange {
        client_id: String,
        worker_id: ServiceWorkerId,
    },
}

/// What one `register` call did.
#[derive(Debug, Clone)]
pub struct LifecycleReport {
    pub worker_id: ServiceWorkerId,
    pub scope: String,
    pub install: InstallOutcome,
    /// `None` when the worker was left waiting.
    pub activate: Option<ActivateOutcome>,
}

// ==================== Container ====================

/// Service worker container for one storage domain.
pub struct ServiceWorkerContainer {
    /// Registrations by scope.
    registrations: Arc<RwLock<HashMap<String, ServiceWorkerRegistration>>>,

    /// Cache storage.
    pub caches: CacheStorage,

    /// Clients.
    pub clients: Arc<RwLock<Clients>>,

    fetcher: Arc<dyn Fetch>,

    /// Event sender for state changes.
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorkerContainer {
    /// Create a new container with empty storage.
    pub fn new(fetcher: Arc<dyn Fetch>) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        Self::with_storage(fetcher, CacheStorage::new())
    }

    /// Create a container over existing storage.
    pub fn with_storage(
        fetcher: Arc<dyn Fetch>,
        caches: CacheStorage,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                registrations: Arc::new(RwLock::new(HashMap::new())),
                caches,
                clients: Arc::new(RwLock::new(Clients::new())),
                fetcher,
                event_tx,
            },
            event_rx,
        )
    }

    fn emit(&self, event: ServiceWorkerEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }

    /// Register a worker script and run it through install and activation.
    pub async fn register(
        &self,
        script_url: &str,
        options: RegistrationOptions,
    ) -> Result<LifecycleReport, ServiceWorkerError> {
        let script_url = Url::parse(script_url)
            .map_err(|e| ServiceWorkerError::RegistrationFailed(e.to_string()))?;
        let scope = resolve_scope(&script_url, options.scope.as_deref())?;
        let origin = script_url
            .join("/")
            .map_err(|e| ServiceWorkerError::RegistrationFailed(e.to_string()))?;

        if options.generation.trim().is_empty() {
            return Err(ServiceWorkerError::RegistrationFailed(
                "cache generation must not be empty".to_string(),
            ));
        }

        let config = CacheWorkerConfig::new(options.generation, origin)
            .with_precache(options.precache);
        let worker = Arc::new(
            OfflineCacheWorker::new(config, Arc::clone(&self.fetcher))
                .with_backend(Arc::new(self.caches.clone()))
                .with_clients(Arc::clone(&self.clients))
                .with_script(script_url, scope.clone()),
        );
        let scope_str = scope.to_string();
        let worker_id = worker.id();

        {
            let mut registrations = self.registrations.write().await;
            registrations
                .entry(scope_str.clone())
                .or_insert_with(|| ServiceWorkerRegistration::new(scope))
                .update(Arc::clone(&worker));
        }
        info!(scope = %scope_str, generation = worker.generation(), "Registering worker");
        self.emit(ServiceWorkerEvent::UpdateFound {
            registration_scope: scope_str.clone(),
        });

        let install = worker.install().await;

        let promoted = {
            let mut registrations = self.registrations.write().await;
            let registration = registrations
                .get_mut(&scope_str)
                .ok_or_else(|| ServiceWorkerError::NotFound(scope_str.clone()))?;
            if !registration.install_complete(worker_id) {
                debug!(worker = worker_id.raw(), "Superseded while installing");
                return Err(ServiceWorkerError::RegistrationFailed(
                    "superseded by a newer registration".to_string(),
                ));
            }
            install.skip_waiting && registration.promote_waiting().is_some()
        };
        self.emit(ServiceWorkerEvent::StateChange {
            registration_scope: scope_str.clone(),
            worker_id,
            new_state: ServiceWorkerState::Installed,
        });

        let activate = if promoted {
            let outcome = worker.activate().await;
            self.emit(ServiceWorkerEvent::StateChange {
                registration_scope: scope_str.clone(),
                worker_id,
                new_state: ServiceWorkerState::Activated,
            });
            for client_id in &outcome.claimed {
                self.emit(ServiceWorkerEvent::ControllerChange {
                    client_id: client_id.clone(),
                    worker_id,
                });
            }
            Some(outcome)
        } else {
            None
        };

        Ok(LifecycleReport {
            worker_id,
            scope: scope_str,
            install,
            activate,
        })
    }

    /// Get the registration scope covering a URL (longest match wins).
    pub async fn get_registration(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let registrations = self.registrations.read().await;

        registrations
            .keys()
            .filter(|scope| url.as_str().starts_with(scope.as_str()))
            .max_by_key(|scope| scope.len())
            .cloned()
    }

    /// Get all registration scopes.
    pub async fn get_registrations(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.registrations.read().await.keys().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Active worker whose scope covers `url`.
    pub async fn controller_for(&self, url: &Url) -> Option<Arc<OfflineCacheWorker>> {
        let scope = self.get_registration(url.as_str()).await?;
        let registrations = self.registrations.read().await;
        registrations.get(&scope)?.get_active().cloned()
    }

    /// Open a page; it is controlled right away when an active worker covers it.
    pub async fn open_client(&self, url: &str) -> Result<Client, ServiceWorkerError> {
        let mut client = self.clients.write().await.open_window(url)?;
        if let Some(worker) = self.controller_for(&client.url).await {
            self.clients.write().await.set_controller(&client.id, worker.id());
            client.controller = Some(worker.id());
        }
        Ok(client)
    }

    /// Route a request issued by the page at `client_url`.
    ///
    /// Requests from uncontrolled pages go straight to the network.
    pub async fn handle_fetch(
        &self,
        client_url: &Url,
        request: Request,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        let request = if request.origin.is_some() {
            request
        } else {
            request.from_origin(client_url.origin())
        };

        match self.controller_for(client_url).await {
            Some(worker) => worker.handle_fetch(request).await,
            None => {
                let response = self
                    .fetcher
                    .fetch(request)
                    .await
                    .map_err(|e| ServiceWorkerError::NetworkError(e.to_string()))?;
                Ok(FetchResponse::from_network(response))
            }
        }
    }

    /// Unregister a service worker.
    pub async fn unregister(&self, scope: &str) -> Result<bool, ServiceWorkerError> {
        let mut registrations = self.registrations.write().await;
        match registrations.remove(scope) {
            Some(mut registration) => {
                if let Some(ref active) = registration.active {
                    self.clients.write().await.release(active.id());
                }
                registration.unregister();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Scope defaults to the script's directory and may not reach above it.
fn resolve_scope(script_url: &Url, scope: Option<&str>) -> Result<Url, ServiceWorkerError> {
    let max_scope = script_url
        .join("./")
        .map_err(|e| ServiceWorkerError::RegistrationFailed(e.to_string()))?;

    let Some(scope) = scope else {
        return Ok(max_scope);
    };

    let scope = script_url
        .join(scope)
        .map_err(|e| ServiceWorkerError::RegistrationFailed(e.to_string()))?;

    if scope.origin() != script_url.origin() {
        return Err(ServiceWorkerError::SecurityError(format!(
            "scope {scope} is not same-origin with {script_url}"
        )));
    }
    if !scope.as_str().starts_with(max_scope.as_str()) {
        return Err(ServiceWorkerError::SecurityError(format!(
            "scope {scope} is outside the script directory {max_scope}"
        )));
    }
    Ok(scope)
}
