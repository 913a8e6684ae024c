//! Pages a worker can control.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tracing::debug;
use url::Url;

use crate::{ServiceWorkerError, ServiceWorkerId};

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
}

/// A client (open page).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Worker currently routing this client's requests.
    pub controller: Option<ServiceWorkerId>,
}

impl Client {
    pub fn is_controlled(&self) -> bool {
        self.controller.is_some()
    }
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// All clients, optionally only those controlled by `worker`.
    pub fn match_all(&self, worker: Option<ServiceWorkerId>) -> Vec<&Client> {
        let mut clients: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| worker.is_none() || c.controller == worker)
            .collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));
        clients
    }

    /// Open a window client, uncontrolled.
    pub fn open_window(&mut self, url: &str) -> Result<Client, ServiceWorkerError> {
        let url = Url::parse(url).map_err(|e| ServiceWorkerError::NotFound(e.to_string()))?;

        let client = Client {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            controller: None,
        };

        self.clients.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    /// Set the controller of one client.
    pub fn set_controller(&mut self, id: &str, worker: ServiceWorkerId) -> bool {
        match self.clients.get_mut(id) {
            Some(client) => {
                client.controller = Some(worker);
                true
            }
            None => false,
        }
    }

    /// Take control of every client within `scope`.
    ///
    /// Returns the IDs whose controller changed.
    pub fn claim(&mut self, worker: ServiceWorkerId, scope: &Url) -> Vec<String> {
        let mut claimed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.url.as_str().starts_with(scope.as_str()))
            .filter(|c| c.controller != Some(worker))
            .map(|c| {
                c.controller = Some(worker);
                c.id.clone()
            })
            .collect();
        claimed.sort();

        debug!(worker = worker.raw(), scope = %scope, claimed = claimed.len(), "Clients claimed");
        claimed
    }

    /// Drop control by `worker` from every client.
    pub fn release(&mut self, worker: ServiceWorkerId) {
        for client in self.clients.values_mut() {
            if client.controller == Some(worker) {
                client.controller = None;
            }
        }
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{:04}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
