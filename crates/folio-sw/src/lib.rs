//! # Folio Offline Cache Worker
//!
//! Offline caching for the portfolio site: a worker that precaches the site's
//! assets into a generation-named bucket, answers requests from that bucket
//! when it can, and drops older generations once it takes over.
//!
//! ## Lifecycle
//!
//! ```text
//! register(script) ──► install ──► (skip waiting) ──► activate ──► fetch interception
//!                        │                               │
//!                        └── precache manifest           ├── evict other generations
//!                            into bucket <generation>    └── claim open clients
//! ```
//!
//! ## Storage
//!
//! ```text
//! CacheStorage
//!     └── Cache <generation>
//!             └── RequestKey (method + URL) → CachedResponse
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use folio_net::{Response, ResponseType};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod cache;
pub mod clients;
pub mod container;
pub mod pull_through;
pub mod worker;

pub use backend::{CacheBackend, CacheFuture};
pub use cache::{Cache, CacheStorage, CachedResponse, RequestKey};
pub use clients::{Client, ClientType, Clients};
pub use container::{
    LifecycleReport, RegistrationOptions, ServiceWorkerContainer, ServiceWorkerEvent,
    ServiceWorkerRegistration,
};
pub use pull_through::{cacheability, Populate, PullThroughCache, SkipReason};
pub use worker::{
    ActivateOutcome, CacheWorkerConfig, EvictionFailure, InstallOutcome, OfflineCacheWorker,
    PrecacheFailure,
};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerError {
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Quota exceeded: {needed} bytes needed, {quota} byte quota")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Not found: {0}")]
    NotFound(String),
}

// ==================== Types ====================

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ServiceWorkerState {
    /// Created, not yet installing.
    #[default]
    Parsed = 0,
    /// Installing (precaching).
    Installing = 1,
    /// Installed but waiting for activation.
    Installed = 2,
    /// Activating (evicting old generations).
    Activating = 3,
    /// Active and intercepting fetches.
    Activated = 4,
    /// Superseded or unregistered.
    Redundant = 5,
}

impl ServiceWorkerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Installing,
            2 => Self::Installed,
            3 => Self::Activating,
            4 => Self::Activated,
            5 => Self::Redundant,
            _ => Self::Parsed,
        }
    }
}

// ==================== Fetch Response ====================

/// Response handed back to the page for an intercepted request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Final response URL.
    pub url: String,

    /// Status code.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers, in received order.
    pub headers: Vec<(String, String)>,

    /// Response body.
    pub body: Bytes,

    /// Tainting relative to the requesting page.
    pub response_type: ResponseType,

    /// Whether served from the cache bucket.
    pub from_cache: bool,
}

impl FetchResponse {
    /// Create a response from cache entry.
    pub fn from_cache(entry: &CachedResponse) -> Self {
        Self {
            url: entry.url.clone(),
            status: entry.status,
            status_text: status_text(entry.status),
            headers: entry.headers.clone(),
            body: Bytes::from(entry.body.clone()),
            response_type: entry.response_type,
            from_cache: true,
        }
    }

    /// Pass a network response through unmodified.
    pub fn from_network(response: Response) -> Self {
        let headers = cache::header_pairs(&response.headers);
        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            status_text: status_text(response.status.as_u16()),
            headers,
            response_type: response.response_type,
            from_cache: false,
            body: response.into_bytes(),
        }
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn status_text(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or_default()
        .to_string()
}
