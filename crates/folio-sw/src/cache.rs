//! Cache buckets and the storage that owns them.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use folio_net::{Request, Response, ResponseType};
use hashbrown::HashMap;
use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use crate::ServiceWorkerError;

// ==================== Keys and Entries ====================

/// Request identity used as cache key: method and URL, matched exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        Self {
            method: method.as_str().to_string(),
            url: url.as_str().to_string(),
        }
    }

    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }

    pub fn from_request(request: &Request) -> Self {
        Self::new(&request.method, &request.url)
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET.as_str()
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A stored response, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Final response URL.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers, in received order.
    pub headers: Vec<(String, String)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Tainting at the time it was stored.
    pub response_type: ResponseType,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CachedResponse {
    pub fn from_response(response: &Response) -> Self {
        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            headers: header_pairs(&response.headers),
            body: response.body().to_vec(),
            response_type: response.response_type,
            cached_at: now_millis(),
        }
    }

    /// Approximate bytes this entry occupies.
    pub fn size(&self) -> usize {
        self.url.len()
            + self.body.len()
            + self
                .headers
                .iter()
                .map(|(n, v)| n.len() + v.len())
                .sum::<usize>()
    }
}

pub(crate) fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ==================== Cache ====================

/// A single named bucket.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    /// Cache name (the generation identifier).
    pub name: String,

    entries: HashMap<RequestKey, CachedResponse>,
}

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, key: &RequestKey) -> Option<&CachedResponse> {
        self.entries.get(key)
    }

    /// Store an entry, returning the one it replaced.
    pub fn put(&mut self, key: RequestKey, entry: CachedResponse) -> Option<CachedResponse> {
        self.entries.insert(key, entry)
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<&RequestKey> {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate bytes held by this bucket.
    pub fn size(&self) -> usize {
        self.entries.values().map(CachedResponse::size).sum()
    }
}

// ==================== Cache Storage ====================

#[derive(Debug, Default)]
struct StorageState {
    caches: HashMap<String, Cache>,
    quota: Option<usize>,
}

impl StorageState {
    fn usage(&self) -> usize {
        self.caches.values().map(Cache::size).sum()
    }

    /// Reject a write that would push usage past the quota.
    fn check_quota(&self, name: &str, entries: &[(RequestKey, CachedResponse)]) -> Result<(), ServiceWorkerError> {
        let Some(quota) = self.quota else {
            return Ok(());
        };

        let replaced: usize = self
            .caches
            .get(name)
            .map(|cache| {
                entries
                    .iter()
                    .filter_map(|(key, _)| cache.match_request(key))
                    .map(CachedResponse::size)
                    .sum()
            })
            .unwrap_or_default();
        let added: usize = entries.iter().map(|(_, entry)| entry.size()).sum();
        let needed = (self.usage() + added).saturating_sub(replaced);

        if needed > quota {
            return Err(ServiceWorkerError::QuotaExceeded { needed, quota });
        }
        Ok(())
    }
}

/// All buckets of one storage domain.
///
/// Cloning yields another handle to the same buckets. Every method is a
/// single atomic operation; there are no multi-call transactions.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    inner: Arc<RwLock<StorageState>>,
}

#[derive(Serialize, Deserialize)]
struct StorageSnapshot {
    caches: Vec<CacheSnapshot>,
}

#[derive(Serialize, Deserialize)]
struct CacheSnapshot {
    name: String,
    entries: Vec<(RequestKey, CachedResponse)>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that refuses writes beyond `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StorageState {
                caches: HashMap::new(),
                quota: Some(bytes),
            })),
        }
    }

    /// Open a cache, creating it if it doesn't exist.
    pub async fn open(&self, name: &str) {
        let mut state = self.inner.write().await;
        if !state.caches.contains_key(name) {
            debug!(cache = name, "Creating cache");
            state.caches.insert(name.to_string(), Cache::new(name));
        }
    }

    /// Check if cache exists.
    pub async fn has(&self, name: &str) -> bool {
        self.inner.read().await.caches.contains_key(name)
    }

    /// Delete a cache.
    pub async fn delete(&self, name: &str) -> bool {
        self.inner.write().await.caches.remove(name).is_some()
    }

    /// All cache names, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.caches.keys().cloned().collect();
        names.sort();
        names
    }

    /// Match a request inside one cache.
    pub async fn match_in(&self, name: &str, key: &RequestKey) -> Option<CachedResponse> {
        let state = self.inner.read().await;
        let entry = state.caches.get(name)?.match_request(key).cloned();
        trace!(cache = name, key = %key, hit = entry.is_some(), "Cache match");
        entry
    }

    /// Keys stored in one cache.
    pub async fn entry_keys(&self, name: &str) -> Vec<RequestKey> {
        self.inner
            .read()
            .await
            .caches
            .get(name)
            .map(|cache| cache.keys().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Store one entry, creating the cache if needed.
    pub async fn put(
        &self,
        name: &str,
        key: RequestKey,
        entry: CachedResponse,
    ) -> Result<(), ServiceWorkerError> {
        self.put_all(name, vec![(key, entry)]).await
    }

    /// Store several entries at once: either all are written or none.
    pub async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), ServiceWorkerError> {
        if let Some((key, _)) = entries.iter().find(|(key, _)| !key.is_get()) {
            return Err(ServiceWorkerError::CacheError(format!(
                "only GET requests can be cached, got {key}"
            )));
        }

        let mut state = self.inner.write().await;
        state.check_quota(name, &entries)?;

        let cache = state
            .caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        for (key, entry) in entries {
            trace!(cache = name, key = %key, "Cache put");
            cache.put(key, entry);
        }
        Ok(())
    }

    /// Approximate bytes held across all caches.
    pub async fn usage(&self) -> usize {
        self.inner.read().await.usage()
    }

    /// Write every cache to a JSON file.
    pub async fn persist(&self, path: impl AsRef<Path>) -> Result<(), ServiceWorkerError> {
        let snapshot = {
            let state = self.inner.read().await;
            let mut caches: Vec<CacheSnapshot> = state
                .caches
                .values()
                .map(|cache| CacheSnapshot {
                    name: cache.name.clone(),
                    entries: cache
                        .entries
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                })
                .collect();
            caches.sort_by(|a, b| a.name.cmp(&b.name));
            StorageSnapshot { caches }
        };

        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| ServiceWorkerError::CacheError(e.to_string()))?;
        tokio::fs::write(path.as_ref(), json)
            .await
            .map_err(|e| ServiceWorkerError::CacheError(e.to_string()))?;

        debug!(path = %path.as_ref().display(), caches = snapshot.caches.len(), "Cache storage persisted");
        Ok(())
    }

    /// Restore caches from a file written by [`CacheStorage::persist`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ServiceWorkerError> {
        let json = tokio::fs::read(path.as_ref())
            .await
            .map_err(|e| ServiceWorkerError::CacheError(e.to_string()))?;
        let snapshot: StorageSnapshot = serde_json::from_slice(&json)
            .map_err(|e| ServiceWorkerError::CacheError(e.to_string()))?;

        let mut caches = HashMap::new();
        for snap in snapshot.caches {
            let mut cache = Cache::new(&snap.name);
            for (key, entry) in snap.entries {
                cache.put(key, entry);
            }
            caches.insert(snap.name, cache);
        }

        debug!(path = %path.as_ref().display(), caches = caches.len(), "Cache storage loaded");
        Ok(Self {
            inner: Arc::new(RwLock::new(StorageState {
                caches,
                quota: None,
            })),
        })
    }
}
