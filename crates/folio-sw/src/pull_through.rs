//! Pull-through cache: answer from the bucket, otherwise fetch and populate.

use std::sync::Arc;

use folio_net::{Fetch, Request, Response, ResponseType};
use http::StatusCode;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::backend::CacheBackend;
use crate::cache::{CachedResponse, RequestKey};
use crate::{FetchResponse, ServiceWorkerError};

/// Why a network response was returned without being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Anything but 200.
    Status(u16),
    /// Cross-origin, opaque or error response.
    NotBasic(ResponseType),
}

/// The cache side effect of one [`PullThroughCache::get_or_fetch`] call.
#[derive(Debug)]
pub enum Populate {
    /// Served from the bucket, nothing to store.
    Hit,
    /// Fetched but not cacheable.
    Skipped(SkipReason),
    /// Store running detached from the response.
    Store(JoinHandle<Result<(), ServiceWorkerError>>),
}

impl Populate {
    pub fn is_store(&self) -> bool {
        matches!(self, Populate::Store(_))
    }

    /// Wait for the side effect, reporting whether an entry was written.
    ///
    /// Dropping a `Populate` instead leaves the store running.
    pub async fn settled(self) -> Result<bool, ServiceWorkerError> {
        match self {
            Populate::Hit | Populate::Skipped(_) => Ok(false),
            Populate::Store(handle) => match handle.await {
                Ok(result) => result.map(|()| true),
                Err(e) => Err(ServiceWorkerError::CacheError(e.to_string())),
            },
        }
    }
}

/// Decide whether a network response may be stored.
pub fn cacheability(response: &Response) -> Result<(), SkipReason> {
    if response.status != StatusCode::OK {
        return Err(SkipReason::Status(response.status.as_u16()));
    }
    if !response.response_type.is_basic() {
        return Err(SkipReason::NotBasic(response.response_type));
    }
    Ok(())
}

/// Cache-first lookup over one bucket, populated from the network on miss.
#[derive(Clone)]
pub struct PullThroughCache {
    bucket: String,
    backend: Arc<dyn CacheBackend>,
    fetcher: Arc<dyn Fetch>,
}

impl PullThroughCache {
    pub fn new(
        bucket: impl Into<String>,
        backend: Arc<dyn CacheBackend>,
        fetcher: Arc<dyn Fetch>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            backend,
            fetcher,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Return the cached response, or fetch it and schedule the store.
    ///
    /// The response is returned as soon as the network answers; the store
    /// runs on a detached task holding its own copy of the body. A failed
    /// lookup is treated as a miss. A network failure is returned as is.
    pub async fn get_or_fetch(
        &self,
        request: Request,
    ) -> Result<(FetchResponse, Populate), ServiceWorkerError> {
        let key = RequestKey::from_request(&request);

        match self.backend.lookup(&self.bucket, &key).await {
            Ok(Some(entry)) => {
                trace!(cache = %self.bucket, key = %key, "Cache hit");
                return Ok((FetchResponse::from_cache(&entry), Populate::Hit));
            }
            Ok(None) => trace!(cache = %self.bucket, key = %key, "Cache miss"),
            Err(e) => debug!(cache = %self.bucket, key = %key, error = %e, "Cache lookup failed"),
        }

        let response = self.fetcher.fetch(request).await.map_err(|e| {
            debug!(key = %key, error = %e, "Fetch failed");
            ServiceWorkerError::NetworkError(e.to_string())
        })?;

        let populate = match cacheability(&response) {
            Err(reason) => {
                trace!(key = %key, ?reason, "Response not cached");
                Populate::Skipped(reason)
            }
            Ok(()) => {
                let entry = CachedResponse::from_response(&response);
                let backend = Arc::clone(&self.backend);
                let bucket = self.bucket.clone();
                Populate::Store(tokio::spawn(async move {
                    let label = key.to_string();
                    let result = backend.store(&bucket, key, entry).await;
                    if let Err(ref e) = result {
                        debug!(cache = %bucket, key = %label, error = %e, "Cache store failed");
                    }
                    result
                }))
            }
        };

        Ok((FetchResponse::from_network(response), populate))
    }
}
