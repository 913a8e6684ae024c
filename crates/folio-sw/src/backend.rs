//! Storage seam used by the worker.
//!
//! The worker and the pull-through cache only see [`CacheBackend`], so the
//! in-memory [`CacheStorage`] can be swapped for another store.

use futures::future::BoxFuture;

use crate::cache::{CacheStorage, CachedResponse, RequestKey};
use crate::ServiceWorkerError;

/// Boxed future returned by backend operations.
pub type CacheFuture<'a, T> = BoxFuture<'a, Result<T, ServiceWorkerError>>;

/// Named buckets of request/response pairs.
pub trait CacheBackend: Send + Sync {
    /// Create the bucket if it does not exist.
    fn open<'a>(&'a self, bucket: &'a str) -> CacheFuture<'a, ()>;

    /// Names of every bucket.
    fn keys(&self) -> CacheFuture<'_, Vec<String>>;

    /// Remove a bucket, reporting whether it existed.
    fn delete<'a>(&'a self, bucket: &'a str) -> CacheFuture<'a, bool>;

    fn lookup<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a RequestKey,
    ) -> CacheFuture<'a, Option<CachedResponse>>;

    fn store<'a>(
        &'a self,
        bucket: &'a str,
        key: RequestKey,
        entry: CachedResponse,
    ) -> CacheFuture<'a, ()>;

    /// Store every entry or none of them.
    fn store_all<'a>(
        &'a self,
        bucket: &'a str,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> CacheFuture<'a, ()>;
}

impl CacheBackend for CacheStorage {
    fn open<'a>(&'a self, bucket: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            CacheStorage::open(self, bucket).await;
            Ok(())
        })
    }

    fn keys(&self) -> CacheFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(CacheStorage::keys(self).await) })
    }

    fn delete<'a>(&'a self, bucket: &'a str) -> CacheFuture<'a, bool> {
        Box::pin(async move { Ok(CacheStorage::delete(self, bucket).await) })
    }

    fn lookup<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a RequestKey,
    ) -> CacheFuture<'a, Option<CachedResponse>> {
        Box::pin(async move { Ok(self.match_in(bucket, key).await) })
    }

    fn store<'a>(
        &'a self,
        bucket: &'a str,
        key: RequestKey,
        entry: CachedResponse,
    ) -> CacheFuture<'a, ()> {
        Box::pin(self.put(bucket, key, entry))
    }

    fn store_all<'a>(
        &'a self,
        bucket: &'a str,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> CacheFuture<'a, ()> {
        Box::pin(self.put_all(bucket, entries))
    }
}
