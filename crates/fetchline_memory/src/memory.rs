// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use fetchline_store::{CacheStore, CachedEnvelope, StoreFuture};
use futures::FutureExt;
use moka::future::Cache;

/// A concurrent in-memory [`CacheStore`].
///
/// Clones share the same underlying storage. The store is unbounded unless created with
/// [`with_capacity`](Self::with_capacity), in which case moka's `TinyLFU` policy picks what to
/// evict.
///
/// # Examples
///
/// ```
/// use fetchline_memory::MemoryStore;
/// use fetchline_store::{CacheStore, CachedEnvelope};
/// # futures::executor::block_on(async {
///
/// let store = MemoryStore::<u32>::new();
/// assert!(store.get("missing").await?.is_none());
///
/// store.set("n", CachedEnvelope::new(3, 100)).await?;
/// assert_eq!(store.get("n").await?.map(CachedEnvelope::into_data), Some(3));
/// # Ok::<(), fetchline_store::StoreError>(())
/// # });
/// ```
#[derive(Clone)]
pub struct MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Cache<String, CachedEnvelope<T>>,
}

impl<T> Debug for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

impl<T> Default for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
        }
    }

    /// Creates a store holding at most `max_capacity` entries.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Returns the approximate number of entries.
    ///
    /// The count is maintained lazily by moka and may lag behind recent writes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Returns `true` if the store holds no entries, with the same caveat as [`len`](Self::len).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) async fn insert(&self, key: &str, envelope: CachedEnvelope<T>) {
        self.inner.insert(key.to_owned(), envelope).await;
    }

    pub(crate) async fn lookup(&self, key: &str) -> Option<CachedEnvelope<T>> {
        self.inner.get(key).await
    }

    pub(crate) async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub(crate) fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

impl<T> CacheStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CachedEnvelope<T>>> {
        async move { Ok(self.lookup(key).await) }.boxed()
    }

    fn set<'a>(&'a self, key: &'a str, envelope: CachedEnvelope<T>) -> StoreFuture<'a, ()> {
        async move {
            self.insert(key, envelope).await;
            Ok(())
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        async move {
            self.invalidate(key).await;
            Ok(())
        }
        .boxed()
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        async move { Ok(self.inner.iter().map(|(key, _)| key.as_ref().clone()).collect()) }.boxed()
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        async move {
            self.invalidate_all();
            Ok(())
        }
        .boxed()
    }
}
