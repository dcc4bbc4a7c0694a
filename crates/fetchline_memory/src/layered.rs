// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use fetchline_store::{CacheStore, CachedEnvelope, StoreFuture};
use futures::FutureExt;

use crate::MemoryStore;

/// Keeps a [`MemoryStore`] in front of another [`CacheStore`].
///
/// - Reads are answered from memory when possible. A miss falls through to the wrapped store
///   and whatever it returns is promoted into memory.
/// - Writes and removals go to memory first, then to the wrapped store.
/// - Key listing is answered by the wrapped store, which is the source of truth.
///
/// # Examples
///
/// ```
/// use fetchline_memory::{LayeredStore, MemoryStore};
/// use fetchline_store::{CacheStore, CachedEnvelope};
/// # futures::executor::block_on(async {
///
/// let persistent = MemoryStore::<u32>::new();
/// persistent.set("warm", CachedEnvelope::new(9, 1)).await?;
///
/// let store = LayeredStore::new(persistent);
/// assert_eq!(store.get("warm").await?.map(CachedEnvelope::into_data), Some(9));
/// # Ok::<(), fetchline_store::StoreError>(())
/// # });
/// ```
pub struct LayeredStore<T, S>
where
    T: Clone + Send + Sync + 'static,
{
    memory: MemoryStore<T>,
    backing: S,
}

impl<T, S: Debug> Debug for LayeredStore<T, S>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredStore")
            .field("memory", &self.memory)
            .field("backing", &self.backing)
            .finish()
    }
}

impl<T, S> LayeredStore<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: CacheStore<T>,
{
    /// Wraps `backing` with an unbounded memory layer.
    #[must_use]
    pub fn new(backing: S) -> Self {
        Self::with_memory(MemoryStore::new(), backing)
    }

    /// Wraps `backing` with the given memory layer.
    #[must_use]
    pub fn with_memory(memory: MemoryStore<T>, backing: S) -> Self {
        Self { memory, backing }
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn backing(&self) -> &S {
        &self.backing
    }
}

impl<T, S> CacheStore<T> for LayeredStore<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: CacheStore<T>,
{
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CachedEnvelope<T>>> {
        async move {
            if let Some(envelope) = self.memory.lookup(key).await {
                return Ok(Some(envelope));
            }

            let found = self.backing.get(key).await?;
            if let Some(envelope) = &found {
                self.memory.insert(key, envelope.clone()).await;
            }
            Ok(found)
        }
        .boxed()
    }

    fn set<'a>(&'a self, key: &'a str, envelope: CachedEnvelope<T>) -> StoreFuture<'a, ()> {
        async move {
            self.memory.insert(key, envelope.clone()).await;
            self.backing.set(key, envelope).await
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        async move {
            self.memory.invalidate(key).await;
            self.backing.remove(key).await
        }
        .boxed()
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        self.backing.keys()
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        async move {
            self.memory.invalidate_all();
            self.backing.clear().await
        }
        .boxed()
    }
}
