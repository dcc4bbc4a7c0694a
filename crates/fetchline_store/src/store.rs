// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{CachedEnvelope, StoreError};

/// Future returned by [`CacheStore`] operations.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StoreError>>;

/// An async key/value store holding [`CachedEnvelope`]s.
///
/// The trait is object safe so that engines can hold a `Arc<dyn CacheStore<T>>` picked at
/// runtime. Implementations must be cheap to share across tasks.
///
/// # Contract
///
/// - `get` returns `Ok(None)` for unknown keys.
/// - `remove` of an unknown key succeeds.
/// - `keys` lists every key currently held, including keys written by other users of the same
///   backend; callers filter by their own [`KeyPrefix`][crate::KeyPrefix].
/// - A value that cannot be read back is reported as [`StoreError::Decode`] so callers can
///   treat it as a miss.
pub trait CacheStore<T>: Send + Sync + Debug {
    /// Reads the envelope stored under `key`.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CachedEnvelope<T>>>;

    /// Stores `envelope` under `key`, replacing any previous value.
    fn set<'a>(&'a self, key: &'a str, envelope: CachedEnvelope<T>) -> StoreFuture<'a, ()>;

    /// Removes the value stored under `key`.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    /// Lists all keys held by the store.
    fn keys(&self) -> StoreFuture<'_, Vec<String>>;

    /// Removes every value held by the store.
    fn clear(&self) -> StoreFuture<'_, ()>;
}

impl<T, S> CacheStore<T> for Arc<S>
where
    S: CacheStore<T> + ?Sized,
{
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CachedEnvelope<T>>> {
        (**self).get(key)
    }

    fn set<'a>(&'a self, key: &'a str, envelope: CachedEnvelope<T>) -> StoreFuture<'a, ()> {
        (**self).set(key, envelope)
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        (**self).remove(key)
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        (**self).keys()
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        (**self).clear()
    }
}
