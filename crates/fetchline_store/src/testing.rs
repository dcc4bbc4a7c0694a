// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test doubles for code that consumes a [`CacheStore`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;

use crate::{CacheStore, CachedEnvelope, StoreError, StoreFuture};

type FailPredicate = Arc<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// An operation observed by [`MockStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `get(key)`
    Get(String),
    /// `set(key, ..)`
    Set(String),
    /// `remove(key)`
    Remove(String),
    /// `keys()`
    Keys,
    /// `clear()`
    Clear,
}

/// An in-memory [`CacheStore`] that records operations and can inject failures.
///
/// Clones share state, so a test can hand one clone to the code under test and inspect the
/// other.
///
/// # Examples
///
/// ```
/// use fetchline_store::testing::{MockStore, StoreOp};
/// use fetchline_store::{CacheStore, CachedEnvelope};
/// # futures::executor::block_on(async {
///
/// let store = MockStore::<u32>::new();
/// store.set("a", CachedEnvelope::new(1, 0)).await.unwrap();
///
/// store.fail_when(|op| matches!(op, StoreOp::Get(_)));
/// assert!(store.get("a").await.is_err());
///
/// store.clear_failures();
/// assert_eq!(store.get("a").await.unwrap().unwrap().into_data(), 1);
/// assert_eq!(store.operations().len(), 3);
/// # });
/// ```
pub struct MockStore<T> {
    inner: Arc<MockInner<T>>,
}

struct MockInner<T> {
    data: Mutex<BTreeMap<String, CachedEnvelope<T>>>,
    corrupted: Mutex<BTreeSet<String>>,
    operations: Mutex<Vec<StoreOp>>,
    fail_when: Mutex<Option<FailPredicate>>,
}

impl<T> Clone for MockStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for MockStore<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(MockInner {
                data: Mutex::new(BTreeMap::new()),
                corrupted: Mutex::new(BTreeSet::new()),
                operations: Mutex::new(Vec::new()),
                fail_when: Mutex::new(None),
            }),
        }
    }
}

impl<T> Debug for MockStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("len", &self.inner.data.lock().len())
            .field("operations", &self.inner.operations.lock().len())
            .finish_non_exhaustive()
    }
}

impl<T: Clone> MockStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates `key` without recording an operation.
    #[must_use]
    pub fn with_entry(self, key: impl Into<String>, envelope: CachedEnvelope<T>) -> Self {
        self.inner.data.lock().insert(key.into(), envelope);
        self
    }

    /// Marks `key` as holding bytes that can no longer be decoded.
    ///
    /// Reads of the key fail with [`StoreError::Decode`] until it is written again.
    pub fn corrupt(&self, key: impl Into<String>) {
        let key = key.into();
        self.inner.data.lock().remove(&key);
        self.inner.corrupted.lock().insert(key);
    }

    /// Makes every operation matching `predicate` fail with a backend error.
    pub fn fail_when(&self, predicate: impl Fn(&StoreOp) -> bool + Send + Sync + 'static) {
        *self.inner.fail_when.lock() = Some(Arc::new(predicate));
    }

    /// Removes any failure injected by [`fail_when`](Self::fail_when).
    pub fn clear_failures(&self) {
        *self.inner.fail_when.lock() = None;
    }

    /// Returns all operations observed so far, oldest first.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.inner.operations.lock().clone()
    }

    /// Forgets the recorded operations.
    pub fn clear_operations(&self) {
        self.inner.operations.lock().clear();
    }

    /// Returns the envelope under `key` without recording an operation.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<CachedEnvelope<T>> {
        self.inner.data.lock().get(key).cloned()
    }

    /// Returns the number of readable entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.data.lock().len()
    }

    /// Returns `true` if the store holds no readable entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, op: StoreOp) -> Result<(), StoreError> {
        let predicate = self.inner.fail_when.lock().clone();
        let fail = predicate.is_some_and(|p| p(&op));
        self.inner.operations.lock().push(op);
        if fail {
            Err(StoreError::backend("injected failure"))
        } else {
            Ok(())
        }
    }
}

fn decode_failure() -> StoreError {
    match serde_json::from_str::<serde_json::Value>("\u{0}") {
        Err(e) => StoreError::Decode(e),
        Ok(_) => StoreError::backend("corrupted entry"),
    }
}

impl<T> CacheStore<T> for MockStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CachedEnvelope<T>>> {
        async move {
            self.record(StoreOp::Get(key.to_owned()))?;
            if self.inner.corrupted.lock().contains(key) {
                return Err(decode_failure());
            }
            Ok(self.inner.data.lock().get(key).cloned())
        }
        .boxed()
    }

    fn set<'a>(&'a self, key: &'a str, envelope: CachedEnvelope<T>) -> StoreFuture<'a, ()> {
        async move {
            self.record(StoreOp::Set(key.to_owned()))?;
            self.inner.corrupted.lock().remove(key);
            self.inner.data.lock().insert(key.to_owned(), envelope);
            Ok(())
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        async move {
            self.record(StoreOp::Remove(key.to_owned()))?;
            self.inner.corrupted.lock().remove(key);
            self.inner.data.lock().remove(key);
            Ok(())
        }
        .boxed()
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        async move {
            self.record(StoreOp::Keys)?;
            let mut keys: Vec<String> = self.inner.data.lock().keys().cloned().collect();
            keys.extend(self.inner.corrupted.lock().iter().cloned());
            Ok(keys)
        }
        .boxed()
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        async move {
            self.record(StoreOp::Clear)?;
            self.inner.data.lock().clear();
            self.inner.corrupted.lock().clear();
            Ok(())
        }
        .boxed()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    #[test]
    fn corrupted_entries_fail_to_decode_until_rewritten() {
        block_on(async {
            let store = MockStore::new().with_entry("k", CachedEnvelope::new(1_u8, 0));
            store.corrupt("k");

            assert!(store.get("k").await.unwrap_err().is_decode());
            assert_eq!(store.keys().await.unwrap(), vec!["k".to_string()]);

            store.set("k", CachedEnvelope::new(2, 5)).await.unwrap();
            assert_eq!(store.get("k").await.unwrap().unwrap().into_data(), 2);
        });
    }

    #[test]
    fn failures_are_recorded_too() {
        block_on(async {
            let store = MockStore::<u8>::new();
            store.fail_when(|op| *op == StoreOp::Clear);

            assert!(store.clear().await.is_err());
            store.remove("missing").await.unwrap();

            assert_eq!(store.operations(), vec![StoreOp::Clear, StoreOp::Remove("missing".into())]);
            store.clear_operations();
            assert!(store.operations().is_empty());
            assert!(store.is_empty());
        });
    }
}
