// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fetchline_store::{CacheStore, CachedEnvelope, KeyPrefix, StoreError};
use parking_lot::Mutex;

use crate::CacheMode;
use crate::clock::Clock;
use crate::options::ResolvedOptions;

/// Applies a [`CacheMode`] to reads and writes of one cache backend.
///
/// The receipt time of every value read or written is remembered per key so freshness can be
/// decided without another backend round-trip.
pub(crate) struct CacheControl<T> {
    store: Arc<dyn CacheStore<T>>,
    mode: CacheMode,
    prefix: KeyPrefix,
    min_fresh: Duration,
    max_age: Duration,
    clock: Clock,
    timestamps: Mutex<HashMap<String, u64>>,
}

impl<T> CacheControl<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(options: &ResolvedOptions<T>, clock: Clock) -> Self {
        Self {
            store: Arc::clone(&options.cache),
            mode: options.cache_mode,
            prefix: options.cache_key_prefix.clone(),
            min_fresh: options.cache_min_fresh,
            max_age: options.cache_max_age,
            clock,
            timestamps: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the cached value for `key` may be served without a network call.
    pub fn is_fresh(&self, key: &str) -> bool {
        match self.mode {
            CacheMode::OnlyIfCached => true,
            CacheMode::NoStore | CacheMode::NoCache | CacheMode::ForceLoad => false,
            CacheMode::ForceCache => self.timestamps.lock().contains_key(key),
            CacheMode::Default => self.timestamp(key).is_some_and(|timestamp| {
                let age = self.clock.age_of(timestamp);
                age < self.min_fresh && age <= self.max_age
            }),
        }
    }

    /// Reads the cached value for `key`.
    ///
    /// Backend failures, including entries that can no longer be decoded, count as misses.
    pub async fn get(&self, key: &str) -> Option<T> {
        if matches!(self.mode, CacheMode::NoStore | CacheMode::NoCache) {
            return None;
        }

        let envelope = match self.store.get(&self.prefix.apply(key)).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return None,
            Err(error) if error.is_decode() => {
                tracing::event!(
                    name: "fetchline.cache.decode_failed",
                    tracing::Level::DEBUG,
                    cache.key = key,
                    error = %error,
                    "treating undecodable entry as a miss"
                );
                return None;
            }
            Err(error) => {
                tracing::event!(
                    name: "fetchline.cache.read_failed",
                    tracing::Level::DEBUG,
                    cache.key = key,
                    error = %error,
                    "treating failed read as a miss"
                );
                return None;
            }
        };

        let timestamp = *self.timestamps.lock().entry(key.to_owned()).or_insert(envelope.timestamp());
        if self.mode == CacheMode::Default && self.clock.age_of(timestamp) > self.max_age {
            return None;
        }

        Some(envelope.into_data())
    }

    /// Stamps `value` with the current time and writes it, unless the mode forbids storing.
    pub async fn set(&self, key: &str, value: T) -> Result<(), StoreError> {
        if self.mode == CacheMode::NoStore {
            return Ok(());
        }

        let now = self.clock.now_millis();
        self.timestamps.lock().insert(key.to_owned(), now);
        self.store.set(&self.prefix.apply(key), CachedEnvelope::new(value, now)).await
    }

    fn timestamp(&self, key: &str) -> Option<u64> {
        self.timestamps.lock().get(key).copied()
    }
}
