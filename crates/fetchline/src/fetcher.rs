// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use fetchline_store::{CacheStore, KeyPrefix};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::request_control::{Operation, RequestControl};
use crate::response::FetchHandle;
use crate::strategy::{self, RequestContext};
use crate::{BoxError, Error, Options, RequestKey};

/// Coordinates fetches of one kind of resource.
///
/// A fetcher wraps a network operation, `(request, cancellation) -> Result<T, E>`, and turns each
/// [`fetch`](Self::fetch) into a response chain:
///
/// - Fetches of equal requests that overlap share one call of the operation.
/// - Results are cached under the request's key and served according to the
///   [`CacheMode`][crate::CacheMode].
/// - Failed calls can be retried with backoff, and fetches can poll forever.
///
/// The cancellation token handed to the operation fires once nobody is waiting on the call any
/// more. Operations should stop their work when it does.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use fetchline::{CacheMode, Fetcher, Options};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), fetchline::Error> {
/// let fetcher = Fetcher::new(|user_id: u64, _cancel| async move {
///     Ok::<_, std::io::Error>(format!("user #{user_id}"))
/// });
/// fetcher.configure(Options::new().cache_min_fresh(Duration::from_secs(30)));
///
/// let head = fetcher.fetch(7, Options::new()).response().await;
/// assert_eq!(head.data().map(String::as_str), Some("user #7"));
///
/// // Served from the cache without calling the operation again.
/// let cached = fetcher.fetch(7, Options::new().cache_mode(CacheMode::OnlyIfCached)).response().await;
/// assert_eq!(cached.data().map(String::as_str), Some("user #7"));
/// # Ok(())
/// # }
/// ```
pub struct Fetcher<R, T> {
    control: Arc<RequestControl<R, T>>,
    defaults: RwLock<Options<T>>,
    default_cache: Arc<dyn CacheStore<T>>,
    clock: Clock,
    clear_gate: Arc<tokio::sync::RwLock<()>>,
    _request: PhantomData<fn(R)>,
}

impl<R, T> Debug for Fetcher<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("control", &self.control)
            .field("defaults", &*self.defaults.read())
            .field("default_cache", &self.default_cache)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "memory")]
impl<R, T> Fetcher<R, T>
where
    R: Clone + Serialize + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates a fetcher that caches in an unbounded [`MemoryStore`][fetchline_memory::MemoryStore].
    pub fn new<F, Fut, E>(operation: F) -> Self
    where
        F: Fn(R, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::with_cache(operation, Arc::new(fetchline_memory::MemoryStore::<T>::new()))
    }
}

impl<R, T> Fetcher<R, T>
where
    R: Clone + Serialize + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates a fetcher that caches in `cache` unless a fetch names another store.
    pub fn with_cache<F, Fut, E>(operation: F, cache: Arc<dyn CacheStore<T>>) -> Self
    where
        F: Fn(R, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let operation: Operation<R, T> = Arc::new(move |request: R, cancel: CancellationToken| -> BoxFuture<'static, Result<T, BoxError>> {
            operation(request, cancel).map(|result| result.map_err(Into::into)).boxed()
        });

        Self {
            control: Arc::new(RequestControl::new(operation)),
            defaults: RwLock::new(Options::new()),
            default_cache: cache,
            clock: Clock::new(),
            clear_gate: Arc::new(tokio::sync::RwLock::new(())),
            _request: PhantomData,
        }
    }

    /// Merges `options` into the instance defaults. Fields set in `options` replace the current
    /// defaults, unset fields keep them.
    pub fn configure(&self, options: Options<T>) {
        let mut defaults = self.defaults.write();
        *defaults = options.or(&defaults);
    }

    /// Returns the current instance defaults.
    #[must_use]
    pub fn options(&self) -> Options<T> {
        self.defaults.read().clone()
    }

    /// Starts a fetch of `request`.
    ///
    /// `options` take precedence over the instance defaults. The strategy is chosen from the
    /// effective options: polling when a polling wait is set, otherwise retrying when retries are
    /// enabled, otherwise a single stale-while-revalidate pass.
    ///
    /// Must be called from within a tokio runtime.
    pub fn fetch(&self, request: R, options: Options<T>) -> FetchHandle<T> {
        let options = options.or(&self.defaults.read()).resolve(&self.default_cache);

        let key = match &options.cache_key {
            Some(key) => RequestKey::from(key.as_str()),
            None => match RequestKey::from_request(&request) {
                Ok(key) => key,
                Err(error) => {
                    tracing::event!(
                        name: "fetchline.fetch.invalid_request",
                        tracing::Level::DEBUG,
                        error = %error,
                    );
                    return FetchHandle::failed(error);
                }
            },
        };

        let context = Arc::new(RequestContext {
            key,
            request,
            options,
            control: Arc::clone(&self.control),
            clock: self.clock,
            clear_gate: Arc::clone(&self.clear_gate),
        });

        // Only the handle owns the head; the strategy itself is dropped here.
        let strategy = strategy::for_context(context);
        FetchHandle::new(strategy.abort_handle(), strategy.run())
    }

    /// Removes cached entries written under this fetcher's key prefix.
    ///
    /// With `max_age`, only entries older than it are removed. `cache` overrides the store to
    /// clear, which otherwise is the configured one. Entries that can no longer be decoded are
    /// always removed. Fetches started while the clear runs read the cache only after it ends.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Cache`][crate::ErrorKind::Cache] error if the store fails to list,
    /// read or remove entries.
    pub async fn clear_cache(&self, max_age: Option<Duration>, cache: Option<Arc<dyn CacheStore<T>>>) -> Result<(), Error> {
        let (store, prefix) = {
            let defaults = self.defaults.read();
            let store = cache
                .or_else(|| defaults.cache.clone())
                .unwrap_or_else(|| Arc::clone(&self.default_cache));
            let prefix = Options::<T>::new().or(&defaults).resolve(&self.default_cache).cache_key_prefix;
            (store, prefix)
        };

        let _gate = self.clear_gate.write().await;
        let removed = clear_prefixed(store.as_ref(), &prefix, max_age, self.clock).await?;
        tracing::event!(
            name: "fetchline.cache.cleared",
            tracing::Level::DEBUG,
            cache.prefix = prefix.as_str(),
            cache.removed = removed,
        );
        Ok(())
    }

    /// Number of network calls currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.control.in_flight()
    }
}

async fn clear_prefixed<T>(store: &dyn CacheStore<T>, prefix: &KeyPrefix, max_age: Option<Duration>, clock: Clock) -> Result<usize, Error>
where
    T: Clone + Send + Sync + 'static,
{
    let keys = store.keys().await.map_err(Error::cache)?;
    let mut removed = 0;

    for key in keys.iter().filter(|key| prefix.matches(key)) {
        if let Some(max_age) = max_age {
            let expired = match store.get(key).await {
                Ok(Some(envelope)) => clock.age_of(envelope.timestamp()) > max_age,
                Ok(None) => false,
                Err(error) if error.is_decode() => true,
                Err(error) => return Err(Error::cache(error)),
            };
            if !expired {
                continue;
            }
        }

        store.remove(key).await.map_err(Error::cache)?;
        removed += 1;
    }

    Ok(removed)
}
