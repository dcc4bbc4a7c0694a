// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::{BoxError, Error};

/// The network operation behind a fetcher, with its error type erased.
pub(crate) type Operation<R, T> = Arc<dyn Fn(R, CancellationToken) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Outcome of one network call, observed identically by every lease holder.
pub(crate) type SharedCall<T> = Shared<BoxFuture<'static, Result<T, Error>>>;

type SharedMapping<T> = Arc<SyncMutex<HashMap<String, Instance<T>>>>;

struct Instance<T> {
    id: u64,
    call: SharedCall<T>,
    ref_count: usize,
    cancel: CancellationToken,
}

/// Runs at most one network call per key at a time and shares it between every caller of that key.
///
/// Each caller holds a [`Lease`]. The call runs on its own task so it makes progress whether or
/// not anyone polls it; once it settles its entry is removed, and a later caller of the same key
/// starts a new call. When the last lease is dropped before the call settles, the call's
/// cancellation token fires and its task stops.
pub(crate) struct RequestControl<R, T> {
    operation: Operation<R, T>,
    mapping: SharedMapping<T>,
    next_id: AtomicU64,
}

impl<R, T> Debug for RequestControl<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestControl")
            .field("in_flight", &self.mapping.lock().len())
            .finish_non_exhaustive()
    }
}

impl<R, T> RequestControl<R, T>
where
    R: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(operation: Operation<R, T>) -> Self {
        Self {
            operation,
            mapping: Arc::default(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Joins the in-flight call for `key`, starting one with `request` if there is none.
    ///
    /// Must be called from within a tokio runtime.
    pub fn acquire(&self, key: &str, request: R) -> Lease<T> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let call: SharedCall<T> = rx
            .map(|received| received.unwrap_or_else(|_| Err(Error::network("network operation ended without a result"))))
            .boxed()
            .shared();

        {
            let mut mapping = self.mapping.lock();
            if let Some(instance) = mapping.get_mut(key) {
                instance.ref_count += 1;
                tracing::event!(
                    name: "fetchline.call.joined",
                    tracing::Level::DEBUG,
                    call.key = key,
                    call.ref_count = instance.ref_count,
                );
                return Lease::new(key, instance.id, instance.call.clone(), &self.mapping);
            }

            mapping.insert(
                key.to_owned(),
                Instance {
                    id,
                    call: call.clone(),
                    ref_count: 1,
                    cancel: cancel.clone(),
                },
            );
        }

        tracing::event!(
            name: "fetchline.call.started",
            tracing::Level::DEBUG,
            call.key = key,
        );
        let operation = (self.operation)(request, cancel.clone());
        let mapping = Arc::clone(&self.mapping);
        let owned_key = key.to_owned();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = operation => Some(result),
            };

            // Settled calls are never joined, even if some lease is still held.
            remove_if_current(&mapping, &owned_key, id);

            match outcome {
                Some(result) => {
                    let _ = tx.send(result.map_err(Error::network));
                }
                None => tracing::event!(
                    name: "fetchline.call.cancelled",
                    tracing::Level::DEBUG,
                    call.key = owned_key.as_str(),
                ),
            }
        });

        Lease::new(key, id, call, &self.mapping)
    }

    /// Number of calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.mapping.lock().len()
    }
}

fn remove_if_current<T>(mapping: &SyncMutex<HashMap<String, Instance<T>>>, key: &str, id: u64) {
    let mut mapping = mapping.lock();
    if mapping.get(key).is_some_and(|instance| instance.id == id) {
        mapping.remove(key);
    }
}

fn release<T>(mapping: &SyncMutex<HashMap<String, Instance<T>>>, key: &str, id: u64) {
    let mut guard = mapping.lock();
    let Some(instance) = guard.get_mut(key) else {
        return;
    };
    if instance.id != id {
        return;
    }

    instance.ref_count = instance.ref_count.saturating_sub(1);
    if instance.ref_count == 0
        && let Some(instance) = guard.remove(key)
    {
        drop(guard);
        instance.cancel.cancel();
        tracing::event!(
            name: "fetchline.call.released",
            tracing::Level::DEBUG,
            call.key = key,
            "last lease dropped before the call settled"
        );
    }
}

/// One caller's interest in a shared network call. Dropping it releases that interest.
pub(crate) struct Lease<T> {
    key: String,
    id: u64,
    call: SharedCall<T>,
    mapping: Weak<SyncMutex<HashMap<String, Instance<T>>>>,
}

impl<T> Lease<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(key: &str, id: u64, call: SharedCall<T>, mapping: &SharedMapping<T>) -> Self {
        Self {
            key: key.to_owned(),
            id,
            call,
            mapping: Arc::downgrade(mapping),
        }
    }

    /// The shared outcome of the call.
    pub fn call(&self) -> SharedCall<T> {
        self.call.clone()
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        if let Some(mapping) = self.mapping.upgrade() {
            release(&mapping, &self.key, self.id);
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;

    #[derive(Default)]
    struct CallLog {
        started: AtomicUsize,
        tokens: SyncMutex<Vec<CancellationToken>>,
    }

    impl CallLog {
        fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        fn cancelled(&self) -> usize {
            self.tokens.lock().iter().filter(|token| token.is_cancelled()).count()
        }
    }

    fn control(calls: &Arc<CallLog>, delay: Duration, fail: bool) -> RequestControl<u32, u32> {
        let calls = Arc::clone(calls);
        RequestControl::new(Arc::new(move |request: u32, cancel: CancellationToken| {
            let n = u32::try_from(calls.started.fetch_add(1, Ordering::SeqCst)).unwrap();
            calls.tokens.lock().push(cancel);
            async move {
                tokio::time::sleep(delay).await;
                if fail { Err::<u32, BoxError>("boom".into()) } else { Ok(request * 10 + n) }
            }
            .boxed()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_call() {
        let calls = Arc::new(CallLog::default());
        let control = control(&calls, Duration::from_millis(10), false);

        let leases: Vec<_> = (0..5).map(|_| control.acquire("k", 1)).collect();
        assert_eq!(control.in_flight(), 1);

        for lease in &leases {
            assert_eq!(lease.call().await.unwrap(), 10);
        }
        assert_eq!(calls.started(), 1);
        assert_eq!(control.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_shared() {
        let calls = Arc::new(CallLog::default());
        let control = control(&calls, Duration::from_millis(10), true);

        let a = control.acquire("k", 1);
        let b = control.acquire("k", 1);
        let (a, b) = (a.call().await.unwrap_err(), b.call().await.unwrap_err());
        assert_eq!(a.to_string(), "network operation failed: boom");
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(calls.started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_calls_are_not_joined() {
        let calls = Arc::new(CallLog::default());
        let control = control(&calls, Duration::from_millis(10), false);

        let first = control.acquire("k", 1);
        assert_eq!(first.call().await.unwrap(), 10);

        let second = control.acquire("k", 1);
        assert_eq!(second.call().await.unwrap(), 11);
        assert_eq!(calls.started(), 2);

        // Releasing a settled lease touches nothing.
        drop(first);
        assert_eq!(calls.cancelled(), 0);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn last_release_cancels_the_call() {
        let calls = Arc::new(CallLog::default());
        let control = control(&calls, Duration::from_secs(60), false);

        let a = control.acquire("k", 1);
        let b = control.acquire("k", 1);
        let call = a.call();

        drop(a);
        assert_eq!(calls.cancelled(), 0);
        assert_eq!(control.in_flight(), 1);

        drop(b);
        assert_eq!(control.in_flight(), 0);
        assert_eq!(calls.cancelled(), 1);
        assert!(call.await.is_err());
        assert!(logs_contain("last lease dropped before the call settled"));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_lease_does_not_release_a_newer_call() {
        let calls = Arc::new(CallLog::default());
        let control = control(&calls, Duration::from_secs(60), false);

        drop(control.acquire("k", 1));
        assert_eq!(calls.cancelled(), 1);

        let current = control.acquire("k", 1);
        let stale = Lease::<u32>::new("k", u64::MAX, current.call(), &control.mapping);
        drop(stale);
        assert_eq!(control.in_flight(), 1);

        drop(current);
        assert_eq!(control.in_flight(), 0);
        assert_eq!(calls.cancelled(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_run_independently() {
        let calls = Arc::new(CallLog::default());
        let control = control(&calls, Duration::from_millis(5), false);

        let a = control.acquire("a", 1);
        let b = control.acquire("b", 2);
        assert_eq!(control.in_flight(), 2);
        assert_eq!(a.call().await.unwrap(), 10);
        assert_eq!(b.call().await.unwrap(), 21);
        assert_eq!(calls.started(), 2);
    }
}
