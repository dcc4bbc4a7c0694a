// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{RequestContext, RunOnce, Strategy};
use crate::cache_control::CacheControl;
use crate::request_control::{Lease, SharedCall};
use crate::response::{AbortHandle, Response, ResponseFuture, shared};

/// Stale-while-revalidate.
///
/// Fresh cached data ends the chain right away. Stale cached data is yielded first and followed
/// by the network result; without cached data the network result is the head itself.
pub(crate) struct SwrRequest<R, T> {
    state: Arc<SwrState<R, T>>,
    response: RunOnce<T>,
}

struct SwrState<R, T> {
    context: Arc<RequestContext<R, T>>,
    cache: CacheControl<T>,
    aborted: CancellationToken,
    lease: Mutex<Option<Lease<T>>>,
}

impl<R, T> SwrRequest<R, T>
where
    R: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(context: Arc<RequestContext<R, T>>) -> Self {
        let cache = CacheControl::new(&context.options, context.clock);
        Self {
            state: Arc::new(SwrState {
                context,
                cache,
                aborted: CancellationToken::new(),
                lease: Mutex::new(None),
            }),
            response: RunOnce::default(),
        }
    }
}

impl<R, T> Strategy<T> for SwrRequest<R, T>
where
    R: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn run(&self) -> ResponseFuture<T> {
        self.response
            .get_or_start(|| shared(Arc::clone(&self.state).read_then_revalidate()))
    }

    fn abort(&self) {
        self.state.abort();
    }

    fn abort_handle(&self) -> AbortHandle {
        let state = Arc::clone(&self.state);
        AbortHandle::new(move || state.abort())
    }
}

impl<R, T> SwrState<R, T>
where
    R: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn abort(&self) {
        if self.aborted.is_cancelled() {
            return;
        }

        self.aborted.cancel();
        let lease = self.lease.lock().take();
        drop(lease);
        tracing::event!(
            name: "fetchline.fetch.aborted",
            tracing::Level::DEBUG,
            fetch.key = %self.context.key,
        );
    }

    async fn read_then_revalidate(self: Arc<Self>) -> Response<T> {
        let cached = tokio::select! {
            biased;
            () = self.aborted.cancelled() => return Response::aborted(),
            cached = self.read_cache() => cached,
        };

        let key = self.context.key.as_str();
        if self.cache.is_fresh(key) {
            tracing::event!(
                name: "fetchline.swr.fresh",
                tracing::Level::DEBUG,
                fetch.key = key,
                cache.hit = cached.is_some(),
            );
            return Response::from_data(cached);
        }

        let Some(call) = self.join_call() else {
            return Response::aborted();
        };
        tracing::event!(
            name: "fetchline.swr.revalidate",
            tracing::Level::DEBUG,
            fetch.key = key,
            cache.hit = cached.is_some(),
        );

        let revalidation = shared(Arc::clone(&self).revalidate(call));
        match cached {
            Some(data) => Response::from_data(Some(data)).with_next(revalidation),
            None => revalidation.await,
        }
    }

    async fn read_cache(&self) -> Option<T> {
        let _gate = self.context.clear_gate.read().await;
        self.cache.get(self.context.key.as_str()).await
    }

    fn join_call(&self) -> Option<SharedCall<T>> {
        let mut lease = self.lease.lock();
        if self.aborted.is_cancelled() {
            return None;
        }

        let joined = self
            .context
            .control
            .acquire(self.context.key.as_str(), self.context.request.clone());
        let call = joined.call();
        *lease = Some(joined);
        Some(call)
    }

    async fn revalidate(self: Arc<Self>, call: SharedCall<T>) -> Response<T> {
        let result = tokio::select! {
            biased;
            () = self.aborted.cancelled() => return Response::aborted(),
            result = call => result,
        };
        let lease = self.lease.lock().take();
        drop(lease);

        let data = match result {
            Ok(data) => data,
            Err(error) => return Response::from_error(error),
        };

        let key = self.context.key.as_str();
        let written = tokio::select! {
            biased;
            () = self.aborted.cancelled() => return Response::aborted(),
            written = self.cache.set(key, data.clone()) => written,
        };
        if let Err(error) = written {
            tracing::event!(
                name: "fetchline.cache.write_failed",
                tracing::Level::WARN,
                fetch.key = key,
                error = %error,
                "failed to cache network result"
            );
        }

        Response::from_data(Some(data))
    }
}
