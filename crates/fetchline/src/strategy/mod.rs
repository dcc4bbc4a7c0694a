// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The ways one fetch can unfold into a response chain.
//!
//! - [`SwrRequest`]: serve the cache, revalidate over the network when stale
//! - [`RoeRequest`]: an [`SwrRequest`] that is retried with backoff while it fails
//! - [`PollingRequest`]: rounds of either of the above, forever, until aborted

mod polling;
mod roe;
mod swr;

use std::sync::{Arc, OnceLock};

pub(crate) use polling::PollingRequest;
pub(crate) use roe::RoeRequest;
pub(crate) use swr::SwrRequest;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::options::ResolvedOptions;
use crate::request_control::RequestControl;
use crate::response::{AbortHandle, ResponseFuture};
use crate::{CacheMode, RequestKey};

/// One fetch in progress.
pub(crate) trait Strategy<T>: Send + Sync {
    /// Returns the head of the response chain. Every call returns the same chain.
    fn run(&self) -> ResponseFuture<T>;

    /// Resolves the pending node with an aborted error and releases the network call. Idempotent.
    fn abort(&self);

    /// Returns a handle that performs [`Strategy::abort`].
    ///
    /// The handle holds only the strategy's shared state, never the head of its chain, so
    /// keeping it alive does not keep consumed nodes alive.
    fn abort_handle(&self) -> AbortHandle;
}

/// Everything a strategy needs to know about the fetch it runs.
pub(crate) struct RequestContext<R, T> {
    pub key: RequestKey,
    pub request: R,
    pub options: ResolvedOptions<T>,
    pub control: Arc<RequestControl<R, T>>,
    pub clock: Clock,
    pub clear_gate: Arc<RwLock<()>>,
}

impl<R, T> RequestContext<R, T>
where
    R: Clone,
{
    pub fn with_cache_mode(&self, cache_mode: CacheMode) -> Arc<Self> {
        Arc::new(Self {
            key: self.key.clone(),
            request: self.request.clone(),
            options: self.options.with_cache_mode(cache_mode),
            control: Arc::clone(&self.control),
            clock: self.clock,
            clear_gate: Arc::clone(&self.clear_gate),
        })
    }
}

/// Picks the strategy for a fetch: polling, then retrying, then plain stale-while-revalidate.
pub(crate) fn for_context<R, T>(context: Arc<RequestContext<R, T>>) -> Box<dyn Strategy<T>>
where
    R: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    if let Some(wait) = context.options.polling_wait_time {
        Box::new(PollingRequest::new(context, wait))
    } else if context.options.retry_enabled {
        Box::new(RoeRequest::new(context))
    } else {
        Box::new(SwrRequest::new(context))
    }
}

/// Holds the head of a strategy's chain once started.
pub(crate) struct RunOnce<T>(OnceLock<ResponseFuture<T>>);

impl<T> Default for RunOnce<T> {
    fn default() -> Self {
        Self(OnceLock::new())
    }
}

impl<T> RunOnce<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn get_or_start(&self, start: impl FnOnce() -> ResponseFuture<T>) -> ResponseFuture<T> {
        self.0.get_or_init(start).clone()
    }
}
