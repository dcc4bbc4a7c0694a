// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{RequestContext, RoeRequest, RunOnce, Strategy, SwrRequest};
use crate::CacheMode;
use crate::response::{AbortHandle, Response, ResponseFuture, extend_terminal, shared};

/// Runs a fetch in rounds, forever.
///
/// The first round uses the configured cache mode, later rounds always go to the network. Once
/// a round's chain reaches its terminal node, the next round starts after the polling wait and
/// its head becomes the terminal node's successor. The chain only ends when aborted.
pub(crate) struct PollingRequest<R, T> {
    state: Arc<PollingState<R, T>>,
    response: RunOnce<T>,
}

struct PollingState<R, T> {
    context: Arc<RequestContext<R, T>>,
    wait: Duration,
    aborted: CancellationToken,
    current: Mutex<Option<AbortHandle>>,
}

impl<R, T> PollingRequest<R, T>
where
    R: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(context: Arc<RequestContext<R, T>>, wait: Duration) -> Self {
        Self {
            state: Arc::new(PollingState {
                context,
                wait,
                aborted: CancellationToken::new(),
                current: Mutex::new(None),
            }),
            response: RunOnce::default(),
        }
    }
}

impl<R, T> Strategy<T> for PollingRequest<R, T>
where
    R: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn run(&self) -> ResponseFuture<T> {
        self.response.get_or_start(|| shared(Arc::clone(&self.state).round(0)))
    }

    fn abort(&self) {
        self.state.abort();
    }

    fn abort_handle(&self) -> AbortHandle {
        let state = Arc::clone(&self.state);
        AbortHandle::new(move || state.abort())
    }
}

impl<R, T> PollingState<R, T>
where
    R: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn abort(&self) {
        if self.aborted.is_cancelled() {
            return;
        }

        self.aborted.cancel();
        let current = self.current.lock().take();
        if let Some(current) = current {
            current.abort();
        }
        tracing::event!(
            name: "fetchline.poll.stopped",
            tracing::Level::DEBUG,
            fetch.key = %self.context.key,
        );
    }

    fn round(self: Arc<Self>, round: u64) -> BoxFuture<'static, Response<T>> {
        async move {
            let context = if round == 0 {
                Arc::clone(&self.context)
            } else {
                self.context.with_cache_mode(CacheMode::NoCache)
            };
            let Some(head) = self.start_round(context) else {
                return Response::aborted();
            };
            tracing::event!(
                name: "fetchline.poll",
                tracing::Level::DEBUG,
                fetch.key = %self.context.key,
                poll.round = round,
            );

            let head = tokio::select! {
                biased;
                () = self.aborted.cancelled() => return Response::aborted(),
                head = head => head,
            };

            let state = Arc::clone(&self);
            extend_terminal(head, move |_| state.schedule(round + 1))
        }
        .boxed()
    }

    fn start_round(&self, context: Arc<RequestContext<R, T>>) -> Option<ResponseFuture<T>> {
        let inner: Box<dyn Strategy<T>> = if context.options.retry_enabled {
            Box::new(RoeRequest::new(context))
        } else {
            Box::new(SwrRequest::new(context))
        };

        let mut current = self.current.lock();
        if self.aborted.is_cancelled() {
            return None;
        }
        let head = inner.run();
        *current = Some(inner.abort_handle());
        Some(head)
    }

    fn schedule(self: Arc<Self>, round: u64) -> Option<ResponseFuture<T>> {
        if self.aborted.is_cancelled() {
            return None;
        }

        Some(shared(async move {
            tokio::select! {
                biased;
                () = self.aborted.cancelled() => return Response::aborted(),
                () = tokio::time::sleep(self.wait) => {}
            }
            self.round(round).await
        }))
    }
}
