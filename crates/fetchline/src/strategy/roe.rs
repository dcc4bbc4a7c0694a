// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{RequestContext, RunOnce, Strategy, SwrRequest};
use crate::response::{AbortHandle, Response, ResponseFuture, extend_terminal, settle, shared};
use crate::retry::RetryControl;
use crate::{CacheMode, Error};

/// Retry-on-error.
///
/// Runs an [`SwrRequest`] and, when its chain ends in a failure, appends retries to the chain.
/// Every retry waits for the backoff delay and then runs a fresh [`SwrRequest`] that bypasses
/// the cache read, until one succeeds, fails with an abort, or the retry budget is spent.
///
/// An abort that lands after a failed attempt has already settled, and before its retry is
/// scheduled, leaves that failure as the end of the chain; callers see the network error and
/// not [`Error::aborted`].
pub(crate) struct RoeRequest<R, T> {
    state: Arc<RoeState<R, T>>,
    response: RunOnce<T>,
}

struct RoeState<R, T> {
    context: Arc<RequestContext<R, T>>,
    retry: Mutex<RetryControl>,
    aborted: CancellationToken,
    current: Mutex<Option<AbortHandle>>,
}

impl<R, T> RoeRequest<R, T>
where
    R: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(context: Arc<RequestContext<R, T>>) -> Self {
        let retry = RetryControl::new(context.options.retry.clone());
        Self {
            state: Arc::new(RoeState {
                context,
                retry: Mutex::new(retry),
                aborted: CancellationToken::new(),
                current: Mutex::new(None),
            }),
            response: RunOnce::default(),
        }
    }
}

impl<R, T> Strategy<T> for RoeRequest<R, T>
where
    R: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn run(&self) -> ResponseFuture<T> {
        self.response.get_or_start(|| shared(Arc::clone(&self.state).first_attempt()))
    }

    fn abort(&self) {
        self.state.abort();
    }

    fn abort_handle(&self) -> AbortHandle {
        let state = Arc::clone(&self.state);
        AbortHandle::new(move || state.abort())
    }
}

impl<R, T> RoeState<R, T>
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
        self.retry.lock().reset();
    }

    async fn first_attempt(self: Arc<Self>) -> Response<T> {
        let Some(head) = self.start_attempt(Arc::clone(&self.context)) else {
            return Response::aborted();
        };
        let head = tokio::select! {
            biased;
            () = self.aborted.cancelled() => return Response::aborted(),
            head = head => head,
        };

        let state = Arc::clone(&self);
        extend_terminal(head, move |terminal| state.retry_after(terminal))
    }

    fn start_attempt(&self, context: Arc<RequestContext<R, T>>) -> Option<ResponseFuture<T>> {
        let mut current = self.current.lock();
        if self.aborted.is_cancelled() {
            return None;
        }

        let attempt = SwrRequest::new(context);
        let head = attempt.run();
        *current = Some(attempt.abort_handle());
        Some(head)
    }

    fn retry_after(self: Arc<Self>, terminal: &Response<T>) -> Option<ResponseFuture<T>> {
        let error = terminal.error()?;
        if error.is_aborted() || self.aborted.is_cancelled() {
            return None;
        }

        let can_retry = self.retry.lock().can_retry();
        if !can_retry {
            tracing::event!(
                name: "fetchline.retry.exhausted",
                tracing::Level::DEBUG,
                fetch.key = %self.context.key,
                error = %error,
            );
            return None;
        }

        Some(shared(self.retry_until_settled(error.clone())))
    }

    async fn retry_until_settled(self: Arc<Self>, mut last_error: Error) -> Response<T> {
        let bypass_cache = self.context.with_cache_mode(CacheMode::NoCache);

        loop {
            let (wait, attempt) = {
                let mut retry = self.retry.lock();
                (retry.next_wait(), retry.attempts_used())
            };
            let Some(wait) = wait else {
                return Response::from_error(last_error);
            };

            tracing::event!(
                name: "fetchline.retry",
                tracing::Level::WARN,
                fetch.key = %self.context.key,
                retry.attempt = attempt,
                retry.delay = ?wait,
                error = %last_error,
                "retrying failed fetch"
            );

            tokio::select! {
                biased;
                () = self.aborted.cancelled() => return Response::aborted(),
                () = tokio::time::sleep(wait) => {}
            }

            let Some(head) = self.start_attempt(Arc::clone(&bypass_cache)) else {
                return Response::aborted();
            };
            let terminal = tokio::select! {
                biased;
                () = self.aborted.cancelled() => return Response::aborted(),
                terminal = settle(head) => terminal,
            };

            let (data, error, _) = terminal.into_parts();
            let Some(error) = error else {
                return Response::from_data(data);
            };
            if error.is_aborted() {
                return Response::from_error(error);
            }

            let can_retry = self.retry.lock().can_retry();
            if !can_retry {
                tracing::event!(
                    name: "fetchline.retry.exhausted",
                    tracing::Level::DEBUG,
                    fetch.key = %self.context.key,
                    error = %error,
                );
                return Response::from_error(error);
            }
            last_error = error;
        }
    }
}
