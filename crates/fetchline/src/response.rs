// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};

use crate::Error;

/// A pending [`Response`] node.
///
/// Clones share one computation: every clone resolves to the same node, and the work behind it
/// only advances while some clone is being awaited.
pub type ResponseFuture<T> = Shared<BoxFuture<'static, Response<T>>>;

/// One node of a response chain.
///
/// A fetch does not produce a single value but a chain of nodes, each of which may carry data,
/// an error, and a handle to the next node. A node without a next node is terminal. For
/// example a fetch that finds stale data in the cache first yields a node with the cached
/// data, whose next node carries the revalidated value.
///
/// Errors never reject the chain: a failure always arrives as a node carrying an [`Error`].
#[derive(Clone)]
pub struct Response<T> {
    data: Option<T>,
    error: Option<Error>,
    next: Option<ResponseFuture<T>>,
}

impl<T: Debug> Debug for Response<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("data", &self.data)
            .field("error", &self.error)
            .field("has_next", &self.next.is_some())
            .finish()
    }
}

impl<T> Response<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) const fn from_data(data: Option<T>) -> Self {
        Self {
            data,
            error: None,
            next: None,
        }
    }

    pub(crate) const fn from_error(error: Error) -> Self {
        Self {
            data: None,
            error: Some(error),
            next: None,
        }
    }

    pub(crate) const fn aborted() -> Self {
        Self::from_error(Error::aborted())
    }

    pub(crate) fn with_next(mut self, next: ResponseFuture<T>) -> Self {
        self.next = Some(next);
        self
    }

    /// Returns the data carried by this node.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Returns the error carried by this node.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Returns the next node, or `None` if this node is terminal.
    #[must_use]
    pub fn next(&self) -> Option<ResponseFuture<T>> {
        self.next.clone()
    }

    /// Returns `true` if no node follows this one.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }

    /// Returns `true` if this node reports an aborted fetch.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.error.as_ref().is_some_and(Error::is_aborted)
    }

    /// Splits the node into its data, error and next node.
    #[must_use]
    pub fn into_parts(self) -> (Option<T>, Option<Error>, Option<ResponseFuture<T>>) {
        (self.data, self.error, self.next)
    }
}

pub(crate) fn shared<T, F>(future: F) -> ResponseFuture<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Response<T>> + Send + 'static,
{
    future.boxed().shared()
}

pub(crate) fn ready<T>(response: Response<T>) -> ResponseFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    shared(std::future::ready(response))
}

/// Rewrites the chain starting at `response` so that its terminal node gets the next node
/// produced by `extend`.
///
/// `extend` runs once, when the terminal node is reached, and sees that node. Returning `None`
/// leaves the chain as it is.
pub(crate) fn extend_terminal<T, F>(mut response: Response<T>, extend: F) -> Response<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce(&Response<T>) -> Option<ResponseFuture<T>> + Send + 'static,
{
    match response.next.take() {
        Some(next) => response.with_next(shared(async move { extend_terminal(next.await, extend) })),
        None => {
            response.next = extend(&response);
            response
        }
    }
}

/// Follows the chain from `response` until the terminal node.
pub(crate) async fn settle<T, F>(response: F) -> Response<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Response<T>>,
{
    let mut node = response.await;
    while let Some(next) = node.next.take() {
        node = next.await;
    }
    node
}

/// A cloneable handle that aborts one fetch.
///
/// Aborting is idempotent and may happen at any time, including after the fetch finished. The
/// fetch's pending node resolves with an aborted error right away. The underlying network call
/// is only cancelled when no other fetch is waiting on it.
#[derive(Clone)]
pub struct AbortHandle(Arc<dyn Fn() + Send + Sync>);

impl Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AbortHandle").finish_non_exhaustive()
    }
}

impl AbortHandle {
    pub(crate) fn new(abort: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(abort))
    }

    pub(crate) fn noop() -> Self {
        Self::new(|| {})
    }

    /// Aborts the fetch.
    pub fn abort(&self) {
        (self.0)();
    }
}

/// The outcome of [`Fetcher::fetch`][crate::Fetcher::fetch]: an abort handle and the head of the
/// response chain.
///
/// Dropping the handle does not abort the fetch. Dropping the handle together with every clone
/// of the chain releases the fetch's interest in the underlying network call.
///
/// # Examples
///
/// ```
/// use fetchline::{Fetcher, Options};
/// use futures::StreamExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = Fetcher::new(|(): (), _cancel| async { Ok::<_, std::io::Error>(1_u32) });
///
/// let mut nodes = fetcher.fetch((), Options::new()).into_stream();
/// while let Some(node) = nodes.next().await {
///     assert_eq!(node.data(), Some(&1));
/// }
/// # }
/// ```
pub struct FetchHandle<T> {
    abort: AbortHandle,
    response: ResponseFuture<T>,
}

impl<T> Debug for FetchHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchHandle").field("abort", &self.abort).finish_non_exhaustive()
    }
}

impl<T> FetchHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) const fn new(abort: AbortHandle, response: ResponseFuture<T>) -> Self {
        Self { abort, response }
    }

    pub(crate) fn failed(error: Error) -> Self {
        Self::new(AbortHandle::noop(), ready(Response::from_error(error)))
    }

    /// Aborts the fetch. See [`AbortHandle`].
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Returns a cloneable abort handle.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Returns the head of the response chain.
    #[must_use]
    pub fn response(&self) -> ResponseFuture<T> {
        self.response.clone()
    }

    /// Splits the handle into its abort handle and the head of the response chain.
    #[must_use]
    pub fn into_parts(self) -> (AbortHandle, ResponseFuture<T>) {
        (self.abort, self.response)
    }

    /// Turns the chain into a stream of its nodes, ending after the terminal node.
    ///
    /// Polling fetches never reach a terminal node, so their stream only ends once aborted.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Response<T>> {
        stream::unfold(Some(self.response), |pending| async move {
            let node = pending?.await;
            let next = node.next();
            Some((node, next))
        })
        .boxed()
    }
}

/// Walks the chain of `handle` on the current tokio runtime, calling `visitor` with every node
/// as it resolves.
///
/// Returns the fetch's abort handle. Aborting it makes the walk end with the aborted node.
///
/// # Panics
///
/// Panics if called outside of a tokio runtime.
pub fn for_each_response<T, V>(handle: FetchHandle<T>, mut visitor: V) -> AbortHandle
where
    T: Clone + Send + Sync + 'static,
    V: FnMut(&Response<T>) + Send + 'static,
{
    let abort = handle.abort_handle();
    let mut nodes = handle.into_stream();
    tokio::spawn(async move {
        while let Some(node) = nodes.next().await {
            visitor(&node);
        }
    });
    abort
}

/// Waits for the chain to reach its terminal node and returns the last data seen.
///
/// Resolves to the last node's data when any node carried data, otherwise to the last error
/// seen, otherwise to `Ok(None)`.
///
/// # Errors
///
/// Returns the last error of the chain if no node carried data.
///
/// # Examples
///
/// ```
/// use fetchline::{Fetcher, Options, collapse_to_final};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), fetchline::Error> {
/// let fetcher = Fetcher::new(|id: u32, _cancel| async move { Ok::<_, std::io::Error>(id * 2) });
/// let value = collapse_to_final(fetcher.fetch(21, Options::new()).response()).await?;
/// assert_eq!(value, Some(42));
/// # Ok(())
/// # }
/// ```
pub async fn collapse_to_final<T, F>(response: F) -> Result<Option<T>, Error>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Response<T>>,
{
    let mut last_data = None;
    let mut last_error = None;
    let mut node = response.await;
    loop {
        let (data, error, next) = node.into_parts();
        if data.is_some() {
            last_data = data;
        }
        if error.is_some() {
            last_error = error;
        }
        match next {
            Some(next) => node = next.await,
            None => break,
        }
    }

    match (last_data, last_error) {
        (Some(data), _) => Ok(Some(data)),
        (None, Some(error)) => Err(error),
        (None, None) => Ok(None),
    }
}
