// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Coalesced, cache-aware async fetches.
//!
//! A [`Fetcher`] wraps an async network operation and coordinates every call made through it:
//!
//! - Overlapping fetches of the same request share one network call, which is cancelled only
//!   when every fetch waiting on it has been aborted or dropped.
//! - Results are cached with their receipt time and served according to a [`CacheMode`],
//!   stale-while-revalidate by default.
//! - Failed calls can be retried with [`Backoff`], and fetches can poll indefinitely.
//!
//! A fetch yields a chain of [`Response`] nodes rather than a single value. Stale cached data
//! comes first, followed by the revalidated value, then retries or polling rounds. Walk the
//! chain with [`FetchHandle::into_stream`] or [`for_each_response`], or reduce it to its final
//! value with [`collapse_to_final`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use fetchline::{Backoff, Fetcher, Options, collapse_to_final};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), fetchline::Error> {
//! let fetcher = Fetcher::new(|query: String, _cancel| async move {
//!     Ok::<_, std::io::Error>(query.len())
//! });
//!
//! let options = Options::new()
//!     .retry_times(2)
//!     .retry_backoff(Backoff::JitteredExponential)
//!     .retry_initial_wait_time(Duration::from_millis(50));
//!
//! let handle = fetcher.fetch("hello".to_string(), options);
//! assert_eq!(collapse_to_final(handle.response()).await?, Some(5));
//! # Ok(())
//! # }
//! ```
//!
//! # Cache Backends
//!
//! Any [`CacheStore`] can hold results. With the default `memory` feature, fetchers created with
//! [`Fetcher::new`] use an unbounded in-memory store.

mod cache_control;
mod clock;
mod error;
mod fetcher;
mod key;
mod options;
mod request_control;
mod response;
mod retry;
mod rnd;
mod strategy;

#[doc(inline)]
pub use error::{BoxError, Error, ErrorKind};
#[doc(inline)]
pub use fetcher::Fetcher;
#[cfg(feature = "memory")]
#[doc(inline)]
pub use fetchline_memory::{LayeredStore, MemoryStore};
#[doc(inline)]
pub use fetchline_store::{CacheStore, CachedEnvelope, KeyPrefix, StoreError, StoreFuture};
#[doc(inline)]
pub use key::RequestKey;
#[doc(inline)]
pub use options::{Backoff, CacheMode, Options};
#[doc(inline)]
pub use response::{AbortHandle, FetchHandle, Response, ResponseFuture, collapse_to_final, for_each_response};
pub use tokio_util::sync::CancellationToken;
