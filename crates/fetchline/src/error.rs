// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use fetchline_store::StoreError;

/// Boxed error type accepted from network operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error carried by a [`Response`][crate::Response] node or returned by a [`Fetcher`][crate::Fetcher] operation.
///
/// Errors are cheap to clone: every caller sharing one network call observes the same error
/// value. Use [`kind`](Self::kind) to classify it and [`std::error::Error::source`] to reach
/// the underlying failure.
///
/// # Examples
///
/// ```
/// use fetchline::{Error, ErrorKind};
///
/// let error = Error::aborted();
/// assert!(error.is_aborted());
/// assert!(matches!(error.kind(), ErrorKind::Aborted));
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[error(transparent)]
pub struct Error(ErrorKind);

/// Classification of an [`Error`].
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The fetch was aborted by its caller. Never retried.
    #[error("request aborted")]
    Aborted,

    /// The caller-supplied network operation failed.
    #[error("network operation failed: {0}")]
    Network(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// A cache backend operation failed.
    #[error("cache operation failed: {0}")]
    Cache(#[source] Arc<StoreError>),

    /// The request value could not be turned into a cache key.
    #[error("request cannot be keyed: {0}")]
    InvalidRequest(#[source] Arc<serde_json::Error>),
}

impl Error {
    /// Creates the error every aborted fetch resolves with.
    #[must_use]
    pub const fn aborted() -> Self {
        Self(ErrorKind::Aborted)
    }

    /// Wraps a failure reported by a network operation.
    pub fn network(error: impl Into<BoxError>) -> Self {
        Self(ErrorKind::Network(Arc::from(error.into())))
    }

    pub(crate) fn cache(error: StoreError) -> Self {
        Self(ErrorKind::Cache(Arc::new(error)))
    }

    pub(crate) fn invalid_request(error: serde_json::Error) -> Self {
        Self(ErrorKind::InvalidRequest(Arc::new(error)))
    }

    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Returns `true` if the fetch was aborted.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self.0, ErrorKind::Aborted)
    }
}
