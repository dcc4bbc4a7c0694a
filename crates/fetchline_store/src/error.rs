// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// The result type for cache store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// An error reported by a [`CacheStore`][crate::CacheStore] backend.
///
/// A missing key is never an error. Backends report `Ok(None)` for misses and treat removal of
/// unknown keys as a no-op.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A stored value could not be decoded (or encoded) as a [`CachedEnvelope`][crate::CachedEnvelope].
    #[error("failed to decode cached envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// The backend itself failed.
    #[error("cache backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl StoreError {
    /// Wraps an arbitrary backend failure.
    pub fn backend(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self::Backend(error.into())
    }

    /// Returns `true` if the stored value was unreadable rather than the backend failing.
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
