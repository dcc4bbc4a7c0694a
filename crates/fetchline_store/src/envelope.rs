// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// A cached value together with the time it was received.
///
/// The timestamp is expressed in milliseconds since the UNIX epoch and always describes when
/// `data` arrived from the network, not when it was written to a backend. Serialized
/// envelopes have the shape `{ "data": ..., "timestamp": ... }`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use fetchline_store::CachedEnvelope;
///
/// let envelope = CachedEnvelope::new(7_u32, 10_000);
/// assert_eq!(*envelope.data(), 7);
/// assert_eq!(envelope.age_at(12_500), Duration::from_millis(2_500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEnvelope<T> {
    data: T,
    timestamp: u64,
}

impl<T> CachedEnvelope<T> {
    /// Creates an envelope for `data` received at `timestamp` (milliseconds since the epoch).
    #[must_use]
    pub const fn new(data: T, timestamp: u64) -> Self {
        Self { data, timestamp }
    }

    /// Returns a reference to the cached value.
    #[must_use]
    pub const fn data(&self) -> &T {
        &self.data
    }

    /// Consumes the envelope and returns the cached value.
    #[must_use]
    pub fn into_data(self) -> T {
        self.data
    }

    /// Returns the receipt time in milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns how old the envelope is at `now_millis`.
    ///
    /// Envelopes stamped in the future have an age of zero.
    #[must_use]
    pub const fn age_at(&self, now_millis: u64) -> Duration {
        Duration::from_millis(now_millis.saturating_sub(self.timestamp))
    }
}

impl<T: Serialize> CachedEnvelope<T> {
    /// Serializes the envelope to JSON for string-backed stores.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if `T` cannot be represented as JSON.
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(StoreError::Decode)
    }
}

impl<T: for<'de> Deserialize<'de>> CachedEnvelope<T> {
    /// Parses an envelope previously produced by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the text is not a valid envelope for `T`.
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        serde_json::from_str(text).map_err(StoreError::Decode)
    }
}
