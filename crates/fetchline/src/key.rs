// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

use serde::Serialize;
use xxhash_rust::xxh3::xxh3_128;

use crate::Error;

/// Identifies one logical request for caching and coalescing.
///
/// Keys are either supplied by the caller or derived from the request value: the value is
/// serialized to a canonical JSON tree (object members sorted by name), hashed with XXH3-128
/// and rendered as 32 lowercase hex digits. Equal request values always produce equal keys.
///
/// # Examples
///
/// ```
/// use fetchline::RequestKey;
///
/// let a = RequestKey::from_request(&("users", 7))?;
/// let b = RequestKey::from_request(&("users", 7))?;
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 32);
/// assert_ne!(a, RequestKey::from_request(&("users", 8))?);
/// # Ok::<(), fetchline::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    /// Derives the key of a request value.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidRequest`][crate::ErrorKind::InvalidRequest] error if the
    /// value cannot be represented as JSON, for example a map with non-string keys.
    pub fn from_request<R>(request: &R) -> Result<Self, Error>
    where
        R: Serialize + ?Sized,
    {
        let canonical = serde_json::to_value(request).map_err(Error::invalid_request)?;
        let bytes = serde_json::to_vec(&canonical).map_err(Error::invalid_request)?;
        Ok(Self(format!("{:032x}", xxh3_128(&bytes))))
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for RequestKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
