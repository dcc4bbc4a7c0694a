// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

/// Namespaces keys inside a backend that may be shared with other users.
///
/// # Examples
///
/// ```
/// use fetchline_store::KeyPrefix;
///
/// let prefix = KeyPrefix::new("app:");
/// let full = prefix.apply("abc");
/// assert!(prefix.matches(&full));
/// assert_eq!(prefix.strip(&full), Some("abc"));
/// assert_eq!(prefix.strip("other:abc"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyPrefix(Cow<'static, str>);

impl KeyPrefix {
    /// Creates a prefix helper.
    #[must_use]
    pub fn new(prefix: impl Into<Cow<'static, str>>) -> Self {
        Self(prefix.into())
    }

    /// Returns the raw prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prepends the prefix to `key`.
    #[must_use]
    pub fn apply(&self, key: &str) -> String {
        let mut full = String::with_capacity(self.0.len() + key.len());
        full.push_str(&self.0);
        full.push_str(key);
        full
    }

    /// Returns `true` if `full_key` lives under this prefix.
    #[must_use]
    pub fn matches(&self, full_key: &str) -> bool {
        full_key.starts_with(self.0.as_ref())
    }

    /// Removes the prefix from `full_key`, or returns `None` if it is not under this prefix.
    #[must_use]
    pub fn strip<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        full_key.strip_prefix(self.0.as_ref())
    }
}

impl From<&'static str> for KeyPrefix {
    fn from(prefix: &'static str) -> Self {
        Self::new(prefix)
    }
}

impl From<String> for KeyPrefix {
    fn from(prefix: String) -> Self {
        Self::new(prefix)
    }
}
