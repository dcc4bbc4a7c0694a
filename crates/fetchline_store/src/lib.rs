// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Storage contract for `fetchline` response caches.
//!
//! This crate defines the small surface a cache backend has to provide so that the
//! `fetchline` engine can serve cached responses:
//!
//! - [`CacheStore`]: an async key/value store with `get`, `set`, `remove`, `keys` and `clear`
//! - [`CachedEnvelope`]: the stored value paired with the time it was received
//! - [`StoreError`]: the error type every backend reports
//! - [`KeyPrefix`]: helper for namespacing keys inside a shared backend
//!
//! Backends live in their own crates (see `fetchline_memory`), the engine only depends on
//! the trait.
//!
//! # Example
//!
//! ```
//! use fetchline_store::{CachedEnvelope, KeyPrefix};
//!
//! let prefix = KeyPrefix::new("users:");
//! let key = prefix.apply("42");
//! assert_eq!(key, "users:42");
//!
//! let envelope = CachedEnvelope::new("alice".to_string(), 1_700_000_000_000);
//! let json = envelope.to_json()?;
//! let back: CachedEnvelope<String> = CachedEnvelope::from_json(&json)?;
//! assert_eq!(back, envelope);
//! # Ok::<(), fetchline_store::StoreError>(())
//! ```

mod envelope;
mod error;
mod prefix;
mod store;

#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use envelope::CachedEnvelope;
#[doc(inline)]
pub use error::{Result, StoreError};
#[doc(inline)]
pub use prefix::KeyPrefix;
#[doc(inline)]
pub use store::{CacheStore, StoreFuture};
