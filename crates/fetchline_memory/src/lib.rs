// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-memory cache backends for `fetchline`, backed by moka.
//!
//! - [`MemoryStore`]: a concurrent in-memory [`CacheStore`][fetchline_store::CacheStore]
//! - [`LayeredStore`]: keeps a [`MemoryStore`] in front of a slower store (for example one
//!   that persists to disk) so repeated reads never leave the process
//!
//! # Quick Start
//!
//! ```
//! use fetchline_memory::MemoryStore;
//! use fetchline_store::{CacheStore, CachedEnvelope};
//!
//! # futures::executor::block_on(async {
//! let store = MemoryStore::<String>::with_capacity(1_000);
//! store.set("key", CachedEnvelope::new("value".to_string(), 0)).await?;
//!
//! let envelope = store.get("key").await?.expect("entry was just written");
//! assert_eq!(envelope.data(), "value");
//! # Ok::<(), fetchline_store::StoreError>(())
//! # });
//! ```

mod layered;
mod memory;

#[doc(inline)]
pub use layered::LayeredStore;
#[doc(inline)]
pub use memory::MemoryStore;
