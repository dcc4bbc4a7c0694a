// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `Fetcher::clear_cache()`.

use std::sync::Arc;
use std::time::Duration;

use fetchline::{CacheMode, CacheStore, CachedEnvelope, Fetcher, MemoryStore, Options, StoreFuture};
use futures::FutureExt;
use tokio::time::Instant;

const REMOVE_DELAY: Duration = Duration::from_secs(1);

/// A memory store whose removals are slow.
#[derive(Debug, Clone)]
struct SlowRemoval(MemoryStore<u32>);

impl CacheStore<u32> for SlowRemoval {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CachedEnvelope<u32>>> {
        self.0.get(key)
    }

    fn set<'a>(&'a self, key: &'a str, envelope: CachedEnvelope<u32>) -> StoreFuture<'a, ()> {
        self.0.set(key, envelope)
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        async move {
            tokio::time::sleep(REMOVE_DELAY).await;
            self.0.remove(key).await
        }
        .boxed()
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        self.0.keys()
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        self.0.clear()
    }
}

fn fetcher(store: &SlowRemoval) -> Fetcher<u32, u32> {
    Fetcher::with_cache(
        |request: u32, _cancel| async move { Ok::<_, std::io::Error>(request + 1) },
        Arc::new(store.clone()),
    )
}

#[tokio::test(start_paused = true)]
async fn reads_wait_for_a_running_clear() {
    let store = SlowRemoval(MemoryStore::new());
    let fetcher = Arc::new(fetcher(&store));
    let _ = fetcher.fetch(1, Options::new()).response().await;

    let clearing = Arc::clone(&fetcher);
    let clear = tokio::spawn(async move { clearing.clear_cache(None, None).await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    let start = Instant::now();
    let head = fetcher
        .fetch(1, Options::new().cache_mode(CacheMode::OnlyIfCached))
        .response()
        .await;

    assert!(start.elapsed() >= REMOVE_DELAY - Duration::from_millis(1));
    assert_eq!(head.data(), None);
    clear.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn max_age_keeps_younger_entries() {
    let store = SlowRemoval(MemoryStore::new());
    let fetcher = fetcher(&store);
    let _ = fetcher.fetch(1, Options::new().cache_key("old")).response().await;
    tokio::time::advance(Duration::from_secs(120)).await;
    let _ = fetcher.fetch(2, Options::new().cache_key("young")).response().await;

    fetcher.clear_cache(Some(Duration::from_secs(60)), None).await.unwrap();

    let mut keys = store.keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["fetchline:young".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn cleared_entries_are_fetched_again() {
    let store = SlowRemoval(MemoryStore::new());
    let fetcher = fetcher(&store);
    let _ = fetcher.fetch(1, Options::new()).response().await;

    fetcher.clear_cache(None, None).await.unwrap();
    let head = fetcher.fetch(1, Options::new()).response().await;

    assert_eq!(head.data(), Some(&2));
    assert!(head.is_terminal());
}
