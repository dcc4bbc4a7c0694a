// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for call sharing and abort through `Fetcher::fetch()`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fetchline::{CancellationToken, Fetcher, MemoryStore, Options};
use futures::future::join_all;
use parking_lot::Mutex;

/// An operation that never settles and records the tokens it was handed.
fn stuck() -> (Fetcher<String, u32>, Arc<Mutex<Vec<CancellationToken>>>) {
    let tokens = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&tokens);
    let fetcher = Fetcher::with_cache(
        move |_request: String, cancel: CancellationToken| {
            seen.lock().push(cancel);
            std::future::pending::<Result<u32, std::io::Error>>()
        },
        Arc::new(MemoryStore::new()),
    );
    (fetcher, tokens)
}

/// Lets every spawned task run until it waits on the network.
async fn settle_tasks() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let fetcher = Fetcher::new(move |request: String, _cancel| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, std::io::Error>(request.len())
        }
    });

    let heads: Vec<_> = (0..10)
        .map(|_| fetcher.fetch("shared".to_string(), Options::new()).response())
        .collect();
    let nodes = join_all(heads).await;

    assert!(nodes.iter().all(|node| node.data() == Some(&6)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fetcher.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn distinct_requests_get_their_own_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let fetcher = Fetcher::new(move |request: u32, _cancel| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, std::io::Error>(request) }
    });

    let heads = [1, 2, 3].map(|request| fetcher.fetch(request, Options::new()).response());
    let nodes = join_all(heads).await;

    let values: Vec<_> = nodes.iter().map(|node| node.data().copied()).collect();
    assert_eq!(values, vec![Some(1), Some(2), Some(3)]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn abort_resolves_without_waiting_for_the_call() {
    let (fetcher, tokens) = stuck();
    let handle = fetcher.fetch("a".to_string(), Options::new());
    tokio::spawn(handle.response());
    settle_tasks().await;
    assert_eq!(fetcher.in_flight(), 1);

    handle.abort();

    let node = tokio::time::timeout(Duration::from_millis(1), handle.response())
        .await
        .expect("an aborted fetch resolves right away");
    assert!(node.is_aborted());
    assert!(node.is_terminal());
    assert!(tokens.lock()[0].is_cancelled());
    assert_eq!(fetcher.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn call_is_cancelled_only_by_the_last_abort() {
    let (fetcher, tokens) = stuck();
    let first = fetcher.fetch("a".to_string(), Options::new());
    let second = fetcher.fetch("a".to_string(), Options::new());
    tokio::spawn(first.response());
    tokio::spawn(second.response());
    settle_tasks().await;

    assert_eq!(tokens.lock().len(), 1);
    let token = tokens.lock()[0].clone();

    first.abort();
    assert!(first.response().await.is_aborted());
    assert!(!token.is_cancelled());
    assert_eq!(fetcher.in_flight(), 1);

    second.abort();
    assert!(second.response().await.is_aborted());
    assert!(token.is_cancelled());
    assert_eq!(fetcher.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn fetch_after_abort_starts_a_new_call() {
    let (fetcher, tokens) = stuck();
    let first = fetcher.fetch("a".to_string(), Options::new());
    tokio::spawn(first.response());
    settle_tasks().await;
    first.abort();

    let second = fetcher.fetch("a".to_string(), Options::new());
    tokio::spawn(second.response());
    settle_tasks().await;

    let tokens = tokens.lock();
    assert_eq!(tokens.len(), 2);
    assert!(tokens[0].is_cancelled());
    assert!(!tokens[1].is_cancelled());
}
