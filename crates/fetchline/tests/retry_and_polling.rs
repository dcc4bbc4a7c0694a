// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for retrying and polling fetches.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fetchline::{Backoff, CacheMode, Fetcher, Options, collapse_to_final, for_each_response};
use fetchline_store::testing::MockStore;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::time::Instant;

const SETTLE: Duration = Duration::from_millis(100);

/// Takes `SETTLE` per call, fails the first `failures` calls and then returns the call number.
fn flaky(failures: usize) -> (Fetcher<(), usize>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let fetcher = Fetcher::new(move |(): (), _cancel| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(SETTLE).await;
            if n < failures {
                Err(std::io::Error::other(format!("failure {n}")))
            } else {
                Ok(n)
            }
        }
    });
    (fetcher, calls)
}

fn constant_retries(times: u32, wait: Duration) -> Options<usize> {
    Options::new()
        .retry_times(times)
        .retry_backoff(Backoff::Constant)
        .retry_initial_wait_time(wait)
}

#[tokio::test(start_paused = true)]
async fn three_retries_make_four_attempts() {
    let (fetcher, calls) = flaky(usize::MAX);
    let start = Instant::now();

    let error = collapse_to_final(fetcher.fetch((), constant_retries(3, Duration::from_secs(1))).response())
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(start.elapsed(), SETTLE * 4 + Duration::from_secs(3));
    assert!(error.to_string().contains("failure 3"));
}

#[tokio::test(start_paused = true)]
async fn retry_recovers_from_transient_failures() {
    let (fetcher, calls) = flaky(2);

    let nodes: Vec<_> = fetcher
        .fetch((), constant_retries(3, Duration::from_millis(50)))
        .into_stream()
        .collect()
        .await;

    assert_eq!(nodes.len(), 2);
    assert!(nodes[0].error().is_some());
    assert_eq!(nodes[1].data(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_can_be_switched_off() {
    let (fetcher, calls) = flaky(usize::MAX);
    let options = constant_retries(3, Duration::from_millis(50)).retry_on_error(false);

    let nodes: Vec<_> = fetcher.fetch((), options).into_stream().collect().await;

    assert_eq!(nodes.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn configured_defaults_apply_to_every_fetch() {
    let (fetcher, calls) = flaky(1);
    fetcher.configure(constant_retries(1, Duration::from_millis(50)));

    let value = collapse_to_final(fetcher.fetch((), Options::new()).response()).await.unwrap();

    assert_eq!(value, Some(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn polling_rounds_wait_after_each_settle() {
    let (fetcher, calls) = flaky(0);
    let wait = Duration::from_secs(5);
    let options = Options::new()
        .polling_wait_time(wait)
        .cache_min_fresh(Duration::from_secs(3600));
    let start = Instant::now();

    let mut nodes = fetcher.fetch((), options).into_stream();
    let mut seen = Vec::new();
    for _ in 0..3 {
        let node = nodes.next().await.unwrap();
        seen.push((node.data().copied(), start.elapsed()));
    }

    // later rounds call the network even though the cache is fresh
    assert_eq!(
        seen,
        vec![
            (Some(0), SETTLE),
            (Some(1), SETTLE * 2 + wait),
            (Some(2), SETTLE * 3 + wait * 2),
        ]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn polling_first_round_honors_the_cache_mode() {
    let (fetcher, calls) = flaky(0);
    let _ = fetcher.fetch((), Options::new()).response().await;

    let options = Options::new()
        .polling_wait_time(Duration::from_secs(1))
        .cache_mode(CacheMode::OnlyIfCached);
    let mut nodes = fetcher.fetch((), options).into_stream();

    assert_eq!(nodes.next().await.unwrap().data(), Some(&0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(nodes.next().await.unwrap().data(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn aborting_a_visited_poll_stops_it() {
    let (fetcher, calls) = flaky(0);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let handle = fetcher.fetch((), Options::new().polling_wait_time(Duration::from_secs(1)));
    let abort = for_each_response(handle, move |node| {
        sink.lock().push((node.data().copied(), node.is_aborted()));
    });

    // three rounds settle by 2.3s
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    abort.abort();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[..3], [(Some(0), false), (Some(1), false), (Some(2), false)]);
    assert_eq!(seen[3], (None, true));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Decrements a live-instance counter when dropped.
struct Tracked(Arc<AtomicUsize>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn consumed_poll_rounds_are_released() {
    let live = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&live);
    let fetcher = Fetcher::with_cache(
        move |(): (), _cancel| {
            counter.fetch_add(1, Ordering::SeqCst);
            let value = Arc::new(Tracked(Arc::clone(&counter)));
            async move { Ok::<_, std::io::Error>(value) }
        },
        Arc::new(MockStore::new()),
    );

    let handle = fetcher.fetch((), Options::new().polling_wait_time(Duration::from_millis(10)));
    let abort = handle.abort_handle();
    let mut nodes = handle.into_stream();
    for _ in 0..200 {
        let node = nodes.next().await.unwrap();
        assert!(node.data().is_some());
    }

    // the cached entry and the latest round may still hold a value
    assert!(live.load(Ordering::SeqCst) < 10);
    abort.abort();
}
