// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use fetchline_store::{CacheStore, KeyPrefix};

const DEFAULT_KEY_PREFIX: &str = "fetchline:";
const DEFAULT_MIN_FRESH: Duration = Duration::from_secs(1);
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);
const DEFAULT_RETRY_TIMES: u32 = 3;
const DEFAULT_BACKOFF: Backoff = Backoff::Exponential;
const DEFAULT_INITIAL_WAIT: Duration = Duration::from_secs(1);

/// Decides when a cached value may be served and whether a network result is written back.
///
/// | Mode | Served without a network call | Cache read | Cache write |
/// |---|---|---|---|
/// | [`Default`](Self::Default) | entry younger than `cache_min_fresh` | entries older than `cache_max_age` are ignored | yes |
/// | [`NoStore`](Self::NoStore) | never | skipped | skipped |
/// | [`NoCache`](Self::NoCache) | never | skipped | yes |
/// | [`ForceLoad`](Self::ForceLoad) | never | yes | yes |
/// | [`ForceCache`](Self::ForceCache) | any entry | yes, regardless of age | yes |
/// | [`OnlyIfCached`](Self::OnlyIfCached) | always, the network is never called | yes, regardless of age | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CacheMode {
    /// Serve fresh entries, revalidate stale ones.
    #[default]
    Default,
    /// Bypass the cache entirely.
    NoStore,
    /// Always hit the network but keep the cache up to date.
    NoCache,
    /// Show cached data while always revalidating.
    ForceLoad,
    /// Serve any cached entry, hit the network only when nothing is cached.
    ForceCache,
    /// Serve whatever is cached and never hit the network.
    OnlyIfCached,
}

/// Wait-time policy between retry attempts.
///
/// The wait before retry `n` (0-based) is derived from the initial wait `w`:
///
/// - [`Constant`](Self::Constant): `w`
/// - [`Exponential`](Self::Exponential): `w * 2^n`
/// - [`JitteredExponential`](Self::JitteredExponential): `w * r` with `r` uniform in `[1, 2^n]`
///
/// Every result is capped by the maximum wait when one is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Backoff {
    /// The same wait before every retry.
    Constant,
    /// Doubling waits.
    Exponential,
    /// Doubling upper bound with a uniformly random wait below it.
    JitteredExponential,
}

/// Partial fetch configuration.
///
/// Every field is optional. A [`Fetcher`][crate::Fetcher] resolves a fetch's effective
/// configuration in this order: per-call options, then the instance defaults set with
/// [`Fetcher::configure`][crate::Fetcher::configure], then the built-in defaults below.
///
/// | Option | Built-in default |
/// |---|---|
/// | `cache` | the store the fetcher was created with |
/// | `cache_mode` | [`CacheMode::Default`] |
/// | `cache_key_prefix` | `"fetchline:"` |
/// | `cache_min_fresh` | 1 second |
/// | `cache_max_age` | 1 hour |
/// | `cache_key` | a hash of the request value |
/// | `polling_wait_time` | none, no polling |
/// | `retry_on_error` | off, unless `retry_times` is set above zero |
/// | `retry_times` | 3 |
/// | `retry_backoff` | [`Backoff::Exponential`] |
/// | `retry_initial_wait_time` | 1 second |
/// | `retry_max_wait_time` | none |
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use fetchline::{Backoff, CacheMode, Options};
///
/// let options = Options::<String>::new()
///     .cache_mode(CacheMode::ForceCache)
///     .retry_times(5)
///     .retry_backoff(Backoff::Constant)
///     .retry_initial_wait_time(Duration::from_millis(250));
/// # let _ = options;
/// ```
pub struct Options<T> {
    pub(crate) cache: Option<Arc<dyn CacheStore<T>>>,
    pub(crate) cache_mode: Option<CacheMode>,
    pub(crate) cache_key_prefix: Option<KeyPrefix>,
    pub(crate) cache_min_fresh: Option<Duration>,
    pub(crate) cache_max_age: Option<Duration>,
    pub(crate) cache_key: Option<String>,
    pub(crate) polling_wait_time: Option<Duration>,
    pub(crate) retry_on_error: Option<bool>,
    pub(crate) retry_times: Option<u32>,
    pub(crate) retry_backoff: Option<Backoff>,
    pub(crate) retry_initial_wait_time: Option<Duration>,
    pub(crate) retry_max_wait_time: Option<Duration>,
}

impl<T> Clone for Options<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            cache_mode: self.cache_mode,
            cache_key_prefix: self.cache_key_prefix.clone(),
            cache_min_fresh: self.cache_min_fresh,
            cache_max_age: self.cache_max_age,
            cache_key: self.cache_key.clone(),
            polling_wait_time: self.polling_wait_time,
            retry_on_error: self.retry_on_error,
            retry_times: self.retry_times,
            retry_backoff: self.retry_backoff,
            retry_initial_wait_time: self.retry_initial_wait_time,
            retry_max_wait_time: self.retry_max_wait_time,
        }
    }
}

impl<T> Default for Options<T> {
    fn default() -> Self {
        Self {
            cache: None,
            cache_mode: None,
            cache_key_prefix: None,
            cache_min_fresh: None,
            cache_max_age: None,
            cache_key: None,
            polling_wait_time: None,
            retry_on_error: None,
            retry_times: None,
            retry_backoff: None,
            retry_initial_wait_time: None,
            retry_max_wait_time: None,
        }
    }
}

impl<T> Debug for Options<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("cache", &self.cache)
            .field("cache_mode", &self.cache_mode)
            .field("cache_key_prefix", &self.cache_key_prefix)
            .field("cache_min_fresh", &self.cache_min_fresh)
            .field("cache_max_age", &self.cache_max_age)
            .field("cache_key", &self.cache_key)
            .field("polling_wait_time", &self.polling_wait_time)
            .field("retry_on_error", &self.retry_on_error)
            .field("retry_times", &self.retry_times)
            .field("retry_backoff", &self.retry_backoff)
            .field("retry_initial_wait_time", &self.retry_initial_wait_time)
            .field("retry_max_wait_time", &self.retry_max_wait_time)
            .finish()
    }
}

impl<T> Options<T> {
    /// Creates options with every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache backend.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheStore<T>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the cache mode.
    #[must_use]
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = Some(mode);
        self
    }

    /// Sets the prefix put in front of every key written to the cache backend.
    #[must_use]
    pub fn cache_key_prefix(mut self, prefix: impl Into<KeyPrefix>) -> Self {
        self.cache_key_prefix = Some(prefix.into());
        self
    }

    /// Sets how long a cached value is served under [`CacheMode::Default`] without revalidating.
    #[must_use]
    pub fn cache_min_fresh(mut self, min_fresh: Duration) -> Self {
        self.cache_min_fresh = Some(min_fresh);
        self
    }

    /// Sets the age past which [`CacheMode::Default`] ignores a cached value.
    #[must_use]
    pub fn cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = Some(max_age);
        self
    }

    /// Uses `key` instead of a hash of the request value for caching and coalescing.
    #[must_use]
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Re-runs the fetch indefinitely, waiting `wait` after each round settles.
    #[must_use]
    pub fn polling_wait_time(mut self, wait: Duration) -> Self {
        self.polling_wait_time = Some(wait);
        self
    }

    /// Turns retrying of failed network calls on or off.
    #[must_use]
    pub fn retry_on_error(mut self, enabled: bool) -> Self {
        self.retry_on_error = Some(enabled);
        self
    }

    /// Sets the number of retries after the first attempt.
    ///
    /// A non-zero value turns retrying on unless [`retry_on_error`](Self::retry_on_error) was
    /// explicitly set to `false`.
    #[must_use]
    pub fn retry_times(mut self, times: u32) -> Self {
        self.retry_times = Some(times);
        self
    }

    /// Sets the wait-time policy between retries.
    #[must_use]
    pub fn retry_backoff(mut self, backoff: Backoff) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    /// Sets the wait before the first retry.
    #[must_use]
    pub fn retry_initial_wait_time(mut self, wait: Duration) -> Self {
        self.retry_initial_wait_time = Some(wait);
        self
    }

    /// Caps the wait before any retry.
    #[must_use]
    pub fn retry_max_wait_time(mut self, wait: Duration) -> Self {
        self.retry_max_wait_time = Some(wait);
        self
    }

    /// Returns `self` with unset fields taken from `defaults`.
    pub(crate) fn or(self, defaults: &Self) -> Self {
        Self {
            cache: self.cache.or_else(|| defaults.cache.clone()),
            cache_mode: self.cache_mode.or(defaults.cache_mode),
            cache_key_prefix: self.cache_key_prefix.or_else(|| defaults.cache_key_prefix.clone()),
            cache_min_fresh: self.cache_min_fresh.or(defaults.cache_min_fresh),
            cache_max_age: self.cache_max_age.or(defaults.cache_max_age),
            cache_key: self.cache_key.or_else(|| defaults.cache_key.clone()),
            polling_wait_time: self.polling_wait_time.or(defaults.polling_wait_time),
            retry_on_error: self.retry_on_error.or(defaults.retry_on_error),
            retry_times: self.retry_times.or(defaults.retry_times),
            retry_backoff: self.retry_backoff.or(defaults.retry_backoff),
            retry_initial_wait_time: self.retry_initial_wait_time.or(defaults.retry_initial_wait_time),
            retry_max_wait_time: self.retry_max_wait_time.or(defaults.retry_max_wait_time),
        }
    }

    /// Fills every unset field with its built-in default.
    pub(crate) fn resolve(self, default_cache: &Arc<dyn CacheStore<T>>) -> ResolvedOptions<T> {
        let retry_enabled = match self.retry_on_error {
            Some(enabled) => enabled,
            None => self.retry_times.is_some_and(|times| times > 0),
        };

        ResolvedOptions {
            cache: self.cache.unwrap_or_else(|| Arc::clone(default_cache)),
            cache_mode: self.cache_mode.unwrap_or_default(),
            cache_key_prefix: self.cache_key_prefix.unwrap_or_else(|| KeyPrefix::new(DEFAULT_KEY_PREFIX)),
            cache_min_fresh: self.cache_min_fresh.unwrap_or(DEFAULT_MIN_FRESH),
            cache_max_age: self.cache_max_age.unwrap_or(DEFAULT_MAX_AGE),
            cache_key: self.cache_key,
            polling_wait_time: self.polling_wait_time,
            retry_enabled,
            retry: RetryOptions {
                times: self.retry_times.unwrap_or(DEFAULT_RETRY_TIMES),
                backoff: self.retry_backoff.unwrap_or(DEFAULT_BACKOFF),
                initial_wait: self.retry_initial_wait_time.unwrap_or(DEFAULT_INITIAL_WAIT),
                max_wait: self.retry_max_wait_time,
            },
        }
    }
}

/// Fully populated configuration of one fetch.
pub(crate) struct ResolvedOptions<T> {
    pub cache: Arc<dyn CacheStore<T>>,
    pub cache_mode: CacheMode,
    pub cache_key_prefix: KeyPrefix,
    pub cache_min_fresh: Duration,
    pub cache_max_age: Duration,
    pub cache_key: Option<String>,
    pub polling_wait_time: Option<Duration>,
    pub retry_enabled: bool,
    pub retry: RetryOptions,
}

impl<T> Clone for ResolvedOptions<T> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            cache_mode: self.cache_mode,
            cache_key_prefix: self.cache_key_prefix.clone(),
            cache_min_fresh: self.cache_min_fresh,
            cache_max_age: self.cache_max_age,
            cache_key: self.cache_key.clone(),
            polling_wait_time: self.polling_wait_time,
            retry_enabled: self.retry_enabled,
            retry: self.retry.clone(),
        }
    }
}

impl<T> ResolvedOptions<T> {
    pub fn with_cache_mode(&self, cache_mode: CacheMode) -> Self {
        Self { cache_mode, ..self.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetryOptions {
    pub times: u32,
    pub backoff: Backoff,
    pub initial_wait: Duration,
    pub max_wait: Option<Duration>,
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use fetchline_store::testing::MockStore;

    use super::*;

    fn store() -> Arc<dyn CacheStore<u32>> {
        Arc::new(MockStore::<u32>::new())
    }

    #[test]
    fn resolve_uses_built_in_defaults() {
        let resolved = Options::<u32>::new().resolve(&store());

        assert_eq!(resolved.cache_mode, CacheMode::Default);
        assert_eq!(resolved.cache_key_prefix.as_str(), "fetchline:");
        assert_eq!(resolved.cache_min_fresh, Duration::from_secs(1));
        assert_eq!(resolved.cache_max_age, Duration::from_secs(3600));
        assert_eq!(resolved.cache_key, None);
        assert_eq!(resolved.polling_wait_time, None);
        assert!(!resolved.retry_enabled);
        assert_eq!(
            resolved.retry,
            RetryOptions {
                times: 3,
                backoff: Backoff::Exponential,
                initial_wait: Duration::from_secs(1),
                max_wait: None,
            }
        );
    }

    #[test]
    fn per_call_options_win_over_defaults() {
        let defaults = Options::<u32>::new()
            .cache_mode(CacheMode::ForceCache)
            .cache_min_fresh(Duration::from_secs(5))
            .cache_key_prefix("app:");
        let merged = Options::new().cache_mode(CacheMode::NoCache).or(&defaults);

        assert_eq!(merged.cache_mode, Some(CacheMode::NoCache));
        assert_eq!(merged.cache_min_fresh, Some(Duration::from_secs(5)));
        assert_eq!(merged.cache_key_prefix.map(|p| p.as_str().to_owned()), Some("app:".to_owned()));
    }

    #[test]
    fn retry_times_enables_retry() {
        assert!(Options::<u32>::new().retry_times(2).resolve(&store()).retry_enabled);
        assert!(!Options::<u32>::new().retry_times(0).resolve(&store()).retry_enabled);
    }

    #[test]
    fn explicit_retry_on_error_wins() {
        let disabled = Options::<u32>::new().retry_times(4).retry_on_error(false).resolve(&store());
        assert!(!disabled.retry_enabled);

        let enabled = Options::<u32>::new().retry_on_error(true).resolve(&store());
        assert!(enabled.retry_enabled);
        assert_eq!(enabled.retry.times, 3);
    }

    #[test]
    fn with_cache_mode_keeps_other_fields() {
        let resolved = Options::<u32>::new()
            .cache_key("fixed")
            .polling_wait_time(Duration::from_secs(2))
            .resolve(&store());
        let forced = resolved.with_cache_mode(CacheMode::NoCache);

        assert_eq!(forced.cache_mode, CacheMode::NoCache);
        assert_eq!(forced.cache_key.as_deref(), Some("fixed"));
        assert_eq!(forced.polling_wait_time, Some(Duration::from_secs(2)));
        assert!(Arc::ptr_eq(&forced.cache, &resolved.cache));
    }
}
