// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Source of the random draw behind [`Backoff::JitteredExponential`](crate::Backoff::JitteredExponential).
///
/// Every retry of a jittered fetch asks its `RetryControl` for the next wait, which scales the
/// exponential step by one draw in `[0, 1)`. Fetches draw from the thread-local `fastrand`
/// generator, so concurrent fetches that fail together spread their retries apart. Tests pin the
/// draw with [`Rnd::new_fixed`] to assert exact waits.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) enum Rnd {
    #[default]
    Thread,

    #[cfg(test)]
    Fixed(f64),
}

impl Rnd {
    #[cfg(test)]
    pub const fn new_fixed(value: f64) -> Self {
        Self::Fixed(value)
    }

    /// Returns a value in `[0, 1)`.
    pub fn next_f64(self) -> f64 {
        match self {
            Self::Thread => fastrand::f64(),
            #[cfg(test)]
            Self::Fixed(value) => value,
        }
    }
}
