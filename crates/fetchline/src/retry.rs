// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cmp::min;
use std::time::Duration;

use crate::Backoff;
use crate::options::RetryOptions;
use crate::rnd::Rnd;

/// Retry budget and backoff state of one retrying fetch.
#[derive(Debug)]
pub(crate) struct RetryControl {
    options: RetryOptions,
    attempts_used: u32,
    rnd: Rnd,
}

impl RetryControl {
    pub fn new(options: RetryOptions) -> Self {
        Self {
            options,
            attempts_used: 0,
            rnd: Rnd::default(),
        }
    }

    #[cfg(test)]
    pub fn with_rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }

    pub fn can_retry(&self) -> bool {
        self.attempts_used < self.options.times
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Consumes one retry and returns how long to wait before it, or `None` once the budget is spent.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }

        let wait = self.wait_for(self.attempts_used);
        self.attempts_used += 1;
        Some(wait)
    }

    pub fn reset(&mut self) {
        self.attempts_used = 0;
    }

    fn wait_for(&self, attempt: u32) -> Duration {
        let initial = self.options.initial_wait;
        let wait = match self.options.backoff {
            Backoff::Constant => initial,
            Backoff::Exponential => duration_mul_pow2(initial, attempt),
            Backoff::JitteredExponential => {
                // uniform in [1, 2^attempt]
                let factor = (pow2(attempt) - 1.0).mul_add(self.rnd.next_f64(), 1.0);
                duration_mul(initial, factor)
            }
        };

        clamp_to_max(wait, self.options.max_wait)
    }
}

fn pow2(attempt: u32) -> f64 {
    2.0_f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX))
}

fn clamp_to_max(d: Duration, max: Option<Duration>) -> Duration {
    max.map_or(d, |m| min(d, m))
}

fn duration_mul_pow2(base: Duration, attempt: u32) -> Duration {
    1_u32
        .checked_shl(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "jitter only needs nanosecond precision and saturates on overflow"
)]
fn duration_mul(base: Duration, factor: f64) -> Duration {
    let nanos = (base.as_nanos() as f64 * factor).round();
    if nanos <= 0.0 {
        return Duration::ZERO;
    }
    if nanos >= u64::MAX as f64 {
        return Duration::MAX;
    }

    Duration::from_nanos(nanos as u64)
}
