// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Wall-clock time that follows the tokio timer.
///
/// The clock captures the system time once and advances it with [`tokio::time::Instant`], so
/// cache timestamps move together with timers, including under paused test time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    system_anchor: SystemTime,
    instant_anchor: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            system_anchor: SystemTime::now(),
            instant_anchor: Instant::now(),
        }
    }

    /// Milliseconds since the UNIX epoch.
    pub fn now_millis(&self) -> u64 {
        let now = self.system_anchor + self.instant_anchor.elapsed();
        now.duration_since(UNIX_EPOCH)
            .map_or(0, |since_epoch| u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX))
    }

    /// Age of a value received at `timestamp` milliseconds, zero for future timestamps.
    pub fn age_of(&self, timestamp: u64) -> Duration {
        Duration::from_millis(self.now_millis().saturating_sub(timestamp))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
