// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so verification timeouts are testable without sleeping.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of the current time.
///
/// Object-safe so a [`Graph`](crate::Graph) and the runtime driving it can
/// share one `Arc<dyn Clock>`.
pub trait Clock: Send + Sync {
    /// Monotonic instant used for timer deadlines.
    fn now(&self) -> Instant;
    /// Wall-clock seconds since the Unix epoch, used for lifetime stamps.
    fn epoch_secs(&self) -> u64;
}

/// The real system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }
}

/// Controllable clock for tests. `advance` moves both time bases forward.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockInner>>,
}

struct FakeClockInner {
    now: Instant,
    epoch_secs: u64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(FakeClockInner { now: Instant::now(), epoch_secs: 1_700_000_000 })) }
    }

    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock();
        inner.now += by;
        inner.epoch_secs += by.as_secs();
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.lock().now
    }

    fn epoch_secs(&self) -> u64 {
        self.inner.lock().epoch_secs
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
