// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pausable one-shot timers.
//!
//! A [`Timer`] is a deadline record, not a running thread: the loop that owns
//! it polls [`Timer::fire_due`] with the current instant and reacts when the
//! deadline has passed. Pausing remembers the remaining duration so a later
//! resume re-arms for exactly the remainder, which is what lets a frozen
//! environment sit under deployment without losing verifications.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Verification lifetime requested by a collector.
///
/// `Forever` corresponds to the `-1` interval convention used by static
/// sources such as the XML collector: the timer never arms and never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ttl {
    Forever,
    After(Duration),
}

impl Ttl {
    pub fn secs(secs: u64) -> Self {
        Ttl::After(Duration::from_secs(secs))
    }

    /// Interpret a configured interval where any negative value means forever.
    pub fn from_interval(secs: i64) -> Self {
        if secs < 0 {
            Ttl::Forever
        } else {
            Ttl::After(Duration::from_secs(secs as u64))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed { deadline: Instant },
    Paused { remaining: Duration },
    Fired,
    Cancelled,
}

/// One-shot countdown with pause/resume.
#[derive(Debug, Clone)]
pub struct Timer {
    ttl: Ttl,
    state: TimerState,
}

impl Timer {
    pub fn new(ttl: Ttl) -> Self {
        Self { ttl, state: TimerState::Idle }
    }

    /// Create and immediately arm.
    pub fn started(ttl: Ttl, now: Instant) -> Self {
        let mut timer = Self::new(ttl);
        timer.start(now);
        timer
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Arm the timer for its full duration. No-op for `Ttl::Forever`.
    pub fn start(&mut self, now: Instant) {
        if let Ttl::After(duration) = self.ttl {
            self.state = TimerState::Armed { deadline: now + duration };
        }
    }

    /// Disarm and remember how much time was left.
    pub fn pause(&mut self, now: Instant) {
        if let TimerState::Armed { deadline } = self.state {
            self.state = TimerState::Paused { remaining: deadline.saturating_duration_since(now) };
        }
    }

    /// Re-arm for the remaining duration. Starting fresh if never paused
    /// mirrors resuming an environment whose timers were created mid-freeze.
    pub fn resume(&mut self, now: Instant) {
        match self.state {
            TimerState::Paused { remaining } => {
                self.state = TimerState::Armed { deadline: now + remaining };
            }
            TimerState::Idle => self.start(now),
            _ => {}
        }
    }

    pub fn cancel(&mut self) {
        if !matches!(self.state, TimerState::Fired) {
            self.state = TimerState::Cancelled;
        }
    }

    /// Deadline if currently armed.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TimerState::Armed { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Transition to `Fired` when the deadline has passed; returns whether
    /// this call performed the transition.
    pub fn fire_due(&mut self, now: Instant) -> bool {
        if let TimerState::Armed { deadline } = self.state {
            if deadline <= now {
                self.state = TimerState::Fired;
                return true;
            }
        }
        false
    }

    /// Whether the timer has fired.
    pub fn is_over(&self) -> bool {
        matches!(self.state, TimerState::Fired)
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
