// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named timer wheel for collector and exporter scheduling.
//!
//! Timers are deadline records; the environment loop polls [`Scheduler::fired`]
//! with the current instant and reacts to the names that came due. Pausing
//! the wheel is what keeps periodic collection quiet during deployment.

use indexmap::IndexMap;
use std::time::Instant;
use trellis_core::{Timer, Ttl};

#[derive(Debug, Default)]
pub struct Scheduler {
    timers: IndexMap<String, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the named timer.
    pub fn set_timer(&mut self, name: &str, ttl: Ttl, now: Instant) {
        self.timers.insert(name.to_string(), Timer::started(ttl, now));
    }

    pub fn cancel(&mut self, name: &str) {
        if let Some(timer) = self.timers.get_mut(name) {
            timer.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        for timer in self.timers.values_mut() {
            timer.cancel();
        }
    }

    pub fn pause_all(&mut self, now: Instant) {
        for timer in self.timers.values_mut() {
            timer.pause(now);
        }
    }

    pub fn resume_all(&mut self, now: Instant) {
        for timer in self.timers.values_mut() {
            timer.resume(now);
        }
    }

    /// Names whose deadline has passed. Fired timers stay disarmed until
    /// re-armed by the caller.
    pub fn fired(&mut self, now: Instant) -> Vec<String> {
        let mut due = Vec::new();
        for (name, timer) in self.timers.iter_mut() {
            if timer.fire_due(now) {
                due.push(name.clone());
            }
        }
        due
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().filter_map(Timer::deadline).min()
    }

    pub fn is_armed(&self, name: &str) -> bool {
        self.timers.get(name).and_then(Timer::deadline).is_some()
    }

    pub fn has_timers(&self) -> bool {
        self.timers.values().any(|timer| timer.deadline().is_some())
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
