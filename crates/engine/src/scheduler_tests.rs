// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use trellis_core::{Clock, FakeClock};

#[test]
fn scheduler_timer_lifecycle() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();

    scheduler.set_timer("netscan", Ttl::secs(10), clock.now());
    assert!(scheduler.has_timers());
    assert!(scheduler.next_deadline().is_some());

    clock.advance(Duration::from_secs(5));
    assert!(scheduler.fired(clock.now()).is_empty());
    assert!(scheduler.has_timers());

    clock.advance(Duration::from_secs(10));
    assert_eq!(scheduler.fired(clock.now()), vec!["netscan".to_string()]);
    assert!(!scheduler.has_timers());
}

#[test]
fn scheduler_cancel_timer() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();

    scheduler.set_timer("netscan", Ttl::secs(10), clock.now());
    scheduler.cancel("netscan");

    clock.advance(Duration::from_secs(15));
    assert!(scheduler.fired(clock.now()).is_empty());
}

#[test]
fn pause_and_resume_keep_the_remainder() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();
    scheduler.set_timer("netscan", Ttl::secs(10), clock.now());

    clock.advance(Duration::from_secs(4));
    scheduler.pause_all(clock.now());
    clock.advance(Duration::from_secs(500));
    assert!(scheduler.fired(clock.now()).is_empty());

    scheduler.resume_all(clock.now());
    clock.advance(Duration::from_secs(5));
    assert!(scheduler.fired(clock.now()).is_empty());
    clock.advance(Duration::from_secs(1));
    assert_eq!(scheduler.fired(clock.now()), vec!["netscan".to_string()]);
}

#[test]
fn fired_reports_every_due_timer_once() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();
    scheduler.set_timer("a", Ttl::secs(1), clock.now());
    scheduler.set_timer("b", Ttl::secs(2), clock.now());

    clock.advance(Duration::from_secs(3));
    let mut due = scheduler.fired(clock.now());
    due.sort();
    assert_eq!(due, vec!["a".to_string(), "b".to_string()]);
    assert!(scheduler.fired(clock.now()).is_empty());
}
