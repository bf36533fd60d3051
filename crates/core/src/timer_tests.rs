// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, FakeClock};

#[test]
fn fires_after_duration() {
    let clock = FakeClock::new();
    let mut timer = Timer::started(Ttl::secs(10), clock.now());

    clock.advance(Duration::from_secs(5));
    assert!(!timer.fire_due(clock.now()));
    assert!(!timer.is_over());

    clock.advance(Duration::from_secs(5));
    assert!(timer.fire_due(clock.now()));
    assert!(timer.is_over());

    // A fired timer does not fire twice.
    assert!(!timer.fire_due(clock.now()));
}

#[test]
fn pause_preserves_remaining_duration() {
    let clock = FakeClock::new();
    let mut timer = Timer::started(Ttl::secs(10), clock.now());

    clock.advance(Duration::from_secs(4));
    timer.pause(clock.now());

    // Time passing while paused is not counted.
    clock.advance(Duration::from_secs(60));
    assert!(!timer.fire_due(clock.now()));

    timer.resume(clock.now());
    clock.advance(Duration::from_secs(5));
    assert!(!timer.fire_due(clock.now()));
    clock.advance(Duration::from_secs(1));
    assert!(timer.fire_due(clock.now()));
}

#[test]
fn resume_without_pause_starts_fresh() {
    let clock = FakeClock::new();
    let mut timer = Timer::new(Ttl::secs(3));

    timer.resume(clock.now());
    clock.advance(Duration::from_secs(3));
    assert!(timer.fire_due(clock.now()));
}

#[test]
fn cancel_disarms() {
    let clock = FakeClock::new();
    let mut timer = Timer::started(Ttl::secs(1), clock.now());
    timer.cancel();

    clock.advance(Duration::from_secs(5));
    assert!(!timer.fire_due(clock.now()));
    assert_eq!(timer.state(), TimerState::Cancelled);
}

#[test]
fn forever_never_arms() {
    let clock = FakeClock::new();
    let mut timer = Timer::started(Ttl::Forever, clock.now());
    assert_eq!(timer.state(), TimerState::Idle);
    assert!(timer.deadline().is_none());

    timer.pause(clock.now());
    timer.resume(clock.now());
    clock.advance(Duration::from_secs(1_000_000));
    assert!(!timer.fire_due(clock.now()));
}

#[test]
fn negative_interval_maps_to_forever() {
    assert_eq!(Ttl::from_interval(-1), Ttl::Forever);
    assert_eq!(Ttl::from_interval(30), Ttl::secs(30));
}
