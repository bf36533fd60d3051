// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn lower_priority_value_pops_first() {
    let mut queue = BoundedPriorityQueue::new(10);
    queue.push(5, 30, "periodic").unwrap();
    queue.push(1, -1, "urgent").unwrap();

    assert_eq!(queue.pop().unwrap().collector, "urgent");
    assert_eq!(queue.pop().unwrap().collector, "periodic");
    assert!(queue.pop().is_none());
}

#[test]
fn equal_priorities_keep_arrival_order() {
    let mut queue = BoundedPriorityQueue::new(10);
    for name in ["a", "b", "c"] {
        queue.push(5, 30, name).unwrap();
    }
    let order: Vec<String> = std::iter::from_fn(|| queue.pop().map(|job| job.collector)).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn a_full_queue_rejects_the_push() {
    let mut queue = BoundedPriorityQueue::new(2);
    queue.push(5, 30, "a").unwrap();
    queue.push(5, 30, "b").unwrap();
    assert_eq!(queue.push(5, 30, "c"), Err(QueueFull { capacity: 2 }));
    assert_eq!(queue.len(), 2);
}

#[test]
fn remove_periodic_keeps_one_shot_jobs() {
    let mut queue = BoundedPriorityQueue::new(10);
    queue.push(5, 30, "periodic").unwrap();
    queue.push(1, -1, "once").unwrap();
    queue.push(5, 60, "periodic2").unwrap();

    queue.remove_periodic();

    assert_eq!(queue.len(), 1);
    assert_eq!(queue.pop().unwrap().collector, "once");
}
