// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    slash24 = { "255.255.255.0", 24 },
    slash16 = { "255.255.0.0", 16 },
    slash30 = { "255.255.255.252", 30 },
    slash0 = { "0.0.0.0", 0 },
)]
fn prefix_from_netmask(mask: &str, expected: u32) {
    assert_eq!(prefix_len(mask), Some(expected));
}

#[test]
fn prefix_rejects_garbage() {
    assert_eq!(prefix_len("not-a-mask"), None);
}

#[test]
fn membership_checks_masked_bits() {
    assert!(host_in_network("192.168.1.42", "192.168.1.0", "255.255.255.0"));
    assert!(!host_in_network("192.168.2.42", "192.168.1.0", "255.255.255.0"));
}

#[test]
fn broadcast_fills_host_bits() {
    assert_eq!(broadcast_address("10.0.0.0", "255.255.255.0").as_deref(), Some("10.0.0.255"));
}

#[test]
fn difference_and_add_are_inverse() {
    assert_eq!(address_difference("10.0.0.50", "10.0.0.0"), Some(50));
    assert_eq!(address_add("10.0.0.0", 50).as_deref(), Some("10.0.0.50"));
}
