// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-adapters: the pluggable edges of the reconciliation engine.
//!
//! Collectors observe an environment and feed the graph; builders mutate
//! the environment when a plan step calls for it. Only the interfaces and
//! the goal-XML adapter live here; hypervisor, SSH and SNMP adapters are
//! external and register through the same traits.

mod builder;
mod collector;
mod error;
pub mod xml;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use builder::{BuildContext, BuilderFn};
pub use collector::{Collector, CollectorRegistry, ScanContext};
pub use error::{BuildError, CollectorError, XmlError};
pub use xml::XmlCollector;
