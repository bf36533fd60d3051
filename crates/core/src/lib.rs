// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-core: the typed infrastructure graph and its building blocks.
//!
//! Holds the pausable [`Timer`], the [`Clock`] abstraction, the multi-
//! subscriber [`EventBus`], the entity data model, and the verification-
//! tracked property [`Graph`] with its per-type factories.

pub mod clock;
pub mod entity;
pub mod event;
pub mod graph;
pub mod ipnet;
pub mod timer;

pub use clock::{Clock, FakeClock, SystemClock};
pub use entity::{
    interface_id_from_mac, DiskData, Entity, EntityKind, FirewallRawData, FirewallRuleData,
    HostData, InterfaceData, L2NetworkData, L3AddressData, L3NetworkData, LocationData, PowerState,
    RouteData, ServiceData, ServiceExtra, TemplateData,
};
pub use event::{ChangeKind, EventBus, GraphEvent, HandlerId};
pub use graph::{Graph, GraphError, NodeId};
pub use timer::{Timer, TimerState, Ttl};

/// Symbolic name of a collector verifying graph state.
pub type SourceName = smol_str::SmolStr;
