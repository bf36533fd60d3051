// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named multi-subscriber notification.
//!
//! Delivery is synchronous on the triggering task and the order between
//! subscribers is unspecified. The handler list is snapshotted before
//! delivery so handlers may re-enter the bus (subscribe, unsubscribe or
//! trigger again) without deadlocking.

use crate::entity::EntityKind;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use smol_str::SmolStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Token returned by [`EventBus::add`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct EventBus<E> {
    name: SmolStr,
    handlers: Mutex<Vec<(HandlerId, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self { name: name.into(), handlers: Mutex::new(Vec::new()), next_id: AtomicU64::new(1) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    pub fn remove(&self, id: HandlerId) {
        self.handlers.lock().retain(|(existing, _)| *existing != id);
    }

    pub fn trigger(&self, event: &E) {
        let snapshot: Vec<Handler<E>> =
            self.handlers.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Change notification emitted by the graph.
///
/// `New` carries the initial attribute values; `Changed` carries the member
/// that moved and its new value (`change` distinguishes plain sets from edge
/// additions and removals); `Deleted` is the last event for an object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GraphEvent {
    New {
        object_type: EntityKind,
        values: serde_json::Map<String, Value>,
    },
    Changed {
        object_type: EntityKind,
        object: String,
        change: ChangeKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        member: Option<SmolStr>,
        value: Value,
    },
    Deleted {
        object_type: EntityKind,
        object: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A scalar member was assigned a different value.
    Set,
    /// An edge to the named neighbor was created.
    Add,
    /// An edge to the named neighbor was removed.
    Delete,
}

impl GraphEvent {
    pub fn object_type(&self) -> EntityKind {
        match self {
            GraphEvent::New { object_type, .. }
            | GraphEvent::Changed { object_type, .. }
            | GraphEvent::Deleted { object_type, .. } => *object_type,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
