// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed infrastructure graph.
//!
//! One [`Graph`] per environment. Collectors call the `get_or_create_*`
//! factories with a source name and TTL; every factory either refreshes the
//! verification of an existing node or constructs it and announces `onNew`.
//! Setters emit `onChanged` only when a value actually moves. When the last
//! verification of a node expires the node is deleted and `onDeleted` is the
//! final event observed for it.

mod copy;
mod factories;
mod kernel;

pub use kernel::EdgeKind;

use crate::clock::Clock;
use crate::entity::{Entity, EntityKind};
use crate::event::{EventBus, GraphEvent};
use crate::timer::Ttl;
use crate::SourceName;
use kernel::GraphInner;
use parking_lot::{Mutex, MutexGuard};
use petgraph::stable_graph::NodeIndex;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Handle to a node. Only valid for the graph that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

#[derive(Debug, Error)]
pub enum GraphError {
    /// Attempted to link against a node that has already been deleted.
    #[error("node '{id}' is deprecated")]
    DeprecatedEndpoint { id: String },
}

const TYPE_LOCK_COUNT: usize = 14;

fn type_lock_index(kind: EntityKind) -> usize {
    match kind {
        EntityKind::Location => 0,
        EntityKind::Template => 1,
        EntityKind::Host => 2,
        EntityKind::Interface => 3,
        EntityKind::Layer2Network => 4,
        EntityKind::Layer3Network => 5,
        EntityKind::Layer3Address => 6,
        EntityKind::Service => 7,
        EntityKind::DnsService => 8,
        EntityKind::DhcpService => 9,
        EntityKind::Route => 10,
        EntityKind::FirewallRule => 11,
        EntityKind::FirewallRaw => 12,
        EntityKind::Disk => 13,
    }
}

pub struct Graph {
    name: String,
    clock: Arc<dyn Clock>,
    inner: Mutex<GraphInner>,
    /// One lock per entity type, held across a factory's lookup-or-construct
    /// step so identity uniqueness holds under concurrent collectors.
    type_locks: [Mutex<()>; TYPE_LOCK_COUNT],
    on_new: EventBus<GraphEvent>,
    on_changed: EventBus<GraphEvent>,
    on_deleted: EventBus<GraphEvent>,
}

impl Graph {
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let name = name.into();
        let epoch = clock.epoch_secs();
        Self {
            name,
            clock,
            inner: Mutex::new(GraphInner::new(epoch)),
            type_locks: Default::default(),
            on_new: EventBus::new("objectNew"),
            on_changed: EventBus::new("objectChanged"),
            on_deleted: EventBus::new("objectDeleted"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn on_new(&self) -> &EventBus<GraphEvent> {
        &self.on_new
    }

    pub fn on_changed(&self) -> &EventBus<GraphEvent> {
        &self.on_changed
    }

    pub fn on_deleted(&self) -> &EventBus<GraphEvent> {
        &self.on_deleted
    }

    pub(crate) fn lock_type(&self, kind: EntityKind) -> MutexGuard<'_, ()> {
        self.type_locks[type_lock_index(kind)].lock()
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.clock.epoch_secs()
    }

    /// Release the structural lock, then deliver the queued events so
    /// subscribers may read the graph from their handlers.
    pub(crate) fn commit(&self, mut inner: MutexGuard<'_, GraphInner>) {
        let events = inner.take_pending();
        drop(inner);
        for event in events {
            match event {
                GraphEvent::New { .. } => self.on_new.trigger(&event),
                GraphEvent::Changed { .. } => self.on_changed.trigger(&event),
                GraphEvent::Deleted { .. } => self.on_deleted.trigger(&event),
            }
        }
    }

    // ---- verification lifecycle ----

    /// Re-arm `source`'s verification timer on a node.
    pub fn verify(&self, node: NodeId, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        inner.verify_node(node.0, source, ttl, now);
        self.commit(inner);
    }

    /// Withdraw `source` from a node; the node is deleted when no source
    /// remains.
    pub fn remove_verification(&self, node: NodeId, source: &str) {
        let epoch = self.epoch();
        let mut inner = self.inner.lock();
        inner.remove_verification(node.0, source, epoch);
        self.commit(inner);
    }

    /// Delete a node outright, cascading its incident edges first.
    pub fn delete(&self, node: NodeId) {
        let epoch = self.epoch();
        let mut inner = self.inner.lock();
        inner.delete_node(node.0, epoch);
        self.commit(inner);
    }

    /// Sweep expired verifications; returns how many nodes were deleted.
    pub fn expire(&self) -> usize {
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();
        let deleted = inner.expire(now, epoch);
        self.commit(inner);
        deleted
    }

    /// Earliest deadline of any verification timer, used by the scheduler
    /// to decide when to sweep next.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.inner.lock().next_expiry()
    }

    /// Pause every node and edge timer reachable from the root.
    pub fn freeze(&self) {
        let now = self.now();
        self.inner.lock().freeze(now);
    }

    /// Resume every paused timer for its remaining duration.
    pub fn melt(&self) {
        let now = self.now();
        self.inner.lock().melt(now);
    }

    // ---- reads ----

    pub fn entity(&self, node: NodeId) -> Option<Entity> {
        self.inner.lock().entity(node.0).cloned()
    }

    pub fn kind(&self, node: NodeId) -> Option<EntityKind> {
        self.inner.lock().kind(node.0)
    }

    pub fn global_id(&self, node: NodeId) -> String {
        self.inner.lock().global_id(node.0)
    }

    pub fn sources_of(&self, node: NodeId) -> Vec<SourceName> {
        self.inner.lock().sources_of(node.0)
    }

    /// Sources verifying the edge between two nodes, if one exists.
    pub fn edge_sources_between(&self, first: NodeId, second: NodeId) -> Vec<SourceName> {
        let inner = self.inner.lock();
        match inner.edge_between(first.0, second.0) {
            Some(edge) => inner.edge_sources(edge),
            None => Vec::new(),
        }
    }

    fn of_kind(&self, kind: EntityKind) -> Vec<NodeId> {
        let inner = self.inner.lock();
        let root = inner.root;
        inner.neighbors(root, Some(kind)).into_iter().map(NodeId).collect()
    }

    pub fn hosts(&self) -> Vec<NodeId> {
        self.of_kind(EntityKind::Host)
    }

    pub fn l2_networks(&self) -> Vec<NodeId> {
        self.of_kind(EntityKind::Layer2Network)
    }

    pub fn l3_networks(&self) -> Vec<NodeId> {
        self.of_kind(EntityKind::Layer3Network)
    }

    pub fn locations(&self) -> Vec<NodeId> {
        self.of_kind(EntityKind::Location)
    }

    /// Every live node except the root.
    pub fn all_nodes(&self) -> Vec<NodeId> {
        let inner = self.inner.lock();
        let root = inner.root;
        inner.neighbors(root, None).into_iter().map(NodeId).collect()
    }

    pub fn neighbors(&self, node: NodeId, kind: Option<EntityKind>) -> Vec<NodeId> {
        self.inner.lock().neighbors(node.0, kind).into_iter().map(NodeId).collect()
    }

    /// Breadth-first order of every node reachable from `start`.
    pub fn bfs(&self, start: NodeId) -> Vec<NodeId> {
        let inner = self.inner.lock();
        let mut order = Vec::new();
        inner.bfs(start.0, |idx| order.push(NodeId(idx)));
        order
    }

    /// BFS over the whole graph from the root.
    pub fn bfs_from_root(&self) -> Vec<NodeId> {
        let inner = self.inner.lock();
        let mut order = Vec::new();
        inner.bfs(inner.root, |idx| order.push(NodeId(idx)));
        order
    }

    // ---- typed lookups ----

    fn find_by_local_id(&self, kind: EntityKind, id: &str) -> Option<NodeId> {
        let inner = self.inner.lock();
        let root = inner.root;
        inner
            .neighbors(root, Some(kind))
            .into_iter()
            .find(|idx| inner.entity(*idx).map(|e| e.local_id() == id).unwrap_or(false))
            .map(NodeId)
    }

    pub fn find_host(&self, id: &str) -> Option<NodeId> {
        self.find_by_local_id(EntityKind::Host, id)
    }

    pub fn find_l2_network(&self, id: &str) -> Option<NodeId> {
        self.find_by_local_id(EntityKind::Layer2Network, id)
    }

    pub fn find_l3_network(&self, id: &str) -> Option<NodeId> {
        self.find_by_local_id(EntityKind::Layer3Network, id)
    }

    /// Interfaces match by canonical name (`enx…`).
    pub fn find_interface(&self, id: &str) -> Option<NodeId> {
        self.find_by_local_id(EntityKind::Interface, id)
    }

    pub fn find_location(&self, id: &str) -> Option<NodeId> {
        let id = id.to_lowercase();
        self.find_by_local_id(EntityKind::Location, &id)
    }

    // ---- relationship getters ----

    pub fn interfaces_of(&self, host: NodeId) -> Vec<NodeId> {
        self.children_of(host, EntityKind::Interface)
    }

    pub fn addresses_of(&self, interface: NodeId) -> Vec<NodeId> {
        self.children_of(interface, EntityKind::Layer3Address)
    }

    /// Every service bound to an address, whatever its specialization.
    pub fn services_of(&self, address: NodeId) -> Vec<NodeId> {
        let inner = self.inner.lock();
        inner
            .children(address.0, None)
            .into_iter()
            .filter(|idx| {
                matches!(
                    inner.kind(*idx),
                    Some(EntityKind::Service | EntityKind::DnsService | EntityKind::DhcpService)
                )
            })
            .map(NodeId)
            .collect()
    }

    pub fn routes_of(&self, host: NodeId) -> Vec<NodeId> {
        self.children_of(host, EntityKind::Route)
    }

    pub fn firewall_rules_of(&self, host: NodeId) -> Vec<NodeId> {
        self.children_of(host, EntityKind::FirewallRule)
    }

    pub fn firewall_raw_of(&self, host: NodeId) -> Option<NodeId> {
        self.children_of(host, EntityKind::FirewallRaw).into_iter().next()
    }

    pub fn disks_of(&self, host: NodeId) -> Vec<NodeId> {
        self.children_of(host, EntityKind::Disk)
    }

    pub fn templates_of(&self, location: NodeId) -> Vec<NodeId> {
        self.children_of(location, EntityKind::Template)
    }

    fn children_of(&self, container: NodeId, kind: EntityKind) -> Vec<NodeId> {
        self.inner.lock().children(container.0, Some(kind)).into_iter().map(NodeId).collect()
    }

    /// Association neighbor of the given kind (location of a host, layer-2
    /// network of an interface, layer-3 network of an address).
    fn assoc_neighbor(&self, node: NodeId, kind: EntityKind) -> Option<NodeId> {
        self.inner.lock().neighbors(node.0, Some(kind)).into_iter().next().map(NodeId)
    }

    pub fn location_of(&self, node: NodeId) -> Option<NodeId> {
        self.assoc_neighbor(node, EntityKind::Location)
    }

    pub fn network_of_interface(&self, interface: NodeId) -> Option<NodeId> {
        self.assoc_neighbor(interface, EntityKind::Layer2Network)
    }

    pub fn network_of_address(&self, address: NodeId) -> Option<NodeId> {
        self.assoc_neighbor(address, EntityKind::Layer3Network)
    }

    pub fn interface_of_address(&self, address: NodeId) -> Option<NodeId> {
        self.containers_of(address, EntityKind::Interface).into_iter().next()
    }

    pub fn address_of_service(&self, service: NodeId) -> Option<NodeId> {
        self.containers_of(service, EntityKind::Layer3Address).into_iter().next()
    }

    pub fn host_of(&self, node: NodeId) -> Option<NodeId> {
        self.containers_of(node, EntityKind::Host).into_iter().next()
    }

    /// Host owning a service, reached over address and interface.
    pub fn host_of_service(&self, service: NodeId) -> Option<NodeId> {
        let address = self.address_of_service(service)?;
        let interface = self.interface_of_address(address)?;
        self.host_of(interface)
    }

    fn containers_of(&self, child: NodeId, kind: EntityKind) -> Vec<NodeId> {
        self.inner.lock().containers(child.0, Some(kind)).into_iter().map(NodeId).collect()
    }

    /// Template of a host, falling back to its location's default template.
    pub fn template_of_host(&self, host: NodeId) -> Option<NodeId> {
        if let Some(template) = self.children_of(host, EntityKind::Template).into_iter().next() {
            return Some(template);
        }
        let location = self.location_of(host)?;
        self.default_template_of(location)
    }

    pub fn default_template_of(&self, location: NodeId) -> Option<NodeId> {
        let default = match self.entity(location)? {
            Entity::Location(data) => data.default_template?,
            _ => return None,
        };
        self.templates_of(location)
            .into_iter()
            .find(|template| match self.entity(*template) {
                Some(Entity::Template(data)) => data.id == default,
                _ => false,
            })
    }

    pub fn interface_of_route(&self, route: NodeId) -> Option<NodeId> {
        self.assoc_neighbor(route, EntityKind::Interface)
    }

    pub fn in_interface_of_rule(&self, rule: NodeId) -> Option<NodeId> {
        self.inner.lock().named_neighbor(rule.0, "inInterface").map(NodeId)
    }

    pub fn out_interface_of_rule(&self, rule: NodeId) -> Option<NodeId> {
        self.inner.lock().named_neighbor(rule.0, "outInterface").map(NodeId)
    }

    /// Offsets of a DHCP service's lease range inside its layer-3 network:
    /// distance of the range start from the network address, and of the
    /// range end from the broadcast address (exclusive).
    pub fn dhcp_range_offsets(&self, service: NodeId) -> Option<(i64, i64)> {
        let (start, end) = match self.entity(service)? {
            Entity::Service(data) => match data.extra {
                crate::entity::ServiceExtra::Dhcp { range_start, range_end, .. } => {
                    (range_start?, range_end?)
                }
                _ => return None,
            },
            _ => return None,
        };
        let address = self.address_of_service(service)?;
        let network = self.network_of_address(address)?;
        let (net_address, netmask) = match self.entity(network)? {
            Entity::L3Network(data) => (data.address, data.netmask),
            _ => return None,
        };
        let start_offset = crate::ipnet::address_difference(&start, &net_address)?;
        let broadcast = crate::ipnet::broadcast_address(&net_address, &netmask)?;
        let end_offset = crate::ipnet::address_difference(&end, &broadcast)? - 1;
        Some((start_offset, end_offset))
    }

    /// An interface is DHCP when it has no address or any non-static one.
    pub fn interface_is_dhcp(&self, interface: NodeId) -> bool {
        let addresses = self.addresses_of(interface);
        if addresses.is_empty() {
            return true;
        }
        addresses.iter().any(|address| match self.entity(*address) {
            Some(Entity::L3Address(data)) => !data.is_static,
            _ => false,
        })
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").field("name", &self.name).finish()
    }
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod kernel_tests;

#[cfg(test)]
#[path = "factories_tests.rs"]
mod factories_tests;
