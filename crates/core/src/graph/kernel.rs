// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node/edge kernel: verification lifetimes, cascade deletion, traversal.
//!
//! The arena is a stable undirected multigraph. Part-of edges are stored
//! with the child as the first endpoint. All mutation happens behind the
//! owning [`Graph`](super::Graph) lock; events are queued on `pending` and
//! delivered by the caller after the lock is released.

use crate::entity::{Entity, EntityKind};
use crate::event::{ChangeKind, GraphEvent};
use crate::timer::{Timer, Ttl};
use crate::SourceName;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use petgraph::visit::EdgeRef;
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

/// How two nodes relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Plain association, e.g. interface -> layer-2 network.
    Association,
    /// "first endpoint is part of second endpoint".
    PartOf,
}

#[derive(Debug)]
pub(crate) struct NodeRecord {
    pub entity: Entity,
    pub sources: HashMap<SourceName, Timer>,
    pub lifetime_start: u64,
    pub lifetime_end: Option<u64>,
    pub deprecated: bool,
}

#[derive(Debug)]
pub(crate) struct EdgeRecord {
    pub kind: EdgeKind,
    /// Persistent role of the edge, e.g. "inInterface" on a firewall rule.
    pub name: Option<SmolStr>,
    pub sources: HashMap<SourceName, Timer>,
}

pub(crate) struct GraphInner {
    pub topo: StableUnGraph<NodeRecord, EdgeRecord>,
    pub root: NodeIndex,
    pub pending: Vec<GraphEvent>,
}

impl GraphInner {
    pub fn new(epoch: u64) -> Self {
        let mut topo = StableUnGraph::default();
        let root = topo.add_node(NodeRecord {
            entity: Entity::Root,
            sources: HashMap::new(),
            lifetime_start: epoch,
            lifetime_end: None,
            deprecated: false,
        });
        Self { topo, root, pending: Vec::new() }
    }

    pub fn take_pending(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.pending)
    }

    // ---- nodes ----

    pub fn add_node(
        &mut self,
        entity: Entity,
        source: &str,
        ttl: Ttl,
        now: Instant,
        epoch: u64,
    ) -> NodeIndex {
        let mut sources = HashMap::new();
        sources.insert(SmolStr::from(source), Timer::started(ttl, now));
        let idx = self.topo.add_node(NodeRecord {
            entity,
            sources,
            lifetime_start: epoch,
            lifetime_end: None,
            deprecated: false,
        });
        // Root edge keeps the node reachable; it carries no verifiers and no
        // change events.
        self.topo.add_edge(self.root, idx, EdgeRecord {
            kind: EdgeKind::Association,
            name: None,
            sources: HashMap::new(),
        });
        idx
    }

    pub fn entity(&self, idx: NodeIndex) -> Option<&Entity> {
        self.topo.node_weight(idx).map(|record| &record.entity)
    }

    pub fn entity_mut(&mut self, idx: NodeIndex) -> Option<&mut Entity> {
        self.topo.node_weight_mut(idx).map(|record| &mut record.entity)
    }

    pub fn kind(&self, idx: NodeIndex) -> Option<EntityKind> {
        self.entity(idx).and_then(Entity::kind)
    }

    pub fn is_deprecated(&self, idx: NodeIndex) -> bool {
        self.topo.node_weight(idx).map(|record| record.deprecated).unwrap_or(true)
    }

    /// Re-arm (or install) the verification timer of `source` on a node.
    pub fn verify_node(&mut self, idx: NodeIndex, source: &str, ttl: Ttl, now: Instant) {
        if let Some(record) = self.topo.node_weight_mut(idx) {
            record.sources.insert(SmolStr::from(source), Timer::started(ttl, now));
        }
    }

    /// Withdraw a source; deletes the node once no source remains.
    /// Removal order is drop-then-cancel: the entry leaves the map and its
    /// timer is dropped with it.
    pub fn remove_verification(&mut self, idx: NodeIndex, source: &str, epoch: u64) {
        let emptied = match self.topo.node_weight_mut(idx) {
            Some(record) => {
                record.sources.remove(source);
                record.sources.is_empty()
            }
            None => return,
        };
        if emptied {
            self.delete_node(idx, epoch);
        }
    }

    /// Delete a node: mark deprecated, cascade incident edges first, then
    /// emit the final `Deleted` event.
    pub fn delete_node(&mut self, idx: NodeIndex, epoch: u64) {
        if idx == self.root || self.topo.node_weight(idx).is_none() {
            return;
        }
        // The global ID must be computed while edges are still in place.
        let object = self.global_id(idx);
        let kind = self.kind(idx);

        // A location owns its templates outright.
        if self.kind(idx) == Some(EntityKind::Location) {
            let templates = self.children(idx, Some(EntityKind::Template));
            for template in templates {
                self.delete_node(template, epoch);
            }
        }

        if let Some(record) = self.topo.node_weight_mut(idx) {
            record.deprecated = true;
            record.lifetime_end = Some(epoch);
            record.sources.clear();
        }

        let incident: Vec<EdgeIndex> = self.topo.edges(idx).map(|edge| edge.id()).collect();
        for edge in incident {
            self.delete_edge(edge, None, None);
        }

        self.topo.remove_node(idx);

        if let Some(object_type) = kind {
            self.pending.push(GraphEvent::Deleted { object_type, object });
        }
    }

    // ---- edges ----

    /// Create an edge. Linking against a deprecated endpoint is a
    /// programming error surfaced as `Err`. Construction-time edges pass
    /// `announce = false`: the object's `New` event already carries those
    /// initial relationships.
    #[allow(clippy::too_many_arguments)]
    pub fn add_edge(
        &mut self,
        first: NodeIndex,
        second: NodeIndex,
        kind: EdgeKind,
        name: Option<&str>,
        source: Option<(&str, Ttl)>,
        association: Option<&str>,
        changed: Option<NodeIndex>,
        now: Instant,
        announce: bool,
    ) -> Result<EdgeIndex, super::GraphError> {
        for endpoint in [first, second] {
            if self.is_deprecated(endpoint) {
                return Err(super::GraphError::DeprecatedEndpoint {
                    id: self.global_id(endpoint),
                });
            }
        }
        let mut sources = HashMap::new();
        if let Some((source, ttl)) = source {
            sources.insert(SmolStr::from(source), Timer::started(ttl, now));
        }
        let edge = self.topo.add_edge(first, second, EdgeRecord {
            kind,
            name: name.map(SmolStr::from),
            sources,
        });
        if announce {
            self.edge_change_events(first, second, ChangeKind::Add, association, changed);
        }
        Ok(edge)
    }

    pub fn verify_edge(&mut self, edge: EdgeIndex, source: &str, ttl: Ttl, now: Instant) {
        if let Some(record) = self.topo.edge_weight_mut(edge) {
            record.sources.insert(SmolStr::from(source), Timer::started(ttl, now));
        }
    }

    /// Delete an edge, notifying the endpoints before it is unlinked.
    pub fn delete_edge(
        &mut self,
        edge: EdgeIndex,
        association: Option<&str>,
        changed: Option<NodeIndex>,
    ) {
        let Some((first, second)) = self.topo.edge_endpoints(edge) else {
            return;
        };
        self.edge_change_events(first, second, ChangeKind::Delete, association, changed);
        self.topo.remove_edge(edge);
    }

    /// `onChanged` attribution for an edge mutation: either to the single
    /// changed endpoint, or symmetrically to both.
    fn edge_change_events(
        &mut self,
        first: NodeIndex,
        second: NodeIndex,
        change: ChangeKind,
        association: Option<&str>,
        changed: Option<NodeIndex>,
    ) {
        if first == self.root || second == self.root {
            return;
        }
        let member = association.map(SmolStr::from);
        match changed {
            Some(changed) => {
                let other = if changed == first { second } else { first };
                if let Some(object_type) = self.kind(changed) {
                    let event = GraphEvent::Changed {
                        object_type,
                        object: self.global_id(changed),
                        change,
                        member,
                        value: self.global_id(other).into(),
                    };
                    self.pending.push(event);
                }
            }
            None => {
                for (node, other) in [(first, second), (second, first)] {
                    if let Some(object_type) = self.kind(node) {
                        let event = GraphEvent::Changed {
                            object_type,
                            object: self.global_id(node),
                            change,
                            member: member.clone(),
                            value: self.global_id(other).into(),
                        };
                        self.pending.push(event);
                    }
                }
            }
        }
    }

    pub fn edge_between(&self, first: NodeIndex, second: NodeIndex) -> Option<EdgeIndex> {
        self.edges_between(first, second).into_iter().next()
    }

    /// Every edge joining the two nodes (the graph is a multigraph).
    pub fn edges_between(&self, first: NodeIndex, second: NodeIndex) -> Vec<EdgeIndex> {
        if self.topo.node_weight(first).is_none() || self.topo.node_weight(second).is_none() {
            return Vec::new();
        }
        self.topo
            .edges(first)
            .filter(|edge| edge.source() == second || edge.target() == second)
            .map(|edge| edge.id())
            .collect()
    }

    // ---- traversal ----

    /// Neighbors over all incident edges, optionally filtered by kind.
    pub fn neighbors(&self, idx: NodeIndex, kind: Option<EntityKind>) -> Vec<NodeIndex> {
        if self.topo.node_weight(idx).is_none() {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        self.topo
            .neighbors(idx)
            .filter(|neighbor| *neighbor != self.root && seen.insert(*neighbor))
            .filter(|neighbor| kind.is_none() || self.kind(*neighbor) == kind)
            .collect()
    }

    /// Part-of children of a container, optionally filtered by kind.
    ///
    /// Part-of orientation is the stored endpoint order (child, container),
    /// read back through `edge_endpoints` because undirected edge iteration
    /// does not guarantee it.
    pub fn children(&self, container: NodeIndex, kind: Option<EntityKind>) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for edge in self.part_of_edges(container) {
            let Some((child, parent)) = self.topo.edge_endpoints(edge) else { continue };
            if parent != container {
                continue;
            }
            if seen.insert(child) && (kind.is_none() || self.kind(child) == kind) {
                out.push(child);
            }
        }
        out
    }

    /// Containers this node is part of.
    pub fn containers(&self, child: NodeIndex, kind: Option<EntityKind>) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for edge in self.part_of_edges(child) {
            let Some((first, container)) = self.topo.edge_endpoints(edge) else { continue };
            if first != child {
                continue;
            }
            if seen.insert(container) && (kind.is_none() || self.kind(container) == kind) {
                out.push(container);
            }
        }
        out
    }

    fn part_of_edges(&self, idx: NodeIndex) -> Vec<EdgeIndex> {
        if self.topo.node_weight(idx).is_none() {
            return Vec::new();
        }
        self.topo
            .edges(idx)
            .filter(|edge| edge.weight().kind == EdgeKind::PartOf)
            .map(|edge| edge.id())
            .collect()
    }

    /// Association neighbor reached over an edge with the given persistent
    /// name (firewall in/out interfaces).
    pub fn named_neighbor(&self, idx: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.topo.node_weight(idx)?;
        self.topo.edges(idx).find_map(|edge| {
            if edge.weight().name.as_deref() == Some(name) {
                Some(if edge.source() == idx { edge.target() } else { edge.source() })
            } else {
                None
            }
        })
    }

    /// Breadth-first visit of every node reachable from `start`.
    pub fn bfs(&self, start: NodeIndex, mut visit: impl FnMut(NodeIndex)) {
        let mut queue = VecDeque::from([start]);
        let mut visited = HashSet::from([start]);
        while let Some(node) = queue.pop_front() {
            visit(node);
            for neighbor in self.topo.neighbors(node) {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
    }

    // ---- lifetime management ----

    /// Drop every verification whose timer has passed its deadline; delete
    /// nodes and edges whose source set was emptied by the sweep. Returns
    /// how many nodes were deleted.
    pub fn expire(&mut self, now: Instant, epoch: u64) -> usize {
        // Edges first so their deletions are attributed to expiry rather
        // than to a node cascade.
        let edge_indices: Vec<EdgeIndex> = self.topo.edge_indices().collect();
        for edge in edge_indices {
            let Some(record) = self.topo.edge_weight_mut(edge) else { continue };
            let before = record.sources.len();
            record.sources.retain(|_, timer| !timer.fire_due(now));
            if before > 0 && record.sources.is_empty() {
                self.delete_edge(edge, None, None);
            }
        }

        let node_indices: Vec<NodeIndex> = self.topo.node_indices().collect();
        let mut deleted = 0;
        for node in node_indices {
            if node == self.root {
                continue;
            }
            let Some(record) = self.topo.node_weight_mut(node) else { continue };
            let before = record.sources.len();
            record.sources.retain(|_, timer| !timer.fire_due(now));
            if before > 0 && record.sources.is_empty() {
                self.delete_node(node, epoch);
                deleted += 1;
            }
        }
        deleted
    }

    /// Earliest armed deadline over every node and edge timer.
    pub fn next_expiry(&self) -> Option<Instant> {
        let node_deadlines = self
            .topo
            .node_indices()
            .filter_map(|idx| self.topo.node_weight(idx))
            .flat_map(|record| record.sources.values())
            .filter_map(Timer::deadline);
        let edge_deadlines = self
            .topo
            .edge_indices()
            .filter_map(|idx| self.topo.edge_weight(idx))
            .flat_map(|record| record.sources.values())
            .filter_map(Timer::deadline);
        node_deadlines.chain(edge_deadlines).min()
    }

    /// Pause every timer reachable from the root.
    pub fn freeze(&mut self, now: Instant) {
        let mut nodes = Vec::new();
        self.bfs(self.root, |idx| nodes.push(idx));
        for node in nodes {
            if let Some(record) = self.topo.node_weight_mut(node) {
                for timer in record.sources.values_mut() {
                    timer.pause(now);
                }
            }
        }
        let edges: Vec<EdgeIndex> = self.topo.edge_indices().collect();
        for edge in edges {
            if let Some(record) = self.topo.edge_weight_mut(edge) {
                for timer in record.sources.values_mut() {
                    timer.pause(now);
                }
            }
        }
    }

    /// Resume every paused timer for its remaining duration.
    pub fn melt(&mut self, now: Instant) {
        let mut nodes = Vec::new();
        self.bfs(self.root, |idx| nodes.push(idx));
        for node in nodes {
            if let Some(record) = self.topo.node_weight_mut(node) {
                for timer in record.sources.values_mut() {
                    timer.resume(now);
                }
            }
        }
        let edges: Vec<EdgeIndex> = self.topo.edge_indices().collect();
        for edge in edges {
            if let Some(record) = self.topo.edge_weight_mut(edge) {
                for timer in record.sources.values_mut() {
                    timer.resume(now);
                }
            }
        }
    }

    // ---- identity ----

    /// Stable cross-graph identifier. Owned entities are prefixed with the
    /// identity of their owner so peers match between goal and current
    /// graphs.
    pub fn global_id(&self, idx: NodeIndex) -> String {
        let Some(entity) = self.entity(idx) else {
            return String::new();
        };
        let local = entity.local_id();
        match entity.kind() {
            Some(EntityKind::Template) => {
                match self.neighbors(idx, Some(EntityKind::Location)).first() {
                    Some(location) => match self.entity(*location) {
                        Some(loc) => format!("{}_{}", loc.local_id(), local),
                        None => local,
                    },
                    None => local,
                }
            }
            Some(EntityKind::Layer3Address) => {
                match self.containers(idx, Some(EntityKind::Interface)).first() {
                    Some(interface) => format!("{}_{}", self.global_id(*interface), local),
                    None => local,
                }
            }
            Some(EntityKind::Service | EntityKind::DnsService | EntityKind::DhcpService) => {
                match self.containers(idx, Some(EntityKind::Layer3Address)).first() {
                    Some(address) => format!("{}:{}", self.global_id(*address), local),
                    None => local,
                }
            }
            Some(EntityKind::Route | EntityKind::FirewallRule | EntityKind::FirewallRaw) => {
                match self.containers(idx, Some(EntityKind::Host)).first() {
                    Some(host) => match self.entity(*host) {
                        Some(host) => format!("{}_{}", host.local_id(), local),
                        None => local,
                    },
                    None => local,
                }
            }
            _ => local,
        }
    }

    pub fn sources_of(&self, idx: NodeIndex) -> Vec<SourceName> {
        self.topo
            .node_weight(idx)
            .map(|record| record.sources.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn edge_sources(&self, edge: EdgeIndex) -> Vec<SourceName> {
        self.topo
            .edge_weight(edge)
            .map(|record| record.sources.keys().cloned().collect())
            .unwrap_or_default()
    }
}
