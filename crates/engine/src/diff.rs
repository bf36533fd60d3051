// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Symbolic difference of a goal graph against the current graph.
//!
//! Peers are matched by global ID; descriptors are tagged new, removed,
//! changed or unchanged and expand recursively over attributes and child
//! sets. Part-of relationships are resolved into side-table views here —
//! the entities themselves are never touched. Attribute names follow the
//! vocabulary the planner consumes (`cpus`, `memoryMin`, `networkId`,
//! `layer3addresses`, …).

use indexmap::IndexMap;
use serde::Serialize;
use trellis_core::{Entity, Graph, NodeId, ServiceExtra};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffState {
    New,
    Removed,
    Changed,
    Unchanged,
}

/// Descriptor of one attribute: a scalar comparison, or a keyed element
/// set for nested containers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttrDiff {
    pub state: DiffState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<ElementDiff>>,
}

impl AttrDiff {
    fn scalar(state: DiffState) -> Self {
        Self { state, elements: None }
    }

    fn set(state: DiffState, elements: Vec<ElementDiff>) -> Self {
        Self { state, elements: Some(elements) }
    }

    pub fn is_unchanged(&self) -> bool {
        self.state == DiffState::Unchanged
    }
}

/// Descriptor of one entity, keyed by its global ID.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementDiff {
    pub id: String,
    pub diff: ObjectDiff,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDiff {
    pub state: DiffState,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: IndexMap<String, AttrDiff>,
}

impl ObjectDiff {
    pub fn attr(&self, name: &str) -> Option<&AttrDiff> {
        self.attrs.get(name)
    }

    /// State of a named attribute; absent attributes count as unchanged,
    /// mirroring how hosts that list no routes are considered routing-clean.
    pub fn attr_state(&self, name: &str) -> DiffState {
        self.attrs.get(name).map(|attr| attr.state).unwrap_or(DiffState::Unchanged)
    }
}

/// Diff of two graphs, rooted at the three top-level entity lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffReport {
    pub hosts: Vec<ElementDiff>,
    pub l2networks: Vec<ElementDiff>,
    pub l3networks: Vec<ElementDiff>,
}

impl DiffReport {
    pub fn is_unchanged(&self) -> bool {
        self.hosts
            .iter()
            .chain(&self.l2networks)
            .chain(&self.l3networks)
            .all(|element| element.diff.state == DiffState::Unchanged)
    }
}

struct Side<'a> {
    graph: &'a Graph,
    node: NodeId,
}

/// Compare `goal` against `current`.
pub fn diff_report(goal: &Graph, current: &Graph) -> DiffReport {
    DiffReport {
        hosts: diff_top_level(goal, current, Graph::hosts, diff_host),
        l2networks: diff_top_level(goal, current, Graph::l2_networks, diff_l2_network),
        l3networks: diff_top_level(goal, current, Graph::l3_networks, diff_l3_network),
    }
}

fn diff_top_level(
    goal: &Graph,
    current: &Graph,
    select: impl Fn(&Graph) -> Vec<NodeId>,
    compare: impl Fn(&Side<'_>, &Side<'_>) -> IndexMap<String, AttrDiff> + Copy,
) -> Vec<ElementDiff> {
    let goal_nodes: Vec<(String, NodeId)> =
        select(goal).into_iter().map(|node| (goal.global_id(node), node)).collect();
    let current_nodes: Vec<(String, NodeId)> =
        select(current).into_iter().map(|node| (current.global_id(node), node)).collect();

    let mut out = Vec::new();
    for (id, node) in &goal_nodes {
        let peer = current_nodes.iter().find(|(peer_id, _)| peer_id == id);
        let diff = match peer {
            Some((_, peer_node)) => compared(
                compare(
                    &Side { graph: goal, node: *node },
                    &Side { graph: current, node: *peer_node },
                ),
            ),
            None => all_one_side(goal, *node, DiffState::New, compare_kind_of(goal, *node)),
        };
        out.push(ElementDiff { id: id.clone(), diff });
    }
    for (id, node) in &current_nodes {
        if !goal_nodes.iter().any(|(goal_id, _)| goal_id == id) {
            let diff = all_one_side(current, *node, DiffState::Removed, compare_kind_of(current, *node));
            out.push(ElementDiff { id: id.clone(), diff });
        }
    }
    out
}

/// An aggregate is changed iff any attribute descriptor is not unchanged.
fn compared(attrs: IndexMap<String, AttrDiff>) -> ObjectDiff {
    let changed = attrs.values().any(|attr| !attr.is_unchanged());
    ObjectDiff { state: if changed { DiffState::Changed } else { DiffState::Unchanged }, attrs }
}

fn scalar_eq<T: PartialEq>(a: &T, b: &T) -> AttrDiff {
    AttrDiff::scalar(if a == b { DiffState::Unchanged } else { DiffState::Changed })
}

// ---- per-type comparisons ----

fn diff_host(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::Host(a)), Some(Entity::Host(b))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };

    let mut attrs = IndexMap::new();
    attrs.insert("cpus".to_string(), scalar_eq(&a.cpus, &b.cpus));
    attrs.insert("memoryMin".to_string(), scalar_eq(&a.memory_min, &b.memory_min));
    attrs.insert("memoryMax".to_string(), scalar_eq(&a.memory_max, &b.memory_max));
    attrs.insert("powerState".to_string(), scalar_eq(&a.power_state, &b.power_state));

    attrs.insert(
        "templates".to_string(),
        diff_children(goal, current, |side| template_view(side), diff_template),
    );
    attrs.insert(
        "interfaces".to_string(),
        diff_children(goal, current, |side| side.graph.interfaces_of(side.node), diff_interface),
    );
    attrs.insert(
        "routes".to_string(),
        diff_children(goal, current, |side| side.graph.routes_of(side.node), diff_route),
    );
    attrs.insert(
        "firewallrules".to_string(),
        diff_children(goal, current, |side| side.graph.firewall_rules_of(side.node), diff_rule),
    );
    attrs.insert(
        "firewallraws".to_string(),
        diff_children(
            goal,
            current,
            |side| side.graph.firewall_raw_of(side.node).into_iter().collect(),
            diff_raw,
        ),
    );
    attrs.insert(
        "disks".to_string(),
        diff_children(goal, current, |side| side.graph.disks_of(side.node), diff_disk),
    );
    attrs
}

fn template_view(side: &Side<'_>) -> Vec<NodeId> {
    side.graph.template_of_host(side.node).into_iter().collect()
}

fn diff_template(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::Template(a)), Some(Entity::Template(b))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };
    let mut attrs = IndexMap::new();
    attrs.insert("id".to_string(), scalar_eq(&a.id, &b.id));
    attrs.insert("metadata".to_string(), scalar_eq(&a.metadata, &b.metadata));
    attrs
}

fn diff_l2_network(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::L2Network(_)), Some(Entity::L2Network(_))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };
    // Nothing beyond identity distinguishes two layer-2 networks.
    IndexMap::new()
}

fn diff_l3_network(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::L3Network(a)), Some(Entity::L3Network(b))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };
    let mut attrs = IndexMap::new();
    attrs.insert("address".to_string(), scalar_eq(&a.address, &b.address));
    attrs.insert("netmask".to_string(), scalar_eq(&a.netmask, &b.netmask));
    attrs
}

fn diff_interface(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::Interface(a)), Some(Entity::Interface(b))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };

    let network_of = |side: &Side<'_>| {
        side.graph
            .network_of_interface(side.node)
            .map(|network| side.graph.global_id(network))
    };

    let mut attrs = IndexMap::new();
    attrs.insert("networkId".to_string(), scalar_eq(&network_of(goal), &network_of(current)));
    attrs.insert("rate".to_string(), scalar_eq(&a.rate, &b.rate));
    attrs.insert("mtu".to_string(), scalar_eq(&a.mtu, &b.mtu));
    attrs.insert(
        "layer3addresses".to_string(),
        diff_children(goal, current, |side| side.graph.addresses_of(side.node), diff_address),
    );
    attrs
}

fn diff_address(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::L3Address(a)), Some(Entity::L3Address(b))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };

    let mut attrs = IndexMap::new();
    attrs.insert("address".to_string(), scalar_eq(&a.address, &b.address));
    attrs.insert("netmask".to_string(), scalar_eq(&a.netmask, &b.netmask));
    attrs.insert("gateway".to_string(), scalar_eq(&a.gateway, &b.gateway));
    attrs.insert("static".to_string(), scalar_eq(&a.is_static, &b.is_static));

    for (name, filter) in [
        ("services", ServiceClass::Generic),
        ("dnsservices", ServiceClass::Dns),
        ("dhcpservices", ServiceClass::Dhcp),
    ] {
        attrs.insert(
            name.to_string(),
            diff_children(
                goal,
                current,
                move |side| services_of_class(side, filter),
                diff_service,
            ),
        );
    }
    attrs
}

#[derive(Clone, Copy, PartialEq)]
enum ServiceClass {
    Generic,
    Dns,
    Dhcp,
}

fn services_of_class(side: &Side<'_>, class: ServiceClass) -> Vec<NodeId> {
    side.graph
        .services_of(side.node)
        .into_iter()
        .filter(|service| match side.graph.entity(*service) {
            Some(Entity::Service(data)) => match data.extra {
                ServiceExtra::Generic => class == ServiceClass::Generic,
                ServiceExtra::Dns { .. } => class == ServiceClass::Dns,
                ServiceExtra::Dhcp { .. } => class == ServiceClass::Dhcp,
            },
            _ => false,
        })
        .collect()
}

fn diff_service(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::Service(a)), Some(Entity::Service(b))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };

    let mut attrs = IndexMap::new();
    attrs.insert("port".to_string(), scalar_eq(&a.port, &b.port));
    attrs.insert("protocol".to_string(), scalar_eq(&a.protocol, &b.protocol));
    attrs.insert("type".to_string(), scalar_eq(&a.kind, &b.kind));
    attrs.insert("product".to_string(), scalar_eq(&a.product, &b.product));
    attrs.insert("version".to_string(), scalar_eq(&a.version, &b.version));

    match (&a.extra, &b.extra) {
        (ServiceExtra::Dns { domain: da }, ServiceExtra::Dns { domain: db }) => {
            attrs.insert("domain".to_string(), scalar_eq(da, db));
        }
        (
            ServiceExtra::Dhcp {
                lease: la,
                range_start: sa,
                range_end: ea,
                announced_gateway: ga,
            },
            ServiceExtra::Dhcp {
                lease: lb,
                range_start: sb,
                range_end: eb,
                announced_gateway: gb,
            },
        ) => {
            attrs.insert("lease".to_string(), scalar_eq(la, lb));
            attrs.insert("start".to_string(), scalar_eq(sa, sb));
            attrs.insert("end".to_string(), scalar_eq(ea, eb));
            attrs.insert("announcedGateway".to_string(), scalar_eq(ga, gb));
        }
        _ => {}
    }
    attrs
}

fn diff_route(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::Route(a)), Some(Entity::Route(b))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };
    let mut attrs = IndexMap::new();
    attrs.insert("destination".to_string(), scalar_eq(&a.destination, &b.destination));
    attrs.insert("genmask".to_string(), scalar_eq(&a.genmask, &b.genmask));
    attrs.insert("gateway".to_string(), scalar_eq(&a.gateway, &b.gateway));
    attrs
}

fn diff_rule(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::FirewallRule(a)), Some(Entity::FirewallRule(b))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };
    let mut attrs = IndexMap::new();
    attrs.insert("chain".to_string(), scalar_eq(&a.chain, &b.chain));
    attrs.insert("action".to_string(), scalar_eq(&a.action, &b.action));
    attrs.insert("protocol".to_string(), scalar_eq(&a.protocol, &b.protocol));
    attrs.insert("srcnet".to_string(), scalar_eq(&a.srcnet, &b.srcnet));
    attrs.insert("destnet".to_string(), scalar_eq(&a.destnet, &b.destnet));
    attrs.insert("srcports".to_string(), scalar_eq(&a.srcports, &b.srcports));
    attrs.insert("destports".to_string(), scalar_eq(&a.destports, &b.destports));
    attrs
}

fn diff_raw(goal: &Side<'_>, current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    let (Some(Entity::FirewallRaw(a)), Some(Entity::FirewallRaw(b))) =
        (goal.graph.entity(goal.node), current.graph.entity(current.node))
    else {
        return IndexMap::new();
    };
    let mut attrs = IndexMap::new();
    attrs.insert("firewall".to_string(), scalar_eq(&a.firewall, &b.firewall));
    attrs.insert("data".to_string(), scalar_eq(&a.data, &b.data));
    attrs
}

/// Disks only exist or don't; size changes are not planned.
fn diff_disk(_goal: &Side<'_>, _current: &Side<'_>) -> IndexMap<String, AttrDiff> {
    IndexMap::new()
}

// ---- child sets ----

fn diff_children(
    goal: &Side<'_>,
    current: &Side<'_>,
    view: impl Fn(&Side<'_>) -> Vec<NodeId>,
    compare: impl Fn(&Side<'_>, &Side<'_>) -> IndexMap<String, AttrDiff> + Copy,
) -> AttrDiff {
    let goal_children: Vec<(String, NodeId)> = view(goal)
        .into_iter()
        .map(|node| (goal.graph.global_id(node), node))
        .collect();
    let current_children: Vec<(String, NodeId)> = view(current)
        .into_iter()
        .map(|node| (current.graph.global_id(node), node))
        .collect();

    let mut elements = Vec::new();
    let mut changed = false;
    for (id, node) in &goal_children {
        let peer = current_children.iter().find(|(peer_id, _)| peer_id == id);
        let diff = match peer {
            Some((_, peer_node)) => compared(
                compare(
                    &Side { graph: goal.graph, node: *node },
                    &Side { graph: current.graph, node: *peer_node },
                ),
            ),
            None => all_one_side(goal.graph, *node, DiffState::New, compare_kind_of(goal.graph, *node)),
        };
        changed |= diff.state != DiffState::Unchanged;
        elements.push(ElementDiff { id: id.clone(), diff });
    }
    for (id, node) in &current_children {
        if !goal_children.iter().any(|(goal_id, _)| goal_id == id) {
            let diff = all_one_side(
                current.graph,
                *node,
                DiffState::Removed,
                compare_kind_of(current.graph, *node),
            );
            changed = true;
            elements.push(ElementDiff { id: id.clone(), diff });
        }
    }

    AttrDiff::set(if changed { DiffState::Changed } else { DiffState::Unchanged }, elements)
}

// ---- one-sided expansion (all-new / all-removed) ----

type CompareFn = fn(&Side<'_>, &Side<'_>) -> IndexMap<String, AttrDiff>;

fn compare_kind_of(graph: &Graph, node: NodeId) -> CompareFn {
    use trellis_core::EntityKind::*;
    match graph.kind(node) {
        Some(Host) => diff_host,
        Some(Interface) => diff_interface,
        Some(Layer3Address) => diff_address,
        Some(Service | DnsService | DhcpService) => diff_service,
        Some(Route) => diff_route,
        Some(FirewallRule) => diff_rule,
        Some(FirewallRaw) => diff_raw,
        Some(Layer3Network) => diff_l3_network,
        Some(Layer2Network) => diff_l2_network,
        Some(Template) => diff_template,
        _ => diff_disk,
    }
}

/// Expand an object that only exists on one side: every attribute and every
/// descendant carries the same state.
fn all_one_side(graph: &Graph, node: NodeId, state: DiffState, compare: CompareFn) -> ObjectDiff {
    // Compare the node against itself to learn its attribute vocabulary,
    // then stamp everything with the one-sided state.
    let side = Side { graph, node };
    let template = compare(&side, &side);
    let mut attrs = IndexMap::new();
    for (name, attr) in template {
        let stamped = match attr.elements {
            Some(elements) => AttrDiff::set(
                state,
                elements
                    .into_iter()
                    .map(|element| ElementDiff {
                        diff: ObjectDiff { state, attrs: stamp(element.diff.attrs, state) },
                        id: element.id,
                    })
                    .collect(),
            ),
            None => AttrDiff::scalar(state),
        };
        attrs.insert(name, stamped);
    }
    ObjectDiff { state, attrs }
}

fn stamp(attrs: IndexMap<String, AttrDiff>, state: DiffState) -> IndexMap<String, AttrDiff> {
    attrs
        .into_iter()
        .map(|(name, attr)| {
            let stamped = match attr.elements {
                Some(elements) => AttrDiff::set(
                    state,
                    elements
                        .into_iter()
                        .map(|element| ElementDiff {
                            diff: ObjectDiff { state, attrs: stamp(element.diff.attrs, state) },
                            id: element.id,
                        })
                        .collect(),
                ),
                None => AttrDiff::scalar(state),
            };
            (name, stamped)
        })
        .collect()
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
