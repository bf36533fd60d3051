// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Planner adapter.
//!
//! Materializes the diff into a PDDL problem document, runs the external
//! planner binary, and parses the resulting plan back into builder actions
//! with their arguments resolved through a global-ID dictionary spanning
//! both graphs. Planner trouble of any kind degrades to an empty plan; the
//! caller still unwinds the freeze.

use crate::diff::{DiffReport, DiffState, ElementDiff, ObjectDiff};
use indexmap::IndexMap;
use std::fmt::Write as _;
use std::path::Path;
use trellis_config::PlannerConfig;
use trellis_core::{Entity, Graph, NodeId, ServiceExtra};

/// Which graph an object was drawn from. Removed objects only exist in the
/// current graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphSide {
    Goal,
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanObject {
    pub side: GraphSide,
    pub node: NodeId,
}

impl PlanObject {
    pub fn graph<'a>(&self, goal: &'a Graph, current: &'a Graph) -> &'a Graph {
        match self.side {
            GraphSide::Goal => goal,
            GraphSide::Current => current,
        }
    }
}

/// One parsed plan step: the action name as written by the planner and the
/// resolved argument objects.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub action: String,
    pub args: Vec<(String, PlanObject)>,
}

/// Dictionary of every plannable entity, keyed by lower-cased global ID.
/// Goal-graph objects shadow their current-graph peers.
pub fn object_index(goal: &Graph, current: &Graph) -> IndexMap<String, PlanObject> {
    let mut objects = IndexMap::new();
    for (graph, side) in [(goal, GraphSide::Goal), (current, GraphSide::Current)] {
        for network in graph.l2_networks() {
            insert_object(&mut objects, graph, network, side);
        }
        for host in graph.hosts() {
            insert_object(&mut objects, graph, host, side);
            for disk in graph.disks_of(host) {
                insert_object(&mut objects, graph, disk, side);
            }
            for interface in graph.interfaces_of(host) {
                insert_object(&mut objects, graph, interface, side);
                for address in graph.addresses_of(interface) {
                    insert_object(&mut objects, graph, address, side);
                    for service in graph.services_of(address) {
                        insert_object(&mut objects, graph, service, side);
                    }
                }
            }
        }
    }
    objects
}

fn insert_object(
    objects: &mut IndexMap<String, PlanObject>,
    graph: &Graph,
    node: NodeId,
    side: GraphSide,
) {
    let key = graph.global_id(node).to_lowercase();
    objects.entry(key).or_insert(PlanObject { side, node });
}

/// Run the configured planner over the diff. Any failure yields an empty
/// plan.
pub async fn plan(
    planner: Option<&PlannerConfig>,
    tmp_dir: &Path,
    report: &DiffReport,
    goal: &Graph,
    current: &Graph,
) -> Vec<ResolvedStep> {
    let Some(config) = planner else {
        tracing::error!("no planner configured; deployment gets an empty plan");
        return Vec::new();
    };

    let objects = object_index(goal, current);
    let uid = uuid::Uuid::new_v4();
    let problem_path = tmp_dir.join(format!("problem_{uid}"));
    let plan_path = tmp_dir.join(format!("plan_{uid}"));

    let problem = write_problem(report, goal, current, &objects);
    if let Err(error) = std::fs::write(&problem_path, problem) {
        tracing::error!(%error, path = %problem_path.display(), "cannot write problem file");
        return Vec::new();
    }

    tracing::info!(problem = %problem_path.display(), "running planner");
    let status = tokio::process::Command::new(&config.binary)
        .arg("--plan-file")
        .arg(&plan_path)
        .arg(&config.domain)
        .arg(&problem_path)
        .arg("--search")
        .arg(&config.search)
        .status()
        .await;
    if let Err(error) = &status {
        tracing::error!(%error, binary = %config.binary.display(), "planner did not run");
    }
    let _ = std::fs::remove_file(&problem_path);

    let steps = match std::fs::read_to_string(&plan_path) {
        Ok(content) => {
            tracing::info!("plan found");
            let _ = std::fs::remove_file(&plan_path);
            parse_plan(&content, &objects)
        }
        Err(_) => {
            tracing::info!("no plan found");
            Vec::new()
        }
    };
    steps
}

/// Parse `(action arg…)` lines; anything else (the planner's trailing cost
/// summary included) is discarded.
pub fn parse_plan(
    content: &str,
    objects: &IndexMap<String, PlanObject>,
) -> Vec<ResolvedStep> {
    let mut steps = Vec::new();
    'lines: for line in content.lines() {
        let line = line.trim();
        if !line.starts_with('(') {
            continue;
        }
        let inner = line.trim_start_matches('(').trim_end_matches(')');
        let mut parts = inner.split_whitespace();
        let Some(action) = parts.next() else { continue };

        let mut args = Vec::new();
        for part in parts {
            let key = part.to_lowercase();
            match objects.get(&key) {
                Some(object) => args.push((key, *object)),
                None => {
                    tracing::error!(action, argument = part, "plan references an unknown object");
                    continue 'lines;
                }
            }
        }
        steps.push(ResolvedStep { action: action.to_lowercase(), args });
    }
    steps
}

// ---- problem document ----

/// Render the (objects, init, goal) sections of the planning problem.
pub fn write_problem<'g>(
    report: &DiffReport,
    goal: &'g Graph,
    current: &'g Graph,
    objects: &IndexMap<String, PlanObject>,
) -> String {
    let resolve = |id: &str| -> Option<(&'g Graph, NodeId)> {
        objects.get(&id.to_lowercase()).map(|object| (object.graph(goal, current), object.node))
    };

    let mut out = String::new();
    let _ = writeln!(out, "(define (problem testbed-deployment)");
    let _ = writeln!(out, "\t(:domain testbed)");

    write_objects(&mut out, report, &resolve, objects, goal, current);
    write_init(&mut out, report, &resolve);
    write_goal(&mut out);

    let _ = writeln!(out, ")");
    out
}

fn write_objects<'g>(
    out: &mut String,
    report: &DiffReport,
    resolve: &impl Fn(&str) -> Option<(&'g Graph, NodeId)>,
    objects: &IndexMap<String, PlanObject>,
    goal: &'g Graph,
    current: &'g Graph,
) {
    let _ = writeln!(out, "\t(:objects");
    for network in &report.l2networks {
        let _ = writeln!(out, "\t\t{} - network", low(&network.id));
    }
    for host in &report.hosts {
        let Some((graph, node)) = resolve(&host.id) else { continue };
        let _ = writeln!(out, "\t\t{} - {}", low(&host.id), pddl_host_type(graph, node));

        if let Some(interfaces) = host.diff.attr("interfaces").and_then(|attr| attr.elements.as_ref()) {
            for interface in interfaces {
                let _ = writeln!(out, "\t\t{} - interface", low(&interface.id));
            }
        }

        // Services are typed from the live object, not the diff.
        for interface in graph.interfaces_of(node) {
            for address in graph.addresses_of(interface) {
                for service in graph.services_of(address) {
                    let kind = match graph.entity(service) {
                        Some(Entity::Service(data)) => match data.extra {
                            ServiceExtra::Dhcp { .. } => "dhcp",
                            ServiceExtra::Dns { .. } => "dns",
                            ServiceExtra::Generic => "service",
                        },
                        _ => continue,
                    };
                    let _ =
                        writeln!(out, "\t\t{} - {}", low(&graph.global_id(service)), kind);
                }
            }
        }
    }
    for (id, object) in objects {
        let graph = object.graph(goal, current);
        if matches!(graph.kind(object.node), Some(trellis_core::EntityKind::Disk)) {
            let _ = writeln!(out, "\t\t{id} - disk");
        }
    }
    let _ = writeln!(out, "\t)");
}

/// Hosts whose template is tagged `router` plan as routers.
fn pddl_host_type(graph: &Graph, host: NodeId) -> &'static str {
    let is_router = graph
        .template_of_host(host)
        .and_then(|template| graph.entity(template))
        .map(|entity| match entity {
            Entity::Template(data) => data.metadata.contains("router"),
            _ => false,
        })
        .unwrap_or(false);
    if is_router {
        "router"
    } else {
        "plain"
    }
}

fn write_init<'g>(
    out: &mut String,
    report: &DiffReport,
    resolve: &impl Fn(&str) -> Option<(&'g Graph, NodeId)>,
) {
    let _ = write!(out, "\t(:init");
    let _ = write!(out, "\n\t(= (total-cost) 0)");

    for host in &report.hosts {
        write_init_host(out, host, resolve);
    }
    for network in &report.l2networks {
        let name = low(&network.id);
        match network.diff.state {
            DiffState::New => {
                let _ = write!(out, " (new {name})");
            }
            DiffState::Removed => {
                let _ = write!(out, "\n\t\t(created {name}) (old {name})");
            }
            _ => {
                let _ = write!(out, "\n\t\t(created {name})");
            }
        }
    }
    let _ = writeln!(out, "\n\t)");
}

fn write_init_host<'g>(
    out: &mut String,
    host: &ElementDiff,
    resolve: &impl Fn(&str) -> Option<(&'g Graph, NodeId)>,
) {
    let name = low(&host.id);
    let Some((graph, node)) = resolve(&host.id) else { return };
    let diff = &host.diff;

    let running = match graph.entity(node) {
        Some(Entity::Host(data)) => data.power_state == Some(trellis_core::PowerState::Running),
        _ => false,
    };
    if diff.attr_state("powerState") != DiffState::New && running {
        let _ = write!(out, " (running {name})");
    }

    if diff.state != DiffState::New {
        let _ = write!(out, " (created {name})");
        let named = match graph.entity(node) {
            Some(Entity::Host(data)) => data.name_applied,
            _ => false,
        };
        if named {
            let _ = write!(out, " (named {name})");
        }
    } else {
        let _ = write!(out, " (new {name})");
    }

    if matches!(diff.state, DiffState::Changed | DiffState::Unchanged) {
        if diff.attr_state("cpus") == DiffState::Unchanged {
            let _ = write!(out, " (cpusConfigured {name})");
        }
        if diff.attr_state("memoryMin") == DiffState::Unchanged
            && diff.attr_state("memoryMax") == DiffState::Unchanged
        {
            let _ = write!(out, " (memoryConfigured {name})");
        }
        if diff.attr_state("templates") != DiffState::Unchanged {
            let _ = write!(out, " (templateChanged {name})");
        }
        if pddl_host_type(graph, node) == "router"
            && diff.attr_state("routes") == DiffState::Unchanged
        {
            let _ = write!(out, "\n\t\t(routingConfigured {name})");
        }
    } else if diff.state == DiffState::Removed {
        let _ = write!(out, " (old {name})");
    }

    if diff.attr_state("firewallrules") == DiffState::Unchanged
        && diff.attr_state("firewallraws") == DiffState::Unchanged
    {
        let _ = write!(out, "\n\t\t(firewallConfigured {name})");
    }

    if let Some(disks) = diff.attr("disks").and_then(|attr| attr.elements.as_ref()) {
        for disk in disks {
            let _ = write!(out, "\n\t\t(part-of {} {})", low(&disk.id), name);
            write_init_disk(out, disk, &name, resolve);
        }
    }

    if let Some(interfaces) = diff.attr("interfaces").and_then(|attr| attr.elements.as_ref()) {
        for interface in interfaces {
            let _ = write!(out, "\n\t\t(part-of {} {})", low(&interface.id), name);
            write_init_interface(out, interface, resolve);
        }
    }
}

fn write_init_disk<'g>(
    out: &mut String,
    disk: &ElementDiff,
    host_name: &str,
    resolve: &impl Fn(&str) -> Option<(&'g Graph, NodeId)>,
) {
    let name = low(&disk.id);
    // Disks are never resized by a plan: anything pre-existing (or the
    // host's default disk) counts as attached.
    let is_default = resolve(&disk.id)
        .and_then(|(graph, node)| {
            let host = graph.host_of(node)?;
            match (graph.entity(node), graph.entity(host)) {
                (Some(Entity::Disk(disk)), Some(Entity::Host(host))) => {
                    Some(disk.id.as_str() == host.default_disk_name())
                }
                _ => None,
            }
        })
        .unwrap_or(false);

    if disk.diff.state != DiffState::New || is_default {
        let _ = write!(out, " (attached {name} {host_name})");
    } else {
        let _ = write!(out, " (new {name})");
    }
    if disk.diff.state == DiffState::Removed {
        let _ = write!(out, " (old {name})");
    }
}

fn write_init_interface<'g>(
    out: &mut String,
    interface: &ElementDiff,
    resolve: &impl Fn(&str) -> Option<(&'g Graph, NodeId)>,
) {
    let name = low(&interface.id);
    let Some((graph, node)) = resolve(&interface.id) else { return };
    let diff = &interface.diff;

    if let Some(network) = graph.network_of_interface(node) {
        let _ = write!(out, "\n\t\t(part-of {} {})", low(&graph.global_id(network)), name);
    }

    let addresses = graph.addresses_of(node);
    let all_static = !addresses.is_empty()
        && addresses.iter().all(|address| match graph.entity(*address) {
            Some(Entity::L3Address(data)) => data.is_static,
            _ => false,
        });
    if all_static {
        let _ = write!(out, "\n\t\t(static {name})");
    }

    if diff.state != DiffState::New {
        let _ = write!(out, " (created {name})");
    }

    if matches!(diff.state, DiffState::Changed | DiffState::Unchanged) {
        if diff.attr_state("networkId") == DiffState::Unchanged {
            let _ = write!(out, " (networkConfigured {name})");
        }
        if diff.attr_state("mtu") == DiffState::Unchanged {
            let _ = write!(out, " (mtuConfigured {name})");
        }
        if diff.attr_state("rate") == DiffState::Unchanged {
            let _ = write!(out, " (rateConfigured {name})");
        }
        if interface_addresses_configured(diff, resolve) {
            let _ = write!(out, " (interfaceConfigured {name})");
        }
    } else if diff.state == DiffState::Removed {
        let _ = write!(out, " (old {name})");
    }

    if let Some(addresses) = diff.attr("layer3addresses").and_then(|attr| attr.elements.as_ref()) {
        for address in addresses {
            write_init_services(out, address, &name, resolve);
        }
    }
}

/// An interface counts as configured when its addresses are unchanged, when
/// the only churn is non-static (DHCP) addresses disappearing, or when the
/// surviving addresses moved services around while gateway and netmask held
/// still. A newly added address always demands interface work.
fn interface_addresses_configured<'g>(
    diff: &ObjectDiff,
    resolve: &impl Fn(&str) -> Option<(&'g Graph, NodeId)>,
) -> bool {
    let Some(attr) = diff.attr("layer3addresses") else {
        return true;
    };
    if attr.state == DiffState::Unchanged {
        return true;
    }
    let Some(elements) = attr.elements.as_ref() else {
        return true;
    };

    let is_static = |id: &str| {
        resolve(id)
            .and_then(|(graph, node)| match graph.entity(node) {
                Some(Entity::L3Address(data)) => Some(data.is_static),
                _ => None,
            })
            .unwrap_or(false)
    };

    // Expired DHCP leases need no interface work.
    if elements.iter().all(|element| {
        element.diff.state == DiffState::Removed && !is_static(&element.id)
    }) {
        return true;
    }

    elements.iter().all(|element| {
        let stable = element.diff.attr_state("gateway") == DiffState::Unchanged
            && element.diff.attr_state("netmask") == DiffState::Unchanged;
        let removed_static = element.diff.state == DiffState::Removed && is_static(&element.id);
        stable && !removed_static
    })
}

fn write_init_services<'g>(
    out: &mut String,
    address: &ElementDiff,
    interface_name: &str,
    _resolve: &impl Fn(&str) -> Option<(&'g Graph, NodeId)>,
) {
    if let Some(dhcps) = address.diff.attr("dhcpservices").and_then(|attr| attr.elements.as_ref()) {
        for dhcp in dhcps {
            let name = low(&dhcp.id);
            let _ = write!(out, "\n\t\t(part-of {name} {interface_name})");
            match dhcp.diff.state {
                DiffState::Unchanged => {
                    let _ = write!(out, " (dhcpConfigured {name})");
                }
                DiffState::Removed => {
                    let _ = write!(out, " (old {name})");
                }
                _ => {}
            }
        }
    }
    if let Some(dnss) = address.diff.attr("dnsservices").and_then(|attr| attr.elements.as_ref()) {
        for dns in dnss {
            let name = low(&dns.id);
            let _ = write!(out, "\n\t\t(part-of {name} {interface_name})");
            match dns.diff.state {
                DiffState::New => {
                    let _ = write!(out, " (new {name})");
                }
                DiffState::Unchanged => {
                    let _ = write!(out, " (dnsConfigured {name})");
                }
                DiffState::Removed => {
                    let _ = write!(out, " (old {name})");
                }
                _ => {}
            }
        }
    }
}

fn write_goal(out: &mut String) {
    let _ = writeln!(out, "\t(:goal");
    let _ = writeln!(out, "\t\t(and");
    let _ = writeln!(out, "\t\t\t(forall (?x) (imply (old ?x) (not (created ?x))))");
    let _ = writeln!(out, "\t\t\t(forall (?n - network) (imply (not (old ?n)) (created ?n)))");
    let _ = writeln!(
        out,
        "\t\t\t(forall (?h - host) (imply (not (old ?h)) (and (running ?h) (named ?h) (not (templateChanged ?h)) (cpusConfigured ?h) (memoryConfigured ?h) (firewallConfigured ?h) (not (nameNotApplied ?h)))))"
    );
    let _ = writeln!(
        out,
        "\t\t\t(forall (?i - interface) (imply (not (old ?i)) (and (created ?i) (rateConfigured ?i) (mtuConfigured ?i) (networkConfigured ?i) (interfaceConfigured ?i))))"
    );
    let _ = writeln!(out, "\t\t\t(forall (?d - dns) (dnsConfigured ?d))");
    let _ = writeln!(out, "\t\t\t(forall (?d - dhcp) (dhcpConfigured ?d))");
    let _ = writeln!(out, "\t\t\t(forall (?r - router) (routingConfigured ?r))");
    let _ = writeln!(out, "\t\t\t(forall (?x - interface) (imply (old ?x) (not (interfaceConfigured ?x))))");
    let _ = writeln!(out, "\t\t\t(forall (?x - network) (imply (new ?x) (configNameAdded ?x)))");
    let _ = writeln!(out, "\t\t\t(forall (?x - host) (imply (new ?x) (configNameAdded ?x)))");
    let _ = writeln!(out, "\t\t\t(forall (?x - disk) (imply (new ?x) (configNameAdded ?x)))");
    let _ = writeln!(
        out,
        "\t\t\t(forall (?h - host) (forall (?d - disk) (imply (and (part-of ?d ?h) (not (old ?d))) (attached ?d ?h))))"
    );
    let _ = writeln!(
        out,
        "\t\t\t(forall (?h - host) (forall (?d - disk) (imply (and (part-of ?d ?h) (old ?d)) (not (attached ?d ?h)))))"
    );
    let _ = writeln!(out, "\t\t)");
    let _ = writeln!(out, "\t)");
    let _ = writeln!(out, "\t(:metric minimize (total-cost))");
}

fn low(id: &str) -> String {
    id.to_lowercase()
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
