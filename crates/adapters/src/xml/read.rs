// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parse a goal configuration document into graph state.

use crate::XmlError;
use roxmltree::{Document, Node};
use std::collections::{BTreeSet, HashSet};
use trellis_config::LocationsRegistry;
use trellis_core::{interface_id_from_mac, FirewallRuleData, Graph, NodeId, Ttl};

/// The goal file pins its content until the file changes.
const TTL: Ttl = Ttl::Forever;

/// Name of the configuration, from the root element.
pub fn config_name(xml: &str) -> Result<String, XmlError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "config" {
        return Err(XmlError::NotAConfig);
    }
    require(&root, "name").map(str::to_string)
}

/// Load the document into `graph`, verified by `source`. Returns every node
/// the document mentioned so the caller can withdraw the rest.
pub fn load_goal(
    graph: &Graph,
    xml: &str,
    source: &str,
    locations: &LocationsRegistry,
) -> Result<HashSet<NodeId>, XmlError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "config" {
        return Err(XmlError::NotAConfig);
    }

    let mut read = HashSet::new();
    if let Some(section) = child(&root, "locations") {
        for element in named_children(&section, "location") {
            let id = require(&element, "id")?;
            let location = create_location(graph, id, source, locations, &mut read)?;
            read.insert(location);
        }
    }
    if let Some(section) = child(&root, "layer2networks") {
        read_l2_networks(graph, &section, source, locations, &mut read)?;
    }
    if let Some(section) = child(&root, "layer3networks") {
        for element in named_children(&section, "layer3network") {
            let id = require(&element, "id")?;
            let address = require(&element, "address")?;
            let netmask = require(&element, "netmask")?;
            read.insert(graph.get_or_create_l3network(id, source, TTL, address, netmask)?);
        }
    }
    if let Some(section) = child(&root, "hosts") {
        for element in named_children(&section, "host") {
            read_host(graph, &element, source, locations, &mut read)?;
        }
    }
    Ok(read)
}

/// Locations pull their hypervisor kind and template set from the registry.
fn create_location(
    graph: &Graph,
    id: &str,
    source: &str,
    locations: &LocationsRegistry,
    read: &mut HashSet<NodeId>,
) -> Result<NodeId, XmlError> {
    let location = graph.get_or_create_location(id, source, TTL)?;
    if let Some(entry) = locations.get(id) {
        graph.set_location_info(
            location,
            entry.hypervisor.as_deref(),
            entry.default_template.as_deref(),
        );
        for (template_id, template) in &entry.templates {
            let metadata: BTreeSet<_> =
                template.metadata.iter().map(|tag| tag.as_str().into()).collect();
            let node =
                graph.get_or_create_template(location, template_id, metadata, source, TTL)?;
            read.insert(node);
        }
    }
    Ok(location)
}

fn read_l2_networks(
    graph: &Graph,
    section: &Node<'_, '_>,
    source: &str,
    locations: &LocationsRegistry,
    read: &mut HashSet<NodeId>,
) -> Result<(), XmlError> {
    for element in named_children(section, "layer2network") {
        let id = require(&element, "id")?;
        let location_id = element.attribute("location").unwrap_or("physical");
        let location = create_location(graph, location_id, source, locations, read)?;
        read.insert(location);
        let network = graph.get_or_create_l2network(id, source, TTL, Some(location))?;
        read.insert(network);
        tracing::debug!(network = id, location = location_id, "found layer-2 network");
    }
    Ok(())
}

fn read_host(
    graph: &Graph,
    element: &Node<'_, '_>,
    source: &str,
    locations: &LocationsRegistry,
    read: &mut HashSet<NodeId>,
) -> Result<(), XmlError> {
    let id = require(element, "id")?;
    let location_id = require(element, "location")?;
    let location = create_location(graph, location_id, source, locations, read)?;
    read.insert(location);

    let template = element.attribute("template").and_then(|template_id| {
        graph.templates_of(location).into_iter().find(|node| {
            graph
                .entity(*node)
                .map(|entity| entity.local_id() == template_id)
                .unwrap_or(false)
        })
    });

    let host = graph.get_or_create_host(id, source, TTL, Some(location), template)?;
    read.insert(host);
    tracing::debug!(host = id, "found host");

    if let Some(cpus) = parse_attr(element, "cpus")? {
        graph.set_cpus(host, cpus, source, TTL);
    }
    if let (Some(min), Some(max)) = (parse_attr(element, "memoryMin")?, parse_attr(element, "memoryMax")?) {
        graph.set_memory(host, min, max, source, TTL);
    }
    if let Some(state) = element.attribute("powerState") {
        if let Ok(state) = state.parse() {
            graph.set_power_state(host, state, source, TTL);
        }
    }

    if let Some(section) = child(element, "interfaces") {
        for interface in named_children(&section, "interface") {
            read_interface(graph, &interface, host, source, read)?;
        }
    }
    if let Some(section) = child(element, "routes") {
        for route in named_children(&section, "route") {
            read_route(graph, &route, host, source, read)?;
        }
    }
    if let Some(section) = child(element, "disks") {
        for disk in named_children(&section, "disk") {
            let name = require(&disk, "id")?;
            let size = parse_attr(&disk, "size")?;
            let node = graph.get_or_create_disk(host, name, source, TTL, size)?;
            graph.add_disk(host, node, source, TTL)?;
            read.insert(node);
        }
    }
    if let Some(rules) = descendant(element, "firewallRules") {
        for rule in named_children(&rules, "rule") {
            read_firewall_rule(graph, &rule, host, source, read)?;
        }
    }
    if let Some(raw) = descendant(element, "raw") {
        let firewall = require(&raw, "firewall")?;
        let data = raw.text().unwrap_or_default();
        let node = graph.get_or_create_firewall_raw(host, source, TTL, firewall, data)?;
        graph.set_firewall_raw(host, node, source, TTL)?;
        read.insert(node);
    }
    Ok(())
}

fn read_interface(
    graph: &Graph,
    element: &Node<'_, '_>,
    host: NodeId,
    source: &str,
    read: &mut HashSet<NodeId>,
) -> Result<(), XmlError> {
    let mac = require(element, "mac")?;
    let Some(network_id) = element.attribute("network") else {
        tracing::warn!(mac, "interface has no network attribute, skipping");
        return Ok(());
    };
    let Some(network) = graph.find_l2_network(network_id) else {
        tracing::warn!(mac, network = network_id, "no such layer-2 network, skipping interface");
        return Ok(());
    };

    let interface = graph.get_or_create_interface(mac, source, TTL, Some(network))?;
    read.insert(interface);
    if let Some(rate) = parse_attr(element, "rate")? {
        graph.set_rate(interface, rate, source, TTL);
    }
    if let Some(mtu) = parse_attr(element, "mtu")? {
        graph.set_mtu(interface, mtu, source, TTL);
    }
    graph.add_interface(host, interface, source, TTL)?;

    for address in named_children(element, "layer3address") {
        read_address(graph, &address, interface, source, read)?;
    }
    Ok(())
}

fn read_address(
    graph: &Graph,
    element: &Node<'_, '_>,
    interface: NodeId,
    source: &str,
    read: &mut HashSet<NodeId>,
) -> Result<(), XmlError> {
    let ip = require(element, "address")?;
    let Some(network_id) = element.attribute("network") else {
        tracing::warn!(address = ip, "address without network attribute, skipping");
        return Ok(());
    };
    let network = graph.find_l3_network(network_id);
    if network.is_none() {
        tracing::warn!(address = ip, network = network_id, "no such layer-3 network");
    }

    // The address inherits the network's netmask unless it sets its own.
    let network_netmask = network.and_then(|node| match graph.entity(node) {
        Some(trellis_core::Entity::L3Network(data)) => Some(data.netmask.to_string()),
        _ => None,
    });
    let netmask = element.attribute("netmask").map(str::to_string).or(network_netmask);
    let gateway = element.attribute("gateway");

    let address = graph.get_or_create_l3address(ip, source, TTL, netmask.as_deref(), gateway)?;
    read.insert(address);

    let is_static = element
        .attribute("static")
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(true);
    graph.set_static(address, is_static, source, TTL);

    if let Some(network) = network {
        graph.set_address_network(address, Some(network), source, TTL)?;
    }
    graph.add_address(interface, address, source, TTL)?;

    if let Some(section) = child(element, "services") {
        for service in section.children().filter(Node::is_element) {
            read_service(graph, &service, address, source, read)?;
        }
    }
    Ok(())
}

fn read_service(
    graph: &Graph,
    element: &Node<'_, '_>,
    address: NodeId,
    source: &str,
    read: &mut HashSet<NodeId>,
) -> Result<(), XmlError> {
    let service = match element.tag_name().name() {
        "dhcp" => {
            let service = graph.get_or_create_dhcp_service(address, source, TTL)?;
            if let Some(lease) = parse_attr(element, "lease")? {
                graph.set_lease(service, lease, source, TTL);
            }
            if let (Some(start), Some(end)) = (element.attribute("from"), element.attribute("to")) {
                graph.set_dhcp_range(service, start, end, source, TTL);
            }
            if let Some(gateway) = element.attribute("announcedGateway") {
                graph.set_announced_gateway(service, gateway, source, TTL);
            }
            service
        }
        "dns" => {
            let service = graph.get_or_create_dns_service(address, source, TTL)?;
            if let Some(domain) = element.attribute("domain") {
                graph.set_domain(service, domain, source, TTL);
            }
            service
        }
        _ => {
            let port = parse_attr(element, "port")?
                .ok_or_else(|| missing(element, "port"))?;
            let protocol = require(element, "protocol")?;
            let kind = require(element, "type")?;
            graph.get_or_create_service(address, port, protocol, kind, source, TTL)?
        }
    };
    if let Some(product) = element.attribute("product") {
        graph.set_product(service, product);
    }
    if let Some(version) = element.attribute("version") {
        graph.set_version(service, version, source, TTL);
    }
    graph.add_service(address, service, source, TTL)?;
    read.insert(service);
    Ok(())
}

fn read_route(
    graph: &Graph,
    element: &Node<'_, '_>,
    host: NodeId,
    source: &str,
    read: &mut HashSet<NodeId>,
) -> Result<(), XmlError> {
    let destination = require(element, "destination")?;
    let genmask = require(element, "genmask")?;
    let gateway = require(element, "gateway")?;
    let interface = element
        .attribute("interface")
        .and_then(|id| graph.find_interface(id));

    let route =
        graph.get_or_create_route(host, source, TTL, destination, genmask, gateway, interface)?;
    graph.add_route(host, route, source, TTL)?;
    read.insert(route);
    Ok(())
}

fn read_firewall_rule(
    graph: &Graph,
    element: &Node<'_, '_>,
    host: NodeId,
    source: &str,
    read: &mut HashSet<NodeId>,
) -> Result<(), XmlError> {
    let rule = FirewallRuleData {
        chain: require(element, "chain")?.into(),
        action: require(element, "action")?.into(),
        protocol: element.attribute("protocol").map(Into::into),
        srcnet: element.attribute("srcnet").map(Into::into),
        destnet: element.attribute("destnet").map(Into::into),
        srcports: element.attribute("srcports").map(Into::into),
        destports: element.attribute("destports").map(Into::into),
    };
    let in_interface = element
        .attribute("inInterface")
        .and_then(|id| graph.find_interface(&canonical_interface(id)));
    let out_interface = element
        .attribute("outInterface")
        .and_then(|id| graph.find_interface(&canonical_interface(id)));

    let node =
        graph.get_or_create_firewall_rule(host, source, TTL, rule, in_interface, out_interface)?;
    graph.add_firewall_rule(host, node, source, TTL)?;
    read.insert(node);
    Ok(())
}

/// Rule attributes may name an interface by MAC or by canonical name.
fn canonical_interface(id: &str) -> String {
    if id.contains(':') {
        interface_id_from_mac(id)
    } else {
        id.to_string()
    }
}

// ---- element helpers ----

fn child<'a, 'input>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.is_element() && c.tag_name().name() == name)
}

fn descendant<'a, 'input>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|c| c.is_element() && c.tag_name().name() == name)
}

fn named_children<'a, 'input>(
    node: &Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |c| c.is_element() && c.tag_name().name() == name)
}

fn require<'a>(node: &Node<'a, '_>, attribute: &str) -> Result<&'a str, XmlError> {
    node.attribute(attribute).ok_or_else(|| missing(node, attribute))
}

fn missing(node: &Node<'_, '_>, attribute: &str) -> XmlError {
    XmlError::MissingAttribute {
        element: node.tag_name().name().to_string(),
        attribute: attribute.to_string(),
    }
}

fn parse_attr<T: std::str::FromStr>(
    node: &Node<'_, '_>,
    attribute: &str,
) -> Result<Option<T>, XmlError> {
    match node.attribute(attribute) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| XmlError::BadAttribute {
            element: node.tag_name().name().to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }),
    }
}
