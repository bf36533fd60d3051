// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serialize a graph back into the goal-configuration document shape.

use crate::XmlError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use trellis_core::{Entity, Graph, NodeId, ServiceExtra};

/// Render the whole topology as an XML document.
pub fn write_topology(graph: &Graph) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    let mut config = BytesStart::new("config");
    config.push_attribute(("name", graph.name()));
    writer.write_event(Event::Start(config))?;

    writer.write_event(Event::Start(BytesStart::new("locations")))?;
    for location in graph.locations() {
        if let Some(Entity::Location(data)) = graph.entity(location) {
            let mut element = BytesStart::new("location");
            element.push_attribute(("id", data.id.as_str()));
            writer.write_event(Event::Empty(element))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("locations")))?;

    writer.write_event(Event::Start(BytesStart::new("layer2networks")))?;
    for network in graph.l2_networks() {
        if let Some(Entity::L2Network(data)) = graph.entity(network) {
            let mut element = BytesStart::new("layer2network");
            element.push_attribute(("id", data.id.as_str()));
            if let Some(location) = graph.location_of(network) {
                if let Some(Entity::Location(loc)) = graph.entity(location) {
                    element.push_attribute(("location", loc.id.as_str()));
                }
            }
            writer.write_event(Event::Empty(element))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("layer2networks")))?;

    writer.write_event(Event::Start(BytesStart::new("layer3networks")))?;
    for network in graph.l3_networks() {
        if let Some(Entity::L3Network(data)) = graph.entity(network) {
            let mut element = BytesStart::new("layer3network");
            element.push_attribute(("id", data.id.as_str()));
            element.push_attribute(("address", data.address.as_str()));
            element.push_attribute(("netmask", data.netmask.as_str()));
            writer.write_event(Event::Empty(element))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("layer3networks")))?;

    writer.write_event(Event::Start(BytesStart::new("hosts")))?;
    for host in graph.hosts() {
        write_host(graph, host, &mut writer)?;
    }
    writer.write_event(Event::End(BytesEnd::new("hosts")))?;

    writer.write_event(Event::End(BytesEnd::new("config")))?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn write_host(graph: &Graph, host: NodeId, writer: &mut Writer<Vec<u8>>) -> Result<(), XmlError> {
    let Some(Entity::Host(data)) = graph.entity(host) else {
        return Ok(());
    };
    let mut element = BytesStart::new("host");
    element.push_attribute(("id", data.id.as_str()));
    if let Some(cpus) = data.cpus {
        element.push_attribute(("cpus", cpus.to_string().as_str()));
    }
    if let (Some(min), Some(max)) = (data.memory_min, data.memory_max) {
        element.push_attribute(("memoryMin", min.to_string().as_str()));
        element.push_attribute(("memoryMax", max.to_string().as_str()));
    }
    if let Some(location) = graph.location_of(host) {
        if let Some(Entity::Location(loc)) = graph.entity(location) {
            element.push_attribute(("location", loc.id.as_str()));
        }
    }
    if let Some(template) = graph.template_of_host(host) {
        if let Some(Entity::Template(tmpl)) = graph.entity(template) {
            element.push_attribute(("template", tmpl.id.as_str()));
        }
    }
    if let Some(state) = data.power_state {
        element.push_attribute(("powerState", state.to_string().as_str()));
    }
    writer.write_event(Event::Start(element))?;

    writer.write_event(Event::Start(BytesStart::new("interfaces")))?;
    for interface in graph.interfaces_of(host) {
        write_interface(graph, interface, writer)?;
    }
    writer.write_event(Event::End(BytesEnd::new("interfaces")))?;

    writer.write_event(Event::Start(BytesStart::new("routes")))?;
    for route in graph.routes_of(host) {
        if let Some(Entity::Route(data)) = graph.entity(route) {
            let mut element = BytesStart::new("route");
            element.push_attribute(("destination", data.destination.as_str()));
            element.push_attribute(("genmask", data.genmask.as_str()));
            element.push_attribute(("gateway", data.gateway.as_str()));
            if let Some(interface) = graph.interface_of_route(route) {
                if let Some(entity) = graph.entity(interface) {
                    element.push_attribute(("interface", entity.local_id().as_str()));
                }
            }
            writer.write_event(Event::Empty(element))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("routes")))?;

    writer.write_event(Event::Start(BytesStart::new("disks")))?;
    for disk in graph.disks_of(host) {
        if let Some(Entity::Disk(data)) = graph.entity(disk) {
            let mut element = BytesStart::new("disk");
            element.push_attribute(("id", data.id.as_str()));
            if let Some(size) = data.size {
                element.push_attribute(("size", size.to_string().as_str()));
            }
            writer.write_event(Event::Empty(element))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("disks")))?;

    writer.write_event(Event::Start(BytesStart::new("firewall")))?;
    writer.write_event(Event::Start(BytesStart::new("firewallRules")))?;
    for rule in graph.firewall_rules_of(host) {
        write_rule(graph, rule, writer)?;
    }
    if let Some(raw) = graph.firewall_raw_of(host) {
        if let Some(Entity::FirewallRaw(data)) = graph.entity(raw) {
            let mut element = BytesStart::new("raw");
            element.push_attribute(("firewall", data.firewall.as_str()));
            writer.write_event(Event::Start(element))?;
            writer.write_event(Event::Text(BytesText::new(&data.data)))?;
            writer.write_event(Event::End(BytesEnd::new("raw")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("firewallRules")))?;
    writer.write_event(Event::End(BytesEnd::new("firewall")))?;

    writer.write_event(Event::End(BytesEnd::new("host")))?;
    Ok(())
}

fn write_interface(
    graph: &Graph,
    interface: NodeId,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), XmlError> {
    let Some(Entity::Interface(data)) = graph.entity(interface) else {
        return Ok(());
    };
    let mut element = BytesStart::new("interface");
    element.push_attribute(("mac", data.mac.as_str()));
    if let Some(network) = graph.network_of_interface(interface) {
        if let Some(Entity::L2Network(net)) = graph.entity(network) {
            element.push_attribute(("network", net.id.as_str()));
        }
    }
    if let Some(rate) = data.rate {
        element.push_attribute(("rate", rate.to_string().as_str()));
    }
    if let Some(mtu) = data.mtu {
        element.push_attribute(("mtu", mtu.to_string().as_str()));
    }
    writer.write_event(Event::Start(element))?;

    for address in graph.addresses_of(interface) {
        write_address(graph, address, writer)?;
    }

    writer.write_event(Event::End(BytesEnd::new("interface")))?;
    Ok(())
}

fn write_address(
    graph: &Graph,
    address: NodeId,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), XmlError> {
    let Some(Entity::L3Address(data)) = graph.entity(address) else {
        return Ok(());
    };
    let mut element = BytesStart::new("layer3address");
    element.push_attribute(("address", data.address.as_str()));
    if let Some(netmask) = &data.netmask {
        element.push_attribute(("netmask", netmask.as_str()));
    }
    if let Some(gateway) = &data.gateway {
        element.push_attribute(("gateway", gateway.as_str()));
    }
    element.push_attribute(("static", if data.is_static { "True" } else { "False" }));
    if let Some(network) = graph.network_of_address(address) {
        if let Some(Entity::L3Network(net)) = graph.entity(network) {
            element.push_attribute(("network", net.id.as_str()));
        }
    }
    writer.write_event(Event::Start(element))?;

    writer.write_event(Event::Start(BytesStart::new("services")))?;
    for service in graph.services_of(address) {
        write_service(graph, service, writer)?;
    }
    writer.write_event(Event::End(BytesEnd::new("services")))?;

    writer.write_event(Event::End(BytesEnd::new("layer3address")))?;
    Ok(())
}

fn write_service(
    graph: &Graph,
    service: NodeId,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), XmlError> {
    let Some(Entity::Service(data)) = graph.entity(service) else {
        return Ok(());
    };
    let mut element = match &data.extra {
        ServiceExtra::Generic => {
            let mut element = BytesStart::new("service");
            element.push_attribute(("port", data.port.to_string().as_str()));
            element.push_attribute(("protocol", data.protocol.as_str()));
            element.push_attribute(("type", data.kind.as_str()));
            element
        }
        ServiceExtra::Dns { domain } => {
            let mut element = BytesStart::new("dns");
            if let Some(domain) = domain {
                element.push_attribute(("domain", domain.as_str()));
            }
            element
        }
        ServiceExtra::Dhcp { lease, range_start, range_end, announced_gateway } => {
            let mut element = BytesStart::new("dhcp");
            if let Some(lease) = lease {
                element.push_attribute(("lease", lease.to_string().as_str()));
            }
            if let (Some(start), Some(end)) = (range_start, range_end) {
                element.push_attribute(("from", start.as_str()));
                element.push_attribute(("to", end.as_str()));
            }
            if let Some(gateway) = announced_gateway {
                element.push_attribute(("announcedGateway", gateway.as_str()));
            }
            element
        }
    };
    if let Some(product) = &data.product {
        element.push_attribute(("product", product.as_str()));
        if let Some(version) = &data.version {
            element.push_attribute(("version", version.as_str()));
        }
    }
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

fn write_rule(graph: &Graph, rule: NodeId, writer: &mut Writer<Vec<u8>>) -> Result<(), XmlError> {
    let Some(Entity::FirewallRule(data)) = graph.entity(rule) else {
        return Ok(());
    };
    let mut element = BytesStart::new("rule");
    element.push_attribute(("chain", data.chain.as_str()));
    element.push_attribute(("action", data.action.as_str()));
    if let Some(protocol) = &data.protocol {
        element.push_attribute(("protocol", protocol.as_str()));
    }
    if let Some(srcnet) = &data.srcnet {
        element.push_attribute(("srcnet", srcnet.as_str()));
    }
    if let Some(destnet) = &data.destnet {
        element.push_attribute(("destnet", destnet.as_str()));
    }
    if let Some(srcports) = &data.srcports {
        element.push_attribute(("srcports", srcports.as_str()));
    }
    if let Some(destports) = &data.destports {
        element.push_attribute(("destports", destports.as_str()));
    }
    if let Some(interface) = graph.in_interface_of_rule(rule) {
        if let Some(entity) = graph.entity(interface) {
            element.push_attribute(("inInterface", entity.local_id().as_str()));
        }
    }
    if let Some(interface) = graph.out_interface_of_rule(rule) {
        if let Some(entity) = graph.entity(interface) {
            element.push_attribute(("outInterface", entity.local_id().as_str()));
        }
    }
    writer.write_event(Event::Empty(element))?;
    Ok(())
}
