// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-type factories and setters.
//!
//! Every factory takes the calling collector's source name and TTL, holds
//! the entity type's lock across the lookup-or-construct step, and either
//! refreshes the existing node's verification or constructs it and emits
//! `onNew`. Setters compare before mutating and emit `onChanged` only for a
//! real change, then re-verify the node for the calling source.

use super::kernel::{EdgeKind, GraphInner};
use super::{Graph, GraphError, NodeId};
use crate::entity::{
    DiskData, Entity, EntityKind, FirewallRawData, FirewallRuleData, HostData, InterfaceData,
    L2NetworkData, L3AddressData, L3NetworkData, LocationData, PowerState, RouteData, ServiceData,
    ServiceExtra, TemplateData,
};
use crate::event::{ChangeKind, GraphEvent};
use crate::timer::Ttl;
use petgraph::stable_graph::NodeIndex;
use serde_json::{json, Map, Value};
use smol_str::SmolStr;
use std::collections::BTreeSet;
use std::time::Instant;

fn new_event(object_type: EntityKind, values: Map<String, Value>) -> GraphEvent {
    GraphEvent::New { object_type, values }
}

fn set_event(
    object_type: EntityKind,
    object: String,
    member: &str,
    value: Value,
) -> GraphEvent {
    GraphEvent::Changed {
        object_type,
        object,
        change: ChangeKind::Set,
        member: Some(SmolStr::from(member)),
        value,
    }
}

impl Graph {
    // ---- factories ----

    pub fn get_or_create_host(
        &self,
        id: &str,
        source: &str,
        ttl: Ttl,
        location: Option<NodeId>,
        template: Option<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Host);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        if let Some(existing) = find_kind(&inner, EntityKind::Host, |e| e.local_id() == id) {
            set_association(&mut inner, existing, location.map(|l| l.0), EntityKind::Location, "location", source, ttl, now)?;
            set_template(&mut inner, existing, template.map(|t| t.0), source, ttl, now)?;
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        // A freshly cloned machine still answers to its template's name.
        let name_applied = match template.and_then(|t| inner.entity(t.0)) {
            Some(Entity::Template(data)) => data.id != id,
            _ => true,
        };
        let host = inner.add_node(
            Entity::Host(HostData { id: id.into(), name_applied, ..HostData::default() }),
            source,
            ttl,
            now,
            epoch,
        );

        let mut values = Map::new();
        values.insert("id".into(), json!(id));
        if let Some(location) = location {
            values.insert("location".into(), json!(local_id(&inner, location.0)));
            inner.add_edge(host, location.0, EdgeKind::Association, None, Some((source, ttl)), Some("location"), Some(host), now, false)?;
        }
        if let Some(template) = template {
            values.insert("template".into(), json!(local_id(&inner, template.0)));
            inner.add_edge(template.0, host, EdgeKind::PartOf, None, Some((source, ttl)), Some("template"), Some(host), now, false)?;
        }
        inner.pending.push(new_event(EntityKind::Host, values));
        self.commit(inner);
        Ok(NodeId(host))
    }

    pub fn get_or_create_l2network(
        &self,
        id: &str,
        source: &str,
        ttl: Ttl,
        location: Option<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Layer2Network);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        if let Some(existing) = find_kind(&inner, EntityKind::Layer2Network, |e| e.local_id() == id) {
            set_association(&mut inner, existing, location.map(|l| l.0), EntityKind::Location, "location", source, ttl, now)?;
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let network = inner.add_node(
            Entity::L2Network(L2NetworkData { id: id.into(), ..L2NetworkData::default() }),
            source,
            ttl,
            now,
            epoch,
        );
        let mut values = Map::new();
        values.insert("id".into(), json!(id));
        if let Some(location) = location {
            values.insert("location".into(), json!(local_id(&inner, location.0)));
            inner.add_edge(network, location.0, EdgeKind::Association, None, Some((source, ttl)), Some("location"), Some(network), now, false)?;
        }
        inner.pending.push(new_event(EntityKind::Layer2Network, values));
        self.commit(inner);
        Ok(NodeId(network))
    }

    /// Interfaces are keyed by MAC.
    pub fn get_or_create_interface(
        &self,
        mac: &str,
        source: &str,
        ttl: Ttl,
        network: Option<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Interface);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        let found = find_kind(&inner, EntityKind::Interface, |e| match e {
            Entity::Interface(data) => data.mac == mac,
            _ => false,
        });
        if let Some(existing) = found {
            set_association(&mut inner, existing, network.map(|n| n.0), EntityKind::Layer2Network, "network", source, ttl, now)?;
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let interface = inner.add_node(
            Entity::Interface(InterfaceData { mac: mac.into(), ..InterfaceData::default() }),
            source,
            ttl,
            now,
            epoch,
        );
        let mut values = Map::new();
        values.insert("mac".into(), json!(mac));
        if let Some(network) = network {
            values.insert("network".into(), json!(local_id(&inner, network.0)));
            inner.add_edge(interface, network.0, EdgeKind::Association, None, Some((source, ttl)), Some("network"), Some(interface), now, false)?;
        }
        inner.pending.push(new_event(EntityKind::Interface, values));
        self.commit(inner);
        Ok(NodeId(interface))
    }

    pub fn get_or_create_l3network(
        &self,
        id: &str,
        source: &str,
        ttl: Ttl,
        address: &str,
        netmask: &str,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Layer3Network);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        if let Some(existing) = find_kind(&inner, EntityKind::Layer3Network, |e| e.local_id() == id) {
            let object = inner.global_id(existing);
            let mut events = Vec::new();
            if let Some(Entity::L3Network(data)) = inner.entity_mut(existing) {
                if data.address != address {
                    data.address = address.into();
                    events.push(set_event(EntityKind::Layer3Network, object.clone(), "address", json!(address)));
                }
                if data.netmask != netmask {
                    data.netmask = netmask.into();
                    events.push(set_event(EntityKind::Layer3Network, object, "netmask", json!(netmask)));
                }
            }
            inner.pending.extend(events);
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let network = inner.add_node(
            Entity::L3Network(L3NetworkData { id: id.into(), address: address.into(), netmask: netmask.into() }),
            source,
            ttl,
            now,
            epoch,
        );
        let mut values = Map::new();
        values.insert("id".into(), json!(id));
        values.insert("address".into(), json!(address));
        values.insert("netmask".into(), json!(netmask));
        inner.pending.push(new_event(EntityKind::Layer3Network, values));
        self.commit(inner);
        Ok(NodeId(network))
    }

    /// Addresses are keyed by the dotted IP.
    pub fn get_or_create_l3address(
        &self,
        address: &str,
        source: &str,
        ttl: Ttl,
        netmask: Option<&str>,
        gateway: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Layer3Address);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        let found = find_kind(&inner, EntityKind::Layer3Address, |e| match e {
            Entity::L3Address(data) => data.address == address,
            _ => false,
        });
        if let Some(existing) = found {
            let object = inner.global_id(existing);
            let mut events = Vec::new();
            if let Some(Entity::L3Address(data)) = inner.entity_mut(existing) {
                if data.gateway.as_deref() != gateway {
                    data.gateway = gateway.map(SmolStr::from);
                    events.push(set_event(EntityKind::Layer3Address, object.clone(), "gateway", json!(gateway)));
                }
                if let Some(netmask) = netmask {
                    if data.netmask.as_deref() != Some(netmask) {
                        data.netmask = Some(netmask.into());
                        events.push(set_event(EntityKind::Layer3Address, object, "netmask", json!(netmask)));
                    }
                }
            }
            inner.pending.extend(events);
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let node = inner.add_node(
            Entity::L3Address(L3AddressData {
                address: address.into(),
                netmask: netmask.map(SmolStr::from),
                gateway: gateway.map(SmolStr::from),
                is_static: false,
            }),
            source,
            ttl,
            now,
            epoch,
        );
        let mut values = Map::new();
        values.insert("address".into(), json!(address));
        values.insert("netmask".into(), json!(netmask));
        values.insert("gateway".into(), json!(gateway));
        inner.pending.push(new_event(EntityKind::Layer3Address, values));
        self.commit(inner);
        Ok(NodeId(node))
    }

    /// Services are keyed by (address, port, protocol). The node is created
    /// as part of the address.
    pub fn get_or_create_service(
        &self,
        address: NodeId,
        port: u16,
        protocol: &str,
        kind: &str,
        source: &str,
        ttl: Ttl,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Service);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        let found = service_children(&inner, address.0).into_iter().find(|idx| {
            match inner.entity(*idx) {
                Some(Entity::Service(data)) => data.port == port && data.protocol == protocol,
                _ => false,
            }
        });
        if let Some(existing) = found {
            let object = inner.global_id(existing);
            let mut changed = false;
            if let Some(Entity::Service(data)) = inner.entity_mut(existing) {
                if data.kind != kind {
                    data.kind = kind.into();
                    changed = true;
                }
            }
            if changed {
                let object_type = inner.kind(existing).unwrap_or(EntityKind::Service);
                inner.pending.push(set_event(object_type, object, "type", json!(kind)));
            }
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let service = inner.add_node(
            Entity::Service(ServiceData::generic(port, protocol, kind)),
            source,
            ttl,
            now,
            epoch,
        );
        inner.add_edge(service, address.0, EdgeKind::PartOf, None, Some((source, ttl)), None, None, now, false)?;
        let mut values = Map::new();
        values.insert("port".into(), json!(port));
        values.insert("protocol".into(), json!(protocol));
        values.insert("type".into(), json!(kind));
        values.insert("address".into(), json!(local_id(&inner, address.0)));
        inner.pending.push(new_event(EntityKind::Service, values));
        self.commit(inner);
        Ok(NodeId(service))
    }

    pub fn get_or_create_dns_service(
        &self,
        address: NodeId,
        source: &str,
        ttl: Ttl,
    ) -> Result<NodeId, GraphError> {
        self.get_or_create_special_service(address, source, ttl, EntityKind::DnsService)
    }

    pub fn get_or_create_dhcp_service(
        &self,
        address: NodeId,
        source: &str,
        ttl: Ttl,
    ) -> Result<NodeId, GraphError> {
        self.get_or_create_special_service(address, source, ttl, EntityKind::DhcpService)
    }

    fn get_or_create_special_service(
        &self,
        address: NodeId,
        source: &str,
        ttl: Ttl,
        kind: EntityKind,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(kind);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        let found = service_children(&inner, address.0)
            .into_iter()
            .find(|idx| inner.kind(*idx) == Some(kind));
        if let Some(existing) = found {
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let data = if kind == EntityKind::DnsService { ServiceData::dns() } else { ServiceData::dhcp() };
        let service = inner.add_node(Entity::Service(data), source, ttl, now, epoch);
        inner.add_edge(service, address.0, EdgeKind::PartOf, None, Some((source, ttl)), None, None, now, false)?;
        let mut values = Map::new();
        values.insert("address".into(), json!(local_id(&inner, address.0)));
        inner.pending.push(new_event(kind, values));
        self.commit(inner);
        Ok(NodeId(service))
    }

    /// Disks are keyed by (host, name). The caller links the disk to the
    /// host with [`Graph::add_disk`].
    pub fn get_or_create_disk(
        &self,
        host: NodeId,
        name: &str,
        source: &str,
        ttl: Ttl,
        size: Option<u64>,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Disk);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        let found = inner
            .children(host.0, Some(EntityKind::Disk))
            .into_iter()
            .find(|idx| inner.entity(*idx).map(|e| e.local_id() == name).unwrap_or(false));
        if let Some(existing) = found {
            let object = inner.global_id(existing);
            let mut changed = false;
            if let Some(Entity::Disk(data)) = inner.entity_mut(existing) {
                if size.is_some() && data.size != size {
                    data.size = size;
                    changed = true;
                }
            }
            if changed {
                inner.pending.push(set_event(EntityKind::Disk, object, "size", json!(size)));
            }
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let disk = inner.add_node(
            Entity::Disk(DiskData { id: name.into(), size }),
            source,
            ttl,
            now,
            epoch,
        );
        let mut values = Map::new();
        values.insert("name".into(), json!(name));
        values.insert("host".into(), json!(local_id(&inner, host.0)));
        values.insert("size".into(), json!(size));
        inner.pending.push(new_event(EntityKind::Disk, values));
        self.commit(inner);
        Ok(NodeId(disk))
    }

    /// Locations are keyed case-insensitively; the stored id is lower-cased.
    pub fn get_or_create_location(
        &self,
        id: &str,
        source: &str,
        ttl: Ttl,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Location);
        let (now, epoch) = (self.now(), self.epoch());
        let id = id.to_lowercase();
        let mut inner = self.inner.lock();

        if let Some(existing) = find_kind(&inner, EntityKind::Location, |e| e.local_id() == id) {
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let location = inner.add_node(
            Entity::Location(LocationData { id: id.clone().into(), ..LocationData::default() }),
            source,
            ttl,
            now,
            epoch,
        );
        let mut values = Map::new();
        values.insert("id".into(), json!(id));
        inner.pending.push(new_event(EntityKind::Location, values));
        self.commit(inner);
        Ok(NodeId(location))
    }

    /// Templates are keyed by (location, id).
    pub fn get_or_create_template(
        &self,
        location: NodeId,
        id: &str,
        metadata: BTreeSet<SmolStr>,
        source: &str,
        ttl: Ttl,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Template);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        let found = inner
            .children(location.0, Some(EntityKind::Template))
            .into_iter()
            .find(|idx| inner.entity(*idx).map(|e| e.local_id() == id).unwrap_or(false));
        if let Some(existing) = found {
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let template = inner.add_node(
            Entity::Template(TemplateData { id: id.into(), metadata }),
            source,
            ttl,
            now,
            epoch,
        );
        inner.add_edge(template, location.0, EdgeKind::PartOf, None, Some((source, ttl)), None, None, now, false)?;
        let mut values = Map::new();
        values.insert("id".into(), json!(id));
        values.insert("location".into(), json!(local_id(&inner, location.0)));
        inner.pending.push(new_event(EntityKind::Template, values));
        self.commit(inner);
        Ok(NodeId(template))
    }

    /// Routes are keyed by (host, destination, genmask, gateway). The caller
    /// links the route with [`Graph::add_route`].
    #[allow(clippy::too_many_arguments)]
    pub fn get_or_create_route(
        &self,
        host: NodeId,
        source: &str,
        ttl: Ttl,
        destination: &str,
        genmask: &str,
        gateway: &str,
        interface: Option<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::Route);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        let found = inner.children(host.0, Some(EntityKind::Route)).into_iter().find(|idx| {
            match inner.entity(*idx) {
                Some(Entity::Route(data)) => {
                    data.destination == destination && data.genmask == genmask && data.gateway == gateway
                }
                _ => false,
            }
        });
        if let Some(existing) = found {
            set_association(&mut inner, existing, interface.map(|i| i.0), EntityKind::Interface, "interface", source, ttl, now)?;
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let route = inner.add_node(
            Entity::Route(RouteData {
                destination: destination.into(),
                genmask: genmask.into(),
                gateway: gateway.into(),
            }),
            source,
            ttl,
            now,
            epoch,
        );
        let mut values = Map::new();
        values.insert("host".into(), json!(local_id(&inner, host.0)));
        values.insert("dest".into(), json!(destination));
        values.insert("genmask".into(), json!(genmask));
        values.insert("gateway".into(), json!(gateway));
        if let Some(interface) = interface {
            values.insert("interface".into(), json!(local_id(&inner, interface.0)));
            inner.add_edge(route, interface.0, EdgeKind::Association, None, Some((source, ttl)), Some("interface"), Some(route), now, false)?;
        }
        inner.pending.push(new_event(EntityKind::Route, values));
        self.commit(inner);
        Ok(NodeId(route))
    }

    /// Firewall rules are keyed by (host, the seven rule fields, in/out
    /// interface). The caller links the rule with
    /// [`Graph::add_firewall_rule`].
    pub fn get_or_create_firewall_rule(
        &self,
        host: NodeId,
        source: &str,
        ttl: Ttl,
        rule: FirewallRuleData,
        in_interface: Option<NodeId>,
        out_interface: Option<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::FirewallRule);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        let found = inner.children(host.0, Some(EntityKind::FirewallRule)).into_iter().find(|idx| {
            let fields_match = match inner.entity(*idx) {
                Some(Entity::FirewallRule(data)) => *data == rule,
                _ => false,
            };
            fields_match
                && inner.named_neighbor(*idx, "inInterface") == in_interface.map(|i| i.0)
                && inner.named_neighbor(*idx, "outInterface") == out_interface.map(|i| i.0)
        });
        if let Some(existing) = found {
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let mut values = Map::new();
        values.insert("host".into(), json!(local_id(&inner, host.0)));
        values.insert("chain".into(), json!(rule.chain));
        values.insert("action".into(), json!(rule.action));
        values.insert("protocol".into(), json!(rule.protocol));
        if let Some(srcnet) = &rule.srcnet {
            values.insert("srcNetwork".into(), json!(srcnet));
        }
        if let Some(destnet) = &rule.destnet {
            values.insert("destNetwork".into(), json!(destnet));
        }
        if let Some(srcports) = &rule.srcports {
            values.insert("srcPorts".into(), json!(srcports));
        }
        if let Some(destports) = &rule.destports {
            values.insert("destPorts".into(), json!(destports));
        }

        let node = inner.add_node(Entity::FirewallRule(rule), source, ttl, now, epoch);
        if let Some(interface) = in_interface {
            values.insert("inInterface".into(), json!(local_id(&inner, interface.0)));
            inner.add_edge(node, interface.0, EdgeKind::Association, Some("inInterface"), Some((source, ttl)), Some("inInterface"), Some(node), now, false)?;
        }
        if let Some(interface) = out_interface {
            values.insert("outInterface".into(), json!(local_id(&inner, interface.0)));
            inner.add_edge(node, interface.0, EdgeKind::Association, Some("outInterface"), Some((source, ttl)), Some("outInterface"), Some(node), now, false)?;
        }
        inner.pending.push(new_event(EntityKind::FirewallRule, values));
        self.commit(inner);
        Ok(NodeId(node))
    }

    /// At most one raw dump per (host, firewall kind). The caller links it
    /// with [`Graph::set_firewall_raw`].
    pub fn get_or_create_firewall_raw(
        &self,
        host: NodeId,
        source: &str,
        ttl: Ttl,
        firewall: &str,
        data: &str,
    ) -> Result<NodeId, GraphError> {
        let _guard = self.lock_type(EntityKind::FirewallRaw);
        let (now, epoch) = (self.now(), self.epoch());
        let mut inner = self.inner.lock();

        let found = inner.children(host.0, Some(EntityKind::FirewallRaw)).into_iter().find(|idx| {
            match inner.entity(*idx) {
                Some(Entity::FirewallRaw(raw)) => raw.firewall == firewall,
                _ => false,
            }
        });
        if let Some(existing) = found {
            inner.verify_node(existing, source, ttl, now);
            self.commit(inner);
            return Ok(NodeId(existing));
        }

        let raw = FirewallRawData::normalized(firewall, data);
        let mut values = Map::new();
        values.insert("host".into(), json!(local_id(&inner, host.0)));
        values.insert("firewall".into(), json!(firewall));
        values.insert("data".into(), json!(raw.data));
        let node = inner.add_node(Entity::FirewallRaw(raw), source, ttl, now, epoch);
        inner.pending.push(new_event(EntityKind::FirewallRaw, values));
        self.commit(inner);
        Ok(NodeId(node))
    }

    // ---- association and containment setters ----

    pub fn set_location(&self, node: NodeId, location: Option<NodeId>, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        set_association(&mut inner, node.0, location.map(|l| l.0), EntityKind::Location, "location", source, ttl, now)?;
        inner.verify_node(node.0, source, ttl, now);
        self.commit(inner);
        Ok(())
    }

    pub fn set_template(&self, host: NodeId, template: Option<NodeId>, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        set_template(&mut inner, host.0, template.map(|t| t.0), source, ttl, now)?;
        inner.verify_node(host.0, source, ttl, now);
        self.commit(inner);
        Ok(())
    }

    /// Move an interface to another layer-2 network.
    pub fn set_network(&self, interface: NodeId, network: Option<NodeId>, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        set_association(&mut inner, interface.0, network.map(|n| n.0), EntityKind::Layer2Network, "network", source, ttl, now)?;
        inner.verify_node(interface.0, source, ttl, now);
        self.commit(inner);
        Ok(())
    }

    /// Attach an address to its layer-3 network.
    pub fn set_address_network(&self, address: NodeId, network: Option<NodeId>, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        set_association(&mut inner, address.0, network.map(|n| n.0), EntityKind::Layer3Network, "network", source, ttl, now)?;
        inner.verify_node(address.0, source, ttl, now);
        self.commit(inner);
        Ok(())
    }

    pub fn set_route_interface(&self, route: NodeId, interface: Option<NodeId>, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        set_association(&mut inner, route.0, interface.map(|i| i.0), EntityKind::Interface, "interface", source, ttl, now)?;
        inner.verify_node(route.0, source, ttl, now);
        self.commit(inner);
        Ok(())
    }

    pub fn set_in_interface(&self, rule: NodeId, interface: NodeId, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        self.set_named_interface(rule, interface, "inInterface", source, ttl)
    }

    pub fn set_out_interface(&self, rule: NodeId, interface: NodeId, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        self.set_named_interface(rule, interface, "outInterface", source, ttl)
    }

    fn set_named_interface(&self, rule: NodeId, interface: NodeId, name: &str, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        if inner.named_neighbor(rule.0, name) == Some(interface.0) {
            if let Some(edge) = inner.edge_between(rule.0, interface.0) {
                inner.verify_edge(edge, source, ttl, now);
            }
        } else {
            if let Some(current) = inner.named_neighbor(rule.0, name) {
                for edge in inner.edges_between(rule.0, current) {
                    inner.delete_edge(edge, Some(name), Some(rule.0));
                }
            }
            inner.add_edge(rule.0, interface.0, EdgeKind::Association, Some(name), Some((source, ttl)), Some(name), Some(rule.0), now, true)?;
        }
        inner.verify_node(rule.0, source, ttl, now);
        self.commit(inner);
        Ok(())
    }

    pub fn add_interface(&self, host: NodeId, interface: NodeId, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        self.add_child(host, interface, "interface", source, ttl)
    }

    pub fn add_address(&self, interface: NodeId, address: NodeId, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        self.add_child(interface, address, "address", source, ttl)
    }

    pub fn add_service(&self, address: NodeId, service: NodeId, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        self.add_child(address, service, "service", source, ttl)
    }

    pub fn add_route(&self, host: NodeId, route: NodeId, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        self.add_child(host, route, "route", source, ttl)
    }

    pub fn add_firewall_rule(&self, host: NodeId, rule: NodeId, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        self.add_child(host, rule, "firewallRule", source, ttl)
    }

    pub fn add_disk(&self, host: NodeId, disk: NodeId, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        self.add_child(host, disk, "disk", source, ttl)
    }

    /// Replace the host's raw firewall dump.
    pub fn set_firewall_raw(&self, host: NodeId, raw: NodeId, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let current = inner.children(host.0, Some(EntityKind::FirewallRaw));
        if current.contains(&raw.0) {
            for edge in inner.edges_between(host.0, raw.0) {
                inner.verify_edge(edge, source, ttl, now);
            }
        } else {
            for existing in current {
                for edge in inner.edges_between(host.0, existing) {
                    inner.delete_edge(edge, Some("firewallRaw"), Some(host.0));
                }
            }
            inner.add_edge(raw.0, host.0, EdgeKind::PartOf, None, Some((source, ttl)), Some("firewallRaw"), Some(host.0), now, true)?;
        }
        inner.verify_node(host.0, source, ttl, now);
        self.commit(inner);
        Ok(())
    }

    fn add_child(&self, container: NodeId, child: NodeId, association: &str, source: &str, ttl: Ttl) -> Result<(), GraphError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let edges = inner.edges_between(container.0, child.0);
        if edges.is_empty() {
            inner.add_edge(child.0, container.0, EdgeKind::PartOf, None, Some((source, ttl)), Some(association), Some(container.0), now, true)?;
        } else {
            for edge in edges {
                inner.verify_edge(edge, source, ttl, now);
            }
        }
        inner.verify_node(container.0, source, ttl, now);
        self.commit(inner);
        Ok(())
    }

    // ---- scalar setters ----

    pub fn set_cpus(&self, host: NodeId, cpus: u32, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(host.0);
        let mut changed = false;
        if let Some(Entity::Host(data)) = inner.entity_mut(host.0) {
            if data.cpus != Some(cpus) {
                data.cpus = Some(cpus);
                changed = true;
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::Host, object, "cpu", json!(cpus)));
        }
        inner.verify_node(host.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_memory(&self, host: NodeId, memory_min: u64, memory_max: u64, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(host.0);
        let mut events = Vec::new();
        if let Some(Entity::Host(data)) = inner.entity_mut(host.0) {
            if data.memory_min != Some(memory_min) {
                data.memory_min = Some(memory_min);
                events.push(set_event(EntityKind::Host, object.clone(), "memoryMin", json!(memory_min)));
            }
            if data.memory_max != Some(memory_max) {
                data.memory_max = Some(memory_max);
                events.push(set_event(EntityKind::Host, object, "memoryMax", json!(memory_max)));
            }
        }
        inner.pending.extend(events);
        inner.verify_node(host.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_power_state(&self, host: NodeId, state: PowerState, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(host.0);
        let mut changed = false;
        if let Some(Entity::Host(data)) = inner.entity_mut(host.0) {
            if data.power_state != Some(state) {
                data.power_state = Some(state);
                changed = true;
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::Host, object, "powerState", json!(state.to_string())));
        }
        inner.verify_node(host.0, source, ttl, now);
        self.commit(inner);
    }

    /// Configuration names group hosts and networks into named snapshots.
    pub fn set_config_names(&self, node: NodeId, configs: BTreeSet<String>, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(node.0);
        let object_type = inner.kind(node.0);
        let mut changed = false;
        match inner.entity_mut(node.0) {
            Some(Entity::Host(data)) if data.config_names != configs => {
                data.config_names = configs.clone();
                changed = true;
            }
            Some(Entity::L2Network(data)) if data.config_names != configs => {
                data.config_names = configs.clone();
                changed = true;
            }
            _ => {}
        }
        if changed {
            if let Some(object_type) = object_type {
                inner.pending.push(set_event(object_type, object, "configurations", json!(configs)));
            }
        }
        inner.verify_node(node.0, source, ttl, now);
        self.commit(inner);
    }

    /// Flipped when a rename lands on the live machine; no change event.
    pub fn set_name_applied(&self, host: NodeId, applied: bool) {
        let mut inner = self.inner.lock();
        if let Some(Entity::Host(data)) = inner.entity_mut(host.0) {
            data.name_applied = applied;
        }
    }

    pub fn set_rate(&self, interface: NodeId, rate: u32, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(interface.0);
        let mut changed = false;
        if let Some(Entity::Interface(data)) = inner.entity_mut(interface.0) {
            if data.rate != Some(rate) {
                data.rate = Some(rate);
                changed = true;
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::Interface, object, "rate", json!(rate)));
        }
        inner.verify_node(interface.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_mtu(&self, interface: NodeId, mtu: u32, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(interface.0);
        let mut changed = false;
        if let Some(Entity::Interface(data)) = inner.entity_mut(interface.0) {
            if data.mtu != Some(mtu) {
                data.mtu = Some(mtu);
                changed = true;
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::Interface, object, "mtu", json!(mtu)));
        }
        inner.verify_node(interface.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_gateway(&self, address: NodeId, gateway: Option<&str>, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(address.0);
        let mut changed = false;
        if let Some(Entity::L3Address(data)) = inner.entity_mut(address.0) {
            if data.gateway.as_deref() != gateway {
                data.gateway = gateway.map(SmolStr::from);
                changed = true;
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::Layer3Address, object, "gateway", json!(gateway)));
        }
        inner.verify_node(address.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_netmask(&self, address: NodeId, netmask: &str, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(address.0);
        let mut changed = false;
        if let Some(Entity::L3Address(data)) = inner.entity_mut(address.0) {
            if data.netmask.as_deref() != Some(netmask) {
                data.netmask = Some(netmask.into());
                changed = true;
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::Layer3Address, object, "netmask", json!(netmask)));
        }
        inner.verify_node(address.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_static(&self, address: NodeId, is_static: bool, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(address.0);
        let mut changed = false;
        if let Some(Entity::L3Address(data)) = inner.entity_mut(address.0) {
            if data.is_static != is_static {
                data.is_static = is_static;
                changed = true;
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::Layer3Address, object, "static", json!(is_static)));
        }
        inner.verify_node(address.0, source, ttl, now);
        self.commit(inner);
    }

    /// Product has no verification semantics of its own.
    pub fn set_product(&self, service: NodeId, product: &str) {
        let mut inner = self.inner.lock();
        let object = inner.global_id(service.0);
        let object_type = inner.kind(service.0);
        let mut changed = false;
        if let Some(Entity::Service(data)) = inner.entity_mut(service.0) {
            if data.product.as_deref() != Some(product) {
                data.product = Some(product.into());
                changed = true;
            }
        }
        if changed {
            if let Some(object_type) = object_type {
                inner.pending.push(set_event(object_type, object, "product", json!(product)));
            }
        }
        self.commit(inner);
    }

    pub fn set_version(&self, service: NodeId, version: &str, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(service.0);
        let object_type = inner.kind(service.0);
        let mut changed = false;
        if let Some(Entity::Service(data)) = inner.entity_mut(service.0) {
            if data.version.as_deref() != Some(version) {
                data.version = Some(version.into());
                changed = true;
            }
        }
        if changed {
            if let Some(object_type) = object_type {
                inner.pending.push(set_event(object_type, object, "version", json!(version)));
            }
        }
        inner.verify_node(service.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_domain(&self, service: NodeId, domain: &str, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(service.0);
        let mut changed = false;
        if let Some(Entity::Service(data)) = inner.entity_mut(service.0) {
            if let ServiceExtra::Dns { domain: current } = &mut data.extra {
                if current.as_deref() != Some(domain) {
                    *current = Some(domain.into());
                    changed = true;
                }
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::DnsService, object, "domain", json!(domain)));
        }
        inner.verify_node(service.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_lease(&self, service: NodeId, lease: u32, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(service.0);
        let mut changed = false;
        if let Some(Entity::Service(data)) = inner.entity_mut(service.0) {
            if let ServiceExtra::Dhcp { lease: current, .. } = &mut data.extra {
                if *current != Some(lease) {
                    *current = Some(lease);
                    changed = true;
                }
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::DhcpService, object, "lease", json!(lease)));
        }
        inner.verify_node(service.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_dhcp_range(&self, service: NodeId, start: &str, end: &str, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(service.0);
        let mut events = Vec::new();
        if let Some(Entity::Service(data)) = inner.entity_mut(service.0) {
            if let ServiceExtra::Dhcp { range_start, range_end, .. } = &mut data.extra {
                if range_start.as_deref() != Some(start) {
                    *range_start = Some(start.into());
                    events.push(set_event(EntityKind::DhcpService, object.clone(), "start", json!(start)));
                }
                if range_end.as_deref() != Some(end) {
                    *range_end = Some(end.into());
                    events.push(set_event(EntityKind::DhcpService, object, "end", json!(end)));
                }
            }
        }
        inner.pending.extend(events);
        inner.verify_node(service.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_announced_gateway(&self, service: NodeId, gateway: &str, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(service.0);
        let mut changed = false;
        if let Some(Entity::Service(data)) = inner.entity_mut(service.0) {
            if let ServiceExtra::Dhcp { announced_gateway, .. } = &mut data.extra {
                if announced_gateway.as_deref() != Some(gateway) {
                    *announced_gateway = Some(gateway.into());
                    changed = true;
                }
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::DhcpService, object, "announcedGateway", json!(gateway)));
        }
        inner.verify_node(service.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_raw_data(&self, raw: NodeId, data: &str, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(raw.0);
        let mut changed = false;
        if let Some(Entity::FirewallRaw(record)) = inner.entity_mut(raw.0) {
            if record.data != data {
                record.data = data.to_string();
                changed = true;
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::FirewallRaw, object, "data", json!(data)));
        }
        inner.verify_node(raw.0, source, ttl, now);
        self.commit(inner);
    }

    pub fn set_disk_size(&self, disk: NodeId, size: u64, source: &str, ttl: Ttl) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let object = inner.global_id(disk.0);
        let mut changed = false;
        if let Some(Entity::Disk(data)) = inner.entity_mut(disk.0) {
            if data.size != Some(size) {
                data.size = Some(size);
                changed = true;
            }
        }
        if changed {
            inner.pending.push(set_event(EntityKind::Disk, object, "size", json!(size)));
        }
        inner.verify_node(disk.0, source, ttl, now);
        self.commit(inner);
    }

    /// Populate registry-backed location fields. These come from static
    /// configuration, not from scans, so no change events are emitted.
    pub fn set_location_info(&self, location: NodeId, hypervisor: Option<&str>, default_template: Option<&str>) {
        let mut inner = self.inner.lock();
        if let Some(Entity::Location(data)) = inner.entity_mut(location.0) {
            if hypervisor.is_some() {
                data.hypervisor = hypervisor.map(SmolStr::from);
            }
            if default_template.is_some() {
                data.default_template = default_template.map(SmolStr::from);
            }
        }
    }
}

// ---- lock-held helpers ----

fn local_id(inner: &GraphInner, idx: NodeIndex) -> String {
    inner.entity(idx).map(Entity::local_id).unwrap_or_default()
}

fn find_kind(
    inner: &GraphInner,
    kind: EntityKind,
    predicate: impl Fn(&Entity) -> bool,
) -> Option<NodeIndex> {
    let root = inner.root;
    inner
        .neighbors(root, Some(kind))
        .into_iter()
        .find(|idx| inner.entity(*idx).map(&predicate).unwrap_or(false))
}

fn service_children(inner: &GraphInner, address: NodeIndex) -> Vec<NodeIndex> {
    inner
        .children(address, None)
        .into_iter()
        .filter(|idx| {
            matches!(
                inner.kind(*idx),
                Some(EntityKind::Service | EntityKind::DnsService | EntityKind::DhcpService)
            )
        })
        .collect()
}

/// Point an association of the given kind at `target`: verify the edge when
/// it already exists, otherwise drop the old edges and create a new one
/// attributed to `node`.
#[allow(clippy::too_many_arguments)]
fn set_association(
    inner: &mut GraphInner,
    node: NodeIndex,
    target: Option<NodeIndex>,
    kind: EntityKind,
    association: &str,
    source: &str,
    ttl: Ttl,
    now: Instant,
) -> Result<(), GraphError> {
    let Some(target) = target else {
        return Ok(());
    };
    let current = inner.neighbors(node, Some(kind));
    if current.contains(&target) {
        for edge in inner.edges_between(node, target) {
            inner.verify_edge(edge, source, ttl, now);
        }
        return Ok(());
    }
    for neighbor in current {
        for edge in inner.edges_between(node, neighbor) {
            inner.delete_edge(edge, Some(association), Some(node));
        }
    }
    inner.add_edge(node, target, EdgeKind::Association, None, Some((source, ttl)), Some(association), Some(node), now, true)?;
    Ok(())
}

/// Templates hang off their host as part-of children; replacing one swaps
/// the edge.
fn set_template(
    inner: &mut GraphInner,
    host: NodeIndex,
    template: Option<NodeIndex>,
    source: &str,
    ttl: Ttl,
    now: Instant,
) -> Result<(), GraphError> {
    let Some(template) = template else {
        return Ok(());
    };
    let current = inner.children(host, Some(EntityKind::Template));
    if current.contains(&template) {
        for edge in inner.edges_between(host, template) {
            inner.verify_edge(edge, source, ttl, now);
        }
        return Ok(());
    }
    for existing in current {
        for edge in inner.edges_between(host, existing) {
            inner.delete_edge(edge, Some("template"), Some(host));
        }
    }
    inner.add_edge(template, host, EdgeKind::PartOf, None, Some((source, ttl)), Some("template"), Some(host), now, true)?;
    Ok(())
}
