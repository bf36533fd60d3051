// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot of the subgraph belonging to one configuration.
//!
//! The copy is a fresh graph verified by a single permanent source, so the
//! snapshot neither expires nor shares structure with the live graph. Used
//! to capture "current state" at deployment start and by triggered
//! exporters.

use super::{Graph, GraphError, NodeId};
use crate::entity::Entity;
use crate::timer::Ttl;
use std::collections::HashMap;
use std::sync::Arc;

const COPY_SOURCE: &str = "copy";

impl Graph {
    /// Copy every host and layer-2 network tagged with `configuration` (all
    /// of them when `None`), plus everything reachable from them.
    pub fn copy(&self, configuration: Option<&str>) -> Result<Graph, GraphError> {
        let name = configuration.unwrap_or(self.name());
        let copy = Graph::new(name, Arc::clone(self.clock()));
        let ttl = Ttl::Forever;
        let mut mapped: HashMap<NodeId, NodeId> = HashMap::new();

        // Locations and their templates carry hypervisor and image metadata
        // the planner needs; they are cheap, take them all.
        for location in self.locations() {
            let Some(Entity::Location(data)) = self.entity(location) else { continue };
            let new_location = copy.get_or_create_location(&data.id, COPY_SOURCE, ttl)?;
            copy.set_location_info(
                new_location,
                data.hypervisor.as_deref(),
                data.default_template.as_deref(),
            );
            mapped.insert(location, new_location);
            for template in self.templates_of(location) {
                let Some(Entity::Template(template_data)) = self.entity(template) else { continue };
                let new_template = copy.get_or_create_template(
                    new_location,
                    &template_data.id,
                    template_data.metadata.clone(),
                    COPY_SOURCE,
                    ttl,
                )?;
                mapped.insert(template, new_template);
            }
        }

        for network in self.l2_networks() {
            let Some(Entity::L2Network(data)) = self.entity(network) else { continue };
            let selected = configuration
                .map(|name| data.config_names.contains(name))
                .unwrap_or(true);
            if !selected {
                continue;
            }
            let location = self.location_of(network).and_then(|l| mapped.get(&l).copied());
            let new_network = copy.get_or_create_l2network(&data.id, COPY_SOURCE, ttl, location)?;
            copy.set_config_names(new_network, data.config_names.clone(), COPY_SOURCE, ttl);
            mapped.insert(network, new_network);
        }

        for host in self.hosts() {
            let Some(Entity::Host(data)) = self.entity(host) else { continue };
            let selected = configuration
                .map(|name| data.config_names.contains(name))
                .unwrap_or(true);
            if !selected {
                continue;
            }
            self.copy_host(&copy, host, &mut mapped)?;
        }

        Ok(copy)
    }

    fn copy_host(
        &self,
        copy: &Graph,
        host: NodeId,
        mapped: &mut HashMap<NodeId, NodeId>,
    ) -> Result<(), GraphError> {
        let Some(Entity::Host(data)) = self.entity(host) else {
            return Ok(());
        };
        let ttl = Ttl::Forever;
        let location = self.location_of(host).and_then(|l| mapped.get(&l).copied());
        let template = self
            .template_of_host(host)
            .and_then(|t| mapped.get(&t).copied());
        let new_host = copy.get_or_create_host(&data.id, COPY_SOURCE, ttl, location, template)?;
        if let Some(cpus) = data.cpus {
            copy.set_cpus(new_host, cpus, COPY_SOURCE, ttl);
        }
        if let (Some(min), Some(max)) = (data.memory_min, data.memory_max) {
            copy.set_memory(new_host, min, max, COPY_SOURCE, ttl);
        }
        if let Some(state) = data.power_state {
            copy.set_power_state(new_host, state, COPY_SOURCE, ttl);
        }
        copy.set_config_names(new_host, data.config_names.clone(), COPY_SOURCE, ttl);
        copy.set_name_applied(new_host, data.name_applied);
        mapped.insert(host, new_host);

        for interface in self.interfaces_of(host) {
            self.copy_interface(copy, new_host, interface, mapped)?;
        }

        for route in self.routes_of(host) {
            let Some(Entity::Route(route_data)) = self.entity(route) else { continue };
            let interface = self
                .interface_of_route(route)
                .and_then(|i| mapped.get(&i).copied());
            let new_route = copy.get_or_create_route(
                new_host,
                COPY_SOURCE,
                ttl,
                &route_data.destination,
                &route_data.genmask,
                &route_data.gateway,
                interface,
            )?;
            copy.add_route(new_host, new_route, COPY_SOURCE, ttl)?;
        }

        for rule in self.firewall_rules_of(host) {
            let Some(Entity::FirewallRule(rule_data)) = self.entity(rule) else { continue };
            let in_interface = self
                .in_interface_of_rule(rule)
                .and_then(|i| mapped.get(&i).copied());
            let out_interface = self
                .out_interface_of_rule(rule)
                .and_then(|i| mapped.get(&i).copied());
            let new_rule = copy.get_or_create_firewall_rule(
                new_host,
                COPY_SOURCE,
                ttl,
                rule_data,
                in_interface,
                out_interface,
            )?;
            copy.add_firewall_rule(new_host, new_rule, COPY_SOURCE, ttl)?;
        }

        if let Some(raw) = self.firewall_raw_of(host) {
            if let Some(Entity::FirewallRaw(raw_data)) = self.entity(raw) {
                let new_raw = copy.get_or_create_firewall_raw(
                    new_host,
                    COPY_SOURCE,
                    ttl,
                    &raw_data.firewall,
                    "",
                )?;
                copy.set_raw_data(new_raw, &raw_data.data, COPY_SOURCE, ttl);
                copy.set_firewall_raw(new_host, new_raw, COPY_SOURCE, ttl)?;
            }
        }

        for disk in self.disks_of(host) {
            let Some(Entity::Disk(disk_data)) = self.entity(disk) else { continue };
            let new_disk =
                copy.get_or_create_disk(new_host, &disk_data.id, COPY_SOURCE, ttl, disk_data.size)?;
            copy.add_disk(new_host, new_disk, COPY_SOURCE, ttl)?;
        }

        Ok(())
    }

    fn copy_interface(
        &self,
        copy: &Graph,
        new_host: NodeId,
        interface: NodeId,
        mapped: &mut HashMap<NodeId, NodeId>,
    ) -> Result<(), GraphError> {
        let Some(Entity::Interface(data)) = self.entity(interface) else {
            return Ok(());
        };
        let ttl = Ttl::Forever;
        let network = self
            .network_of_interface(interface)
            .and_then(|n| mapped.get(&n).copied());
        let new_interface = copy.get_or_create_interface(&data.mac, COPY_SOURCE, ttl, network)?;
        if let Some(rate) = data.rate {
            copy.set_rate(new_interface, rate, COPY_SOURCE, ttl);
        }
        if let Some(mtu) = data.mtu {
            copy.set_mtu(new_interface, mtu, COPY_SOURCE, ttl);
        }
        copy.add_interface(new_host, new_interface, COPY_SOURCE, ttl)?;
        mapped.insert(interface, new_interface);

        for address in self.addresses_of(interface) {
            let Some(Entity::L3Address(address_data)) = self.entity(address) else { continue };
            let new_address = copy.get_or_create_l3address(
                &address_data.address,
                COPY_SOURCE,
                ttl,
                address_data.netmask.as_deref(),
                address_data.gateway.as_deref(),
            )?;
            copy.set_static(new_address, address_data.is_static, COPY_SOURCE, ttl);
            copy.add_address(new_interface, new_address, COPY_SOURCE, ttl)?;
            mapped.insert(address, new_address);

            if let Some(l3net) = self.network_of_address(address) {
                let new_l3net = match mapped.get(&l3net).copied() {
                    Some(existing) => existing,
                    None => {
                        let Some(Entity::L3Network(net_data)) = self.entity(l3net) else { continue };
                        let created = copy.get_or_create_l3network(
                            &net_data.id,
                            COPY_SOURCE,
                            ttl,
                            &net_data.address,
                            &net_data.netmask,
                        )?;
                        mapped.insert(l3net, created);
                        created
                    }
                };
                copy.set_address_network(new_address, Some(new_l3net), COPY_SOURCE, ttl)?;
            }

            for service in self.services_of(address) {
                self.copy_service(copy, new_address, service)?;
            }
        }
        Ok(())
    }

    fn copy_service(
        &self,
        copy: &Graph,
        new_address: NodeId,
        service: NodeId,
    ) -> Result<(), GraphError> {
        let Some(Entity::Service(data)) = self.entity(service) else {
            return Ok(());
        };
        let ttl = Ttl::Forever;
        use crate::entity::ServiceExtra;
        let new_service = match &data.extra {
            ServiceExtra::Generic => copy.get_or_create_service(
                new_address,
                data.port,
                &data.protocol,
                &data.kind,
                COPY_SOURCE,
                ttl,
            )?,
            ServiceExtra::Dns { domain } => {
                let node = copy.get_or_create_dns_service(new_address, COPY_SOURCE, ttl)?;
                if let Some(domain) = domain {
                    copy.set_domain(node, domain, COPY_SOURCE, ttl);
                }
                node
            }
            ServiceExtra::Dhcp { lease, range_start, range_end, announced_gateway } => {
                let node = copy.get_or_create_dhcp_service(new_address, COPY_SOURCE, ttl)?;
                if let Some(lease) = lease {
                    copy.set_lease(node, *lease, COPY_SOURCE, ttl);
                }
                if let (Some(start), Some(end)) = (range_start, range_end) {
                    copy.set_dhcp_range(node, start, end, COPY_SOURCE, ttl);
                }
                if let Some(gateway) = announced_gateway {
                    copy.set_announced_gateway(node, gateway, COPY_SOURCE, ttl);
                }
                node
            }
        };
        if let Some(product) = &data.product {
            copy.set_product(new_service, product);
        }
        if let Some(version) = &data.version {
            copy.set_version(new_service, version, COPY_SOURCE, ttl);
        }
        Ok(())
    }
}
