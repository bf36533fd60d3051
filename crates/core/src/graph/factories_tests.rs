// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use crate::entity::{Entity, EntityKind, FirewallRuleData, PowerState};
use crate::event::{ChangeKind, GraphEvent};
use crate::timer::Ttl;
use std::sync::Arc;

fn graph() -> Graph {
    Graph::new("env", Arc::new(FakeClock::new()))
}

fn changes(log: &parking_lot::Mutex<Vec<GraphEvent>>) -> Vec<GraphEvent> {
    log.lock().clone()
}

fn record_changed(graph: &Graph) -> Arc<parking_lot::Mutex<Vec<GraphEvent>>> {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    graph.on_changed().add(move |event: &GraphEvent| sink.lock().push(event.clone()));
    log
}

#[test]
fn factories_deduplicate_by_key() {
    let graph = graph();
    let ttl = Ttl::secs(60);

    let first = graph.get_or_create_host("h1", "srcA", ttl, None, None).unwrap();
    let second = graph.get_or_create_host("h1", "srcB", ttl, None, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(graph.hosts().len(), 1);

    let iface_a = graph.get_or_create_interface("aa:bb:cc:dd:ee:ff", "src", ttl, None).unwrap();
    let iface_b = graph.get_or_create_interface("aa:bb:cc:dd:ee:ff", "src", ttl, None).unwrap();
    assert_eq!(iface_a, iface_b);
}

#[test]
fn locations_are_case_insensitive() {
    let graph = graph();
    let ttl = Ttl::secs(60);

    let lower = graph.get_or_create_location("siteA", "src", ttl).unwrap();
    let upper = graph.get_or_create_location("SITEA", "src", ttl).unwrap();
    assert_eq!(lower, upper);
    assert_eq!(graph.global_id(lower), "sitea");
}

#[test]
fn on_new_fires_before_any_change_for_the_node() {
    let graph = graph();
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for bus in [graph.on_new(), graph.on_changed()] {
        let sink = Arc::clone(&log);
        bus.add(move |event: &GraphEvent| sink.lock().push(event.clone()));
    }

    let location = graph.get_or_create_location("locA", "src", Ttl::secs(60)).unwrap();
    let host = graph
        .get_or_create_host("h1", "src", Ttl::secs(60), Some(location), None)
        .unwrap();
    graph.set_cpus(host, 4, "src", Ttl::secs(60));

    let events = log.lock();
    let new_at = events
        .iter()
        .position(|event| matches!(event, GraphEvent::New { object_type: EntityKind::Host, .. }))
        .expect("host New event");
    let change_at = events
        .iter()
        .position(|event| matches!(
            event,
            GraphEvent::Changed { object_type: EntityKind::Host, .. }
        ))
        .expect("host Changed event");
    assert!(new_at < change_at);

    // The New event carries the initial values.
    if let GraphEvent::New { values, .. } = &events[new_at] {
        assert_eq!(values["id"], "h1");
        assert_eq!(values["location"], "loca");
    }
}

#[test]
fn setter_with_same_value_is_silent() {
    let graph = graph();
    let host = graph.get_or_create_host("h1", "src", Ttl::secs(60), None, None).unwrap();
    graph.set_cpus(host, 2, "src", Ttl::secs(60));

    let log = record_changed(&graph);
    graph.set_cpus(host, 2, "src", Ttl::secs(60));
    assert!(changes(&log).is_empty());

    graph.set_cpus(host, 4, "src", Ttl::secs(60));
    let events = changes(&log);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        GraphEvent::Changed { member: Some(member), value, .. }
            if member == "cpu" && *value == serde_json::json!(4)
    ));
}

#[test]
fn moving_an_interface_replaces_the_network_edge() {
    let graph = graph();
    let ttl = Ttl::secs(60);
    let net1 = graph.get_or_create_l2network("net1", "src", ttl, None).unwrap();
    let net2 = graph.get_or_create_l2network("net2", "src", ttl, None).unwrap();
    let interface = graph
        .get_or_create_interface("aa:bb:cc:dd:ee:ff", "src", ttl, Some(net1))
        .unwrap();

    let log = record_changed(&graph);
    graph.set_network(interface, Some(net2), "src", ttl).unwrap();

    assert_eq!(graph.network_of_interface(interface), Some(net2));
    let events = changes(&log);
    let adds: Vec<_> = events
        .iter()
        .filter(|event| matches!(
            event,
            GraphEvent::Changed { change: ChangeKind::Add, member: Some(member), value, .. }
                if member == "network" && *value == serde_json::json!("net2")
        ))
        .collect();
    assert_eq!(adds.len(), 1, "exactly one add event for the new network");
    assert!(events.iter().any(|event| matches!(
        event,
        GraphEvent::Changed { change: ChangeKind::Delete, member: Some(member), value, .. }
            if member == "network" && *value == serde_json::json!("net1")
    )));
}

#[test]
fn setting_the_same_network_only_reverifies() {
    let graph = graph();
    let ttl = Ttl::secs(60);
    let net1 = graph.get_or_create_l2network("net1", "src", ttl, None).unwrap();
    let interface = graph
        .get_or_create_interface("aa:bb:cc:dd:ee:ff", "src", ttl, Some(net1))
        .unwrap();

    let log = record_changed(&graph);
    graph.set_network(interface, Some(net1), "other", ttl).unwrap();

    assert!(changes(&log).is_empty());
    let sources = graph.edge_sources_between(interface, net1);
    assert!(sources.contains(&smol_str::SmolStr::from("other")));
}

#[test]
fn power_state_and_memory_emit_named_members() {
    let graph = graph();
    let host = graph.get_or_create_host("h1", "src", Ttl::secs(60), None, None).unwrap();
    let log = record_changed(&graph);

    graph.set_power_state(host, PowerState::Running, "src", Ttl::secs(60));
    graph.set_memory(host, 512, 2048, "src", Ttl::secs(60));

    let members: Vec<String> = changes(&log)
        .iter()
        .filter_map(|event| match event {
            GraphEvent::Changed { member: Some(member), .. } => Some(member.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(members, vec!["powerState", "memoryMin", "memoryMax"]);
}

#[test]
fn services_key_on_address_port_protocol() {
    let graph = graph();
    let ttl = Ttl::secs(60);
    let address = graph.get_or_create_l3address("10.0.0.1", "src", ttl, None, None).unwrap();

    let ssh = graph.get_or_create_service(address, 22, "tcp", "ssh", "src", ttl).unwrap();
    let again = graph.get_or_create_service(address, 22, "tcp", "ssh", "src", ttl).unwrap();
    assert_eq!(ssh, again);

    let dns = graph.get_or_create_dns_service(address, "src", ttl).unwrap();
    let dns_again = graph.get_or_create_dns_service(address, "src", ttl).unwrap();
    assert_eq!(dns, dns_again);
    assert_eq!(graph.services_of(address).len(), 2);
}

#[test]
fn service_global_id_includes_address_and_port() {
    let graph = graph();
    let ttl = Ttl::secs(60);
    let host = graph.get_or_create_host("h1", "src", ttl, None, None).unwrap();
    let interface = graph
        .get_or_create_interface("aa:bb:cc:dd:ee:ff", "src", ttl, None)
        .unwrap();
    graph.add_interface(host, interface, "src", ttl).unwrap();
    let address = graph.get_or_create_l3address("10.0.0.1", "src", ttl, None, None).unwrap();
    graph.add_address(interface, address, "src", ttl).unwrap();
    let service = graph.get_or_create_service(address, 22, "tcp", "ssh", "src", ttl).unwrap();

    assert_eq!(graph.global_id(address), "enxaabbccddeeff_10.0.0.1");
    assert_eq!(graph.global_id(service), "enxaabbccddeeff_10.0.0.1:22_tcp_ssh");
}

#[test]
fn route_and_rule_global_ids_carry_the_host() {
    let graph = graph();
    let ttl = Ttl::secs(60);
    let host = graph.get_or_create_host("h1", "src", ttl, None, None).unwrap();

    let route = graph
        .get_or_create_route(host, "src", ttl, "10.0.0.0", "255.255.255.0", "10.0.0.1", None)
        .unwrap();
    graph.add_route(host, route, "src", ttl).unwrap();
    assert!(graph.global_id(route).starts_with("h1_"));

    let rule = graph
        .get_or_create_firewall_rule(
            host,
            "src",
            ttl,
            FirewallRuleData { chain: "INPUT".into(), action: "ACCEPT".into(), ..Default::default() },
            None,
            None,
        )
        .unwrap();
    graph.add_firewall_rule(host, rule, "src", ttl).unwrap();
    assert!(graph.global_id(rule).starts_with("h1_"));
}

#[test]
fn firewall_rules_deduplicate_on_all_fields() {
    let graph = graph();
    let ttl = Ttl::secs(60);
    let host = graph.get_or_create_host("h1", "src", ttl, None, None).unwrap();
    let rule = FirewallRuleData {
        chain: "INPUT".into(),
        action: "ACCEPT".into(),
        protocol: Some("tcp".into()),
        destports: Some("22".into()),
        ..Default::default()
    };

    let first = graph.get_or_create_firewall_rule(host, "src", ttl, rule.clone(), None, None).unwrap();
    graph.add_firewall_rule(host, first, "src", ttl).unwrap();
    let second = graph.get_or_create_firewall_rule(host, "src", ttl, rule.clone(), None, None).unwrap();
    assert_eq!(first, second);

    let different = FirewallRuleData { action: "DROP".into(), ..rule };
    let third = graph.get_or_create_firewall_rule(host, "src", ttl, different, None, None).unwrap();
    assert_ne!(first, third);
}

#[test]
fn at_most_one_raw_dump_per_firewall_kind() {
    let graph = graph();
    let ttl = Ttl::secs(60);
    let host = graph.get_or_create_host("h1", "src", ttl, None, None).unwrap();

    let raw = graph
        .get_or_create_firewall_raw(host, "src", ttl, "iptables", "header\n -A INPUT -j ACCEPT")
        .unwrap();
    graph.set_firewall_raw(host, raw, "src", ttl).unwrap();
    let again = graph
        .get_or_create_firewall_raw(host, "src", ttl, "iptables", "ignored")
        .unwrap();
    assert_eq!(raw, again);

    match graph.entity(raw) {
        Some(Entity::FirewallRaw(data)) => assert_eq!(data.data, "-A INPUT -j ACCEPT"),
        other => panic!("unexpected entity: {other:?}"),
    }
}

#[test]
fn template_falls_back_to_location_default() {
    let graph = graph();
    let ttl = Ttl::secs(60);
    let location = graph.get_or_create_location("locA", "src", ttl).unwrap();
    let template = graph
        .get_or_create_template(location, "host_base", Default::default(), "src", ttl)
        .unwrap();
    graph.set_location_info(location, Some("xen"), Some("host_base"));

    let host = graph
        .get_or_create_host("h1", "src", ttl, Some(location), None)
        .unwrap();
    assert_eq!(graph.template_of_host(host), Some(template));
    assert_eq!(graph.global_id(template), "loca_host_base");
}

#[test]
fn deprecated_endpoints_are_rejected() {
    let graph = graph();
    let ttl = Ttl::secs(60);
    let host = graph.get_or_create_host("h1", "src", ttl, None, None).unwrap();
    let interface = graph
        .get_or_create_interface("aa:bb:cc:dd:ee:ff", "src", ttl, None)
        .unwrap();
    graph.delete(interface);

    let result = graph.add_interface(host, interface, "src", ttl);
    assert!(result.is_err());
}
