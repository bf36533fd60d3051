// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ScanContext;
use std::io::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trellis_core::{Entity, FakeClock, Graph, ServiceExtra};

const GOAL: &str = r#"<?xml version="1.0"?>
<config name="demo">
  <locations>
    <location id="siteA"/>
  </locations>
  <layer2networks>
    <layer2network id="net1" location="siteA"/>
  </layer2networks>
  <layer3networks>
    <layer3network id="lan" address="10.0.0.0" netmask="255.255.255.0"/>
  </layer3networks>
  <hosts>
    <host id="h1" location="siteA" template="host_base" cpus="2" memoryMin="512" memoryMax="2048" powerState="Running">
      <interfaces>
        <interface mac="aa:bb:cc:dd:ee:ff" network="net1" rate="10000" mtu="1500">
          <layer3address address="10.0.0.5" network="lan" gateway="10.0.0.1" static="True">
            <services>
              <service port="22" protocol="tcp" type="ssh" product="openssh" version="9.6"/>
              <dns domain="example.org"/>
              <dhcp lease="3600" from="10.0.0.100" to="10.0.0.200" announcedGateway="10.0.0.1"/>
            </services>
          </layer3address>
        </interface>
      </interfaces>
      <routes>
        <route destination="0.0.0.0" genmask="0.0.0.0" gateway="10.0.0.1" interface="enxaabbccddeeff"/>
      </routes>
      <disks>
        <disk id="h1-hdd" size="20480"/>
      </disks>
      <firewall>
        <firewallRules>
          <rule chain="INPUT" action="ACCEPT" protocol="tcp" destports="22" inInterface="aa:bb:cc:dd:ee:ff"/>
          <raw firewall="iptables">header
 -A INPUT -j DROP</raw>
        </firewallRules>
      </firewall>
    </host>
  </hosts>
</config>
"#;

fn registry() -> trellis_config::LocationsRegistry {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[sitea]
hypervisor = "xen"
default_template = "host_base"

[sitea.templates.host_base]
metadata = ["ubuntu"]
"#,
    )
    .unwrap();
    trellis_config::LocationsRegistry::load(file.path()).unwrap()
}

fn fresh_graph() -> Graph {
    Graph::new("demo", Arc::new(FakeClock::new()))
}

#[test]
fn config_name_comes_from_the_root() {
    assert_eq!(config_name(GOAL).unwrap(), "demo");
    assert!(config_name("<topology/>").is_err());
}

#[test]
fn goal_document_populates_the_graph() {
    let graph = fresh_graph();
    load_goal(&graph, GOAL, "xml", &registry()).unwrap();

    let host = graph.find_host("h1").expect("host loaded");
    match graph.entity(host) {
        Some(Entity::Host(data)) => {
            assert_eq!(data.cpus, Some(2));
            assert_eq!((data.memory_min, data.memory_max), (Some(512), Some(2048)));
        }
        other => panic!("unexpected entity: {other:?}"),
    }

    let location = graph.location_of(host).expect("location association");
    match graph.entity(location) {
        Some(Entity::Location(data)) => {
            assert_eq!(data.id, "sitea");
            assert_eq!(data.hypervisor.as_deref(), Some("xen"));
        }
        other => panic!("unexpected entity: {other:?}"),
    }
    let template = graph.template_of_host(host).expect("template from registry");
    assert_eq!(graph.global_id(template), "sitea_host_base");

    let interfaces = graph.interfaces_of(host);
    assert_eq!(interfaces.len(), 1);
    let addresses = graph.addresses_of(interfaces[0]);
    assert_eq!(addresses.len(), 1);
    assert_eq!(graph.services_of(addresses[0]).len(), 3);
    assert_eq!(graph.routes_of(host).len(), 1);
    assert_eq!(graph.disks_of(host).len(), 1);
    assert_eq!(graph.firewall_rules_of(host).len(), 1);

    let rule = graph.firewall_rules_of(host)[0];
    assert_eq!(graph.in_interface_of_rule(rule), Some(interfaces[0]));

    let raw = graph.firewall_raw_of(host).expect("raw dump");
    match graph.entity(raw) {
        Some(Entity::FirewallRaw(data)) => assert_eq!(data.data, "-A INPUT -j DROP"),
        other => panic!("unexpected entity: {other:?}"),
    }
}

#[test]
fn dhcp_and_dns_attributes_are_applied() {
    let graph = fresh_graph();
    load_goal(&graph, GOAL, "xml", &registry()).unwrap();

    let host = graph.find_host("h1").unwrap();
    let address = graph.addresses_of(graph.interfaces_of(host)[0])[0];
    let mut saw_dns = false;
    let mut saw_dhcp = false;
    for service in graph.services_of(address) {
        match graph.entity(service) {
            Some(Entity::Service(data)) => match data.extra {
                ServiceExtra::Dns { ref domain } => {
                    saw_dns = true;
                    assert_eq!(domain.as_deref(), Some("example.org"));
                }
                ServiceExtra::Dhcp { lease, ref range_start, ref range_end, ref announced_gateway } => {
                    saw_dhcp = true;
                    assert_eq!(lease, Some(3600));
                    assert_eq!(range_start.as_deref(), Some("10.0.0.100"));
                    assert_eq!(range_end.as_deref(), Some("10.0.0.200"));
                    assert_eq!(announced_gateway.as_deref(), Some("10.0.0.1"));
                }
                ServiceExtra::Generic => {
                    assert_eq!(data.product.as_deref(), Some("openssh"));
                }
            },
            other => panic!("unexpected entity: {other:?}"),
        }
    }
    assert!(saw_dns && saw_dhcp);
}

#[test]
fn reloading_an_edited_goal_withdraws_missing_elements() {
    let graph = Arc::new(fresh_graph());
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(GOAL.as_bytes()).unwrap();

    let ctx = ScanContext {
        graph: Arc::clone(&graph),
        name: "goal".to_string(),
        ttl: trellis_core::Ttl::Forever,
        config: toml::Table::from_iter([(
            "file".to_string(),
            toml::Value::String(file.path().display().to_string()),
        )]),
        locations: Arc::new(registry()),
        stop: CancellationToken::new(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(XmlCollector.scan(ctx.clone())).unwrap();
    assert_eq!(graph.hosts().len(), 1);

    // Rewrite the goal without the host; the next scan withdraws it.
    const WITHOUT_HOST: &str = r#"<?xml version="1.0"?>
<config name="demo">
  <locations>
    <location id="siteA"/>
  </locations>
  <layer2networks>
    <layer2network id="net1" location="siteA"/>
  </layer2networks>
  <layer3networks>
    <layer3network id="lan" address="10.0.0.0" netmask="255.255.255.0"/>
  </layer3networks>
  <hosts/>
</config>
"#;
    std::fs::write(file.path(), WITHOUT_HOST).unwrap();
    runtime.block_on(XmlCollector.scan(ctx)).unwrap();

    assert!(graph.hosts().is_empty(), "host lost its only verifier");
    assert_eq!(graph.l2_networks().len(), 1, "network is still in the file");
}

#[test]
fn topology_roundtrips_through_the_writer() {
    let graph = fresh_graph();
    load_goal(&graph, GOAL, "xml", &registry()).unwrap();

    let rendered = write_topology(&graph).unwrap();
    assert!(rendered.contains("<config name=\"demo\">"));
    assert!(rendered.contains("mac=\"aa:bb:cc:dd:ee:ff\""));
    assert!(rendered.contains("destports=\"22\""));

    // The rendered document parses back into an equivalent graph.
    let reparsed = fresh_graph();
    load_goal(&reparsed, &rendered, "xml", &registry()).unwrap();
    assert_eq!(reparsed.hosts().len(), 1);
    let host = reparsed.find_host("h1").unwrap();
    assert_eq!(reparsed.interfaces_of(host).len(), 1);
}
