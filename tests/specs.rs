// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level specs: the full observe -> diff -> plan -> build cycle
//! wired through the public crate APIs.

use std::collections::BTreeSet;
use std::io::Write as _;
use std::sync::Arc;
use trellis_adapters::fake::{recording_builder, BuildLog};
use trellis_adapters::CollectorRegistry;
use trellis_config::{BuilderOverrides, LocationsRegistry};
use trellis_core::{FakeClock, Ttl};
use trellis_engine::{builder_entry, Dispatcher, Environment, ExporterRegistry};

const GOAL_XML: &str = r#"<?xml version="1.0"?>
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
    <host id="h1" location="siteA" template="ubuntu" cpus="4" powerState="Running">
      <interfaces>
        <interface mac="aa:bb:cc:dd:ee:ff" network="net1" mtu="1500">
          <layer3address address="10.0.0.5" network="lan" static="True">
            <services/>
          </layer3address>
        </interface>
      </interfaces>
    </host>
  </hosts>
</config>
"#;

fn locations() -> Arc<LocationsRegistry> {
    let mut file = tempfile::NamedTempFile::new().expect("temp registry");
    file.write_all(
        br#"
[sitea]
hypervisor = "xen"
default_template = "ubuntu"

[sitea.templates.ubuntu]
metadata = ["ubuntu"]
"#,
    )
    .expect("write registry");
    Arc::new(LocationsRegistry::load(file.path()).expect("parse registry"))
}

fn planner_script(dir: &std::path::Path) -> std::path::PathBuf {
    let script = dir.join("planner.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\nprintf '(configureCpus h1)\\n; cost = 1 (unit cost)\\n' > \"$2\"\n",
    )
    .expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
    }
    script
}

fn environment(dir: &std::path::Path, log: &BuildLog, clock: FakeClock) -> Environment {
    let script = planner_script(dir);
    let domain = dir.join("domain.pddl");
    std::fs::write(&domain, "(define (domain testbed))\n").expect("write domain");
    let config = format!(
        r#"
data_directory = "data"
continuous_exporters = ["json_log"]

[modules.goal]
type = "xml"
interval = -1
config = {{ file = "{}" }}

[planner]
binary = "{}"
domain = "{}"
"#,
        dir.join("data").join("goal.xml").display(),
        script.display(),
        domain.display()
    );
    std::fs::write(dir.join("environment.toml"), config).expect("write config");

    let mut dispatcher = Dispatcher::new(BuilderOverrides::default());
    dispatcher.register(builder_entry(
        "xen_cpus",
        "configureCpus",
        Some("xen"),
        &["ubuntu"],
        None,
        recording_builder("xen_cpus", Arc::clone(log), false),
    ));

    Environment::new(
        "lab",
        dir,
        locations(),
        CollectorRegistry::builtin(),
        ExporterRegistry::builtin(),
        dispatcher,
        Arc::new(clock),
    )
    .expect("environment starts")
}

/// Populate the current state: h1 exists with two CPUs in configuration
/// "demo", matching the goal in everything else.
fn seed_current_state(env: &Environment) {
    let graph = env.graph();
    let ttl = Ttl::secs(3600);
    let location = graph.get_or_create_location("siteA", "scan", ttl).expect("location");
    graph.set_location_info(location, Some("xen"), Some("ubuntu"));
    let template = graph
        .get_or_create_template(location, "ubuntu", BTreeSet::from(["ubuntu".into()]), "scan", ttl)
        .expect("template");
    let net = graph.get_or_create_l2network("net1", "scan", ttl, Some(location)).expect("network");
    graph.set_config_names(net, BTreeSet::from(["demo".to_string()]), "scan", ttl);
    let host = graph
        .get_or_create_host("h1", "scan", ttl, Some(location), Some(template))
        .expect("host");
    graph.set_cpus(host, 2, "scan", ttl);
    graph.set_power_state(host, trellis_core::PowerState::Running, "scan", ttl);
    graph.set_config_names(host, BTreeSet::from(["demo".to_string()]), "scan", ttl);

    let interface = graph
        .get_or_create_interface("aa:bb:cc:dd:ee:ff", "scan", ttl, Some(net))
        .expect("interface");
    graph.set_mtu(interface, 1500, "scan", ttl);
    graph.add_interface(host, interface, "scan", ttl).expect("attach interface");
    let l3net = graph
        .get_or_create_l3network("lan", "scan", ttl, "10.0.0.0", "255.255.255.0")
        .expect("l3 network");
    let address = graph
        .get_or_create_l3address("10.0.0.5", "scan", ttl, Some("255.255.255.0"), None)
        .expect("address");
    graph.set_static(address, true, "scan", ttl);
    graph.set_address_network(address, Some(l3net), "scan", ttl).expect("address network");
    graph.add_address(interface, address, "scan", ttl).expect("attach address");
}

#[tokio::test]
async fn deployment_reconciles_the_cpu_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log: BuildLog = Default::default();
    let clock = FakeClock::new();
    let env = environment(dir.path(), &log, clock.clone());
    seed_current_state(&env);

    env.upload_configuration("goal.xml", GOAL_XML).expect("upload");
    let reply = env.apply_config("goal.xml").await.expect("apply");
    assert!(reply.contains("The deployment started"));

    env.wait_for_setup().await;

    let calls = log.lock().clone();
    assert_eq!(calls, vec![("xen_cpus".to_string(), "h1".to_string())]);
    assert!(env.setup_progress().starts_with("Finished setup started at"));

    // The freeze is unwound: verifier expiry works again.
    assert!(!env.is_frozen());
    clock.advance(std::time::Duration::from_secs(8000));
    env.tick();
    assert!(env.graph().hosts().is_empty(), "stale state expires after melt");
}

#[tokio::test]
async fn goal_collector_feeds_graph_and_exporter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log: BuildLog = Default::default();
    let clock = FakeClock::new();
    let env = environment(dir.path(), &log, clock.clone());

    env.upload_configuration("goal.xml", GOAL_XML).expect("upload");
    env.bootstrap();
    env.tick();
    env.join_workers().await;

    // The XML collector loaded the goal into the graph.
    let graph = env.graph();
    let host = graph.find_host("h1").expect("host collected");
    assert_eq!(graph.interfaces_of(host).len(), 1);

    // The continuous exporter flushed the change stream.
    clock.advance(std::time::Duration::from_secs(2));
    env.tick();
    let change_log = std::fs::read_to_string(env.data_dir().join("jsonChangeLog.txt"))
        .expect("change log written");
    assert!(change_log.contains("\"objectType\":\"Host\""));
    assert!(change_log.lines().all(|line| serde_json::from_str::<serde_json::Value>(line).is_ok()));

    env.shutdown().await;
}
