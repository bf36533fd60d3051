// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ExporterRegistry;
use parking_lot::Mutex as PlMutex;
use std::time::Duration;
use trellis_adapters::fake::FakeCollector;
use trellis_adapters::CollectorRegistry;
use trellis_config::BuilderOverrides;
use trellis_core::FakeClock;

const THREE_MODULES: &str = r#"
data_directory = "data"

[modules.alpha]
type = "fake"
interval = 30

[modules.beta]
type = "fake"
interval = 60

[modules.gamma]
type = "fake"
interval = 90
"#;

struct Fixture {
    env: Environment,
    clock: FakeClock,
    scans: Arc<PlMutex<Vec<String>>>,
    _dir: tempfile::TempDir,
}

fn fixture(config: &str) -> Fixture {
    fixture_with(config, |_| Ok(()))
}

fn fixture_with(
    config: &str,
    behavior: impl Fn(&ScanContext) -> Result<(), trellis_adapters::CollectorError>
        + Send
        + Sync
        + Clone
        + 'static,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("environment.toml"), config).unwrap();

    let scans: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));
    let mut collectors = CollectorRegistry::empty();
    {
        let scans = Arc::clone(&scans);
        collectors.register("fake", move || {
            let scans = Arc::clone(&scans);
            let behavior = behavior.clone();
            Arc::new(FakeCollector::with_scan(move |ctx| {
                scans.lock().push(ctx.name.clone());
                behavior(ctx)
            }))
        });
    }

    let clock = FakeClock::new();
    let env = Environment::new(
        "lab",
        dir.path(),
        Arc::new(trellis_config::LocationsRegistry::default()),
        collectors,
        ExporterRegistry::builtin(),
        Dispatcher::new(BuilderOverrides::default()),
        Arc::new(clock.clone()),
    )
    .unwrap();

    Fixture { env, clock, scans, _dir: dir }
}

#[tokio::test]
async fn run_once_modules_dispatch_immediately() {
    let fixture = fixture("data_directory = \"data\"\n\n[modules.goal]\ntype = \"fake\"\ninterval = -1\n");
    fixture.env.bootstrap();
    assert_eq!(fixture.env.queued_jobs(), 1);

    fixture.env.tick();
    fixture.env.join_workers().await;

    assert_eq!(*fixture.scans.lock(), vec!["goal".to_string()]);
    assert!(!fixture.env.timer_armed("goal"), "run-once modules are not rescheduled");
}

#[tokio::test]
async fn periodic_modules_fire_on_their_timer_and_rearm() {
    let fixture = fixture(THREE_MODULES);
    fixture.env.bootstrap();
    assert!(fixture.env.timer_armed("alpha"));
    assert_eq!(fixture.env.queued_jobs(), 0);

    fixture.clock.advance(Duration::from_secs(31));
    fixture.env.tick();
    fixture.env.join_workers().await;

    assert_eq!(*fixture.scans.lock(), vec!["alpha".to_string()]);
    assert!(fixture.env.timer_armed("alpha"), "finished worker restarts the timer");
    assert!(fixture.env.timer_armed("beta"), "other timers untouched");
}

#[tokio::test]
async fn full_scan_runs_every_collector_exactly_once() {
    let fixture = fixture(THREE_MODULES);
    fixture.env.bootstrap();

    fixture.env.do_full_scan();
    assert_eq!(fixture.env.queued_jobs(), 3);
    assert!(!fixture.env.timer_armed("alpha"), "periodic timers are cancelled");

    fixture.env.tick();
    fixture.env.join_workers().await;

    let mut scanned = fixture.scans.lock().clone();
    scanned.sort();
    assert_eq!(scanned, vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]);

    // Nothing reschedules: a long time later there is no further work.
    fixture.clock.advance(Duration::from_secs(600));
    fixture.env.tick();
    fixture.env.join_workers().await;
    assert_eq!(fixture.scans.lock().len(), 3);
}

#[tokio::test]
async fn a_full_queue_drops_the_enqueue() {
    let config = r#"
data_directory = "data"
queue_size = 2

[modules.alpha]
type = "fake"
interval = 30

[modules.beta]
type = "fake"
interval = 60

[modules.gamma]
type = "fake"
interval = 90
"#;
    let fixture = fixture(config);
    fixture.env.do_full_scan();
    assert_eq!(fixture.env.queued_jobs(), 2, "third enqueue is dropped");
}

#[tokio::test]
async fn collector_errors_do_not_break_the_schedule() {
    let fixture = fixture_with(THREE_MODULES, |_| {
        Err(trellis_adapters::CollectorError::Remote("ssh unreachable".to_string()))
    });
    fixture.env.bootstrap();

    fixture.clock.advance(Duration::from_secs(31));
    fixture.env.tick();
    fixture.env.join_workers().await;

    assert_eq!(fixture.scans.lock().len(), 1);
    assert!(fixture.env.timer_armed("alpha"), "failing collector is rescheduled");
}

#[tokio::test]
async fn freeze_suspends_expiry_until_unfreeze() {
    let fixture = fixture(THREE_MODULES);
    let graph = fixture.env.graph();
    graph.get_or_create_host("h1", "scan", trellis_core::Ttl::secs(5), None, None).unwrap();

    fixture.env.freeze_environment().await;
    assert!(fixture.env.is_frozen());

    fixture.clock.advance(Duration::from_secs(300));
    fixture.env.tick();
    assert_eq!(graph.hosts().len(), 1, "frozen graphs do not expire");

    fixture.env.unfreeze_environment();
    fixture.clock.advance(Duration::from_secs(4));
    fixture.env.tick();
    assert_eq!(graph.hosts().len(), 1, "the remaining ttl survived the freeze");

    fixture.clock.advance(Duration::from_secs(2));
    fixture.env.tick();
    assert!(graph.hosts().is_empty());
}

#[tokio::test]
async fn freeze_pauses_collector_timers() {
    let fixture = fixture(THREE_MODULES);
    fixture.env.bootstrap();

    fixture.env.freeze_environment().await;
    fixture.clock.advance(Duration::from_secs(600));
    fixture.env.tick();
    fixture.env.join_workers().await;
    assert!(fixture.scans.lock().is_empty(), "no collection while frozen");

    fixture.env.unfreeze_environment();
    fixture.clock.advance(Duration::from_secs(31));
    fixture.env.tick();
    fixture.env.join_workers().await;
    assert_eq!(fixture.scans.lock().len(), 1);
}

#[tokio::test]
async fn continuous_exporter_flushes_on_its_timer() {
    let config = r#"
data_directory = "data"
continuous_exporters = ["json_log"]
"#;
    let fixture = fixture(config);
    fixture.env.bootstrap();

    let graph = fixture.env.graph();
    graph.get_or_create_host("h1", "scan", trellis_core::Ttl::secs(60), None, None).unwrap();

    fixture.clock.advance(Duration::from_secs(2));
    fixture.env.tick();

    let log = fixture.env.data_dir().join("jsonChangeLog.txt");
    let content = std::fs::read_to_string(log).unwrap();
    assert!(content.contains("\"objectType\":\"Host\""));
}

#[tokio::test]
async fn triggered_exporter_snapshots_on_its_timer() {
    let config = r#"
data_directory = "data"

[triggered_exporters.topology_xml]
interval = 300
"#;
    let fixture = fixture(config);
    fixture.env.bootstrap();
    let graph = fixture.env.graph();
    graph.get_or_create_host("h1", "scan", trellis_core::Ttl::secs(600), None, None).unwrap();

    fixture.clock.advance(Duration::from_secs(301));
    fixture.env.tick();

    let exported = fixture.env.data_dir().join("topology.xml");
    let content = std::fs::read_to_string(exported).unwrap();
    assert!(content.contains("<host id=\"h1\""));
}

#[tokio::test]
async fn shutdown_stops_workers_and_timers() {
    let fixture = fixture(THREE_MODULES);
    fixture.env.bootstrap();
    fixture.env.shutdown().await;

    fixture.clock.advance(Duration::from_secs(600));
    fixture.env.tick();
    fixture.env.join_workers().await;
    assert!(fixture.scans.lock().is_empty());
}

#[tokio::test]
async fn data_directory_operations_roundtrip() {
    let fixture = fixture(THREE_MODULES);
    fixture.env.upload_configuration("goal.xml", "<config name=\"demo\"/>").unwrap();

    assert_eq!(fixture.env.list_files().unwrap(), vec!["goal.xml".to_string()]);
    assert_eq!(fixture.env.read_file("goal.xml").unwrap(), "<config name=\"demo\"/>");
    assert!(fixture.env.read_file("missing.xml").is_err());
}

#[tokio::test]
async fn missing_environment_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let result = Environment::new(
        "broken",
        dir.path(),
        Arc::new(trellis_config::LocationsRegistry::default()),
        CollectorRegistry::empty(),
        ExporterRegistry::builtin(),
        Dispatcher::new(BuilderOverrides::default()),
        Arc::new(FakeClock::new()),
    );
    assert!(result.is_err());
}
