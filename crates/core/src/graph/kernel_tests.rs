// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use crate::entity::EntityKind;
use crate::event::GraphEvent;
use crate::timer::Ttl;
use std::sync::Arc;
use std::time::Duration;

fn graph_with_clock() -> (Graph, FakeClock) {
    let clock = FakeClock::new();
    let graph = Graph::new("env", Arc::new(clock.clone()));
    (graph, clock)
}

fn record_events(graph: &Graph) -> Arc<parking_lot::Mutex<Vec<GraphEvent>>> {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for bus in [graph.on_new(), graph.on_changed(), graph.on_deleted()] {
        let log = Arc::clone(&log);
        bus.add(move |event: &GraphEvent| log.lock().push(event.clone()));
    }
    log
}

#[test]
fn single_verifier_expiry_deletes_the_node() {
    let (graph, clock) = graph_with_clock();
    let log = record_events(&graph);

    let location = graph.get_or_create_location("locA", "srcA", Ttl::secs(10)).unwrap();
    let host = graph
        .get_or_create_host("h1", "srcA", Ttl::secs(1), Some(location), None)
        .unwrap();
    assert_eq!(graph.sources_of(host), vec![smol_str::SmolStr::from("srcA")]);

    clock.advance(Duration::from_secs(2));
    graph.expire();

    assert!(graph.hosts().is_empty());
    let events = log.lock();
    assert!(matches!(
        events.first(),
        Some(GraphEvent::New { object_type: EntityKind::Location, .. })
    ));
    assert!(events.iter().any(|event| matches!(
        event,
        GraphEvent::Deleted { object_type: EntityKind::Host, object } if object == "h1"
    )));
}

#[test]
fn second_verifier_keeps_the_node_alive() {
    let (graph, clock) = graph_with_clock();

    let host = graph.get_or_create_host("h1", "srcA", Ttl::secs(1), None, None).unwrap();
    graph.get_or_create_host("h1", "srcB", Ttl::secs(5), None, None).unwrap();
    assert_eq!(graph.sources_of(host).len(), 2);

    clock.advance(Duration::from_secs(2));
    graph.expire();
    assert_eq!(graph.hosts().len(), 1);
    assert_eq!(graph.sources_of(host), vec![smol_str::SmolStr::from("srcB")]);

    clock.advance(Duration::from_secs(4));
    graph.expire();
    assert!(graph.hosts().is_empty());
}

#[test]
fn reverification_restarts_the_countdown() {
    let (graph, clock) = graph_with_clock();
    let host = graph.get_or_create_host("h1", "srcA", Ttl::secs(3), None, None).unwrap();

    clock.advance(Duration::from_secs(2));
    graph.verify(host, "srcA", Ttl::secs(3));

    clock.advance(Duration::from_secs(2));
    graph.expire();
    assert_eq!(graph.hosts().len(), 1);

    clock.advance(Duration::from_secs(2));
    graph.expire();
    assert!(graph.hosts().is_empty());
}

#[test]
fn edge_deletions_are_observed_before_node_deletion() {
    let (graph, clock) = graph_with_clock();

    let network = graph.get_or_create_l2network("net1", "src", Ttl::secs(60), None).unwrap();
    let interface = graph
        .get_or_create_interface("aa:bb:cc:dd:ee:ff", "short", Ttl::secs(1), Some(network))
        .unwrap();
    let host = graph.get_or_create_host("h1", "src", Ttl::secs(60), None, None).unwrap();
    graph.add_interface(host, interface, "short", Ttl::secs(1)).unwrap();

    let log = record_events(&graph);
    clock.advance(Duration::from_secs(2));
    graph.expire();

    let events = log.lock();
    let deleted_at = events
        .iter()
        .position(|event| matches!(event, GraphEvent::Deleted { object_type: EntityKind::Interface, .. }));
    let edge_removals: Vec<usize> = events
        .iter()
        .enumerate()
        .filter_map(|(i, event)| match event {
            GraphEvent::Changed { change: crate::event::ChangeKind::Delete, .. } => Some(i),
            _ => None,
        })
        .collect();

    let deleted_at = deleted_at.expect("interface should be deleted");
    assert!(!edge_removals.is_empty(), "edge deletions should be announced");
    assert!(edge_removals.iter().all(|at| *at < deleted_at));
    // The host outlives its interface.
    assert_eq!(graph.hosts().len(), 1);
    assert!(graph.interfaces_of(host).is_empty());
}

#[test]
fn freeze_suspends_expiry_and_melt_resumes_it() {
    let (graph, clock) = graph_with_clock();
    graph.get_or_create_host("h1", "src", Ttl::secs(5), None, None).unwrap();

    graph.freeze();
    clock.advance(Duration::from_secs(60));
    graph.expire();
    assert_eq!(graph.hosts().len(), 1, "no expiry while frozen");

    graph.melt();
    clock.advance(Duration::from_secs(4));
    graph.expire();
    assert_eq!(graph.hosts().len(), 1, "remaining duration survives the freeze");

    clock.advance(Duration::from_secs(2));
    graph.expire();
    assert!(graph.hosts().is_empty());
}

#[test]
fn remove_verification_deletes_when_last_source_leaves() {
    let (graph, _clock) = graph_with_clock();
    let host = graph.get_or_create_host("h1", "srcA", Ttl::secs(60), None, None).unwrap();
    graph.get_or_create_host("h1", "srcB", Ttl::secs(60), None, None).unwrap();

    graph.remove_verification(host, "srcA");
    assert_eq!(graph.hosts().len(), 1);

    graph.remove_verification(host, "srcB");
    assert!(graph.hosts().is_empty());
}

#[test]
fn next_expiry_tracks_the_earliest_deadline() {
    let (graph, clock) = graph_with_clock();
    assert!(graph.next_expiry().is_none());

    graph.get_or_create_host("h1", "src", Ttl::secs(30), None, None).unwrap();
    graph.get_or_create_host("h2", "src", Ttl::secs(10), None, None).unwrap();

    let deadline = graph.next_expiry().expect("deadline");
    assert_eq!(deadline.duration_since(clock.now()), Duration::from_secs(10));
}

#[test]
fn bfs_visits_every_reachable_node() {
    let (graph, _clock) = graph_with_clock();
    let host = graph.get_or_create_host("h1", "src", Ttl::secs(60), None, None).unwrap();
    let network = graph.get_or_create_l2network("net1", "src", Ttl::secs(60), None).unwrap();
    let interface = graph
        .get_or_create_interface("aa:bb:cc:dd:ee:ff", "src", Ttl::secs(60), Some(network))
        .unwrap();
    graph.add_interface(host, interface, "src", Ttl::secs(60)).unwrap();

    let order = graph.bfs_from_root();
    for node in [host, network, interface] {
        assert!(order.contains(&node));
    }
}

#[test]
fn deleting_a_location_takes_its_templates() {
    let (graph, _clock) = graph_with_clock();
    let location = graph.get_or_create_location("locA", "src", Ttl::secs(60)).unwrap();
    graph
        .get_or_create_template(location, "ubuntu", Default::default(), "src", Ttl::secs(60))
        .unwrap();

    graph.delete(location);

    assert!(graph.locations().is_empty());
    assert!(graph.all_nodes().is_empty());
}
