// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use trellis_core::{FakeClock, Ttl};

fn graph() -> Arc<Graph> {
    Arc::new(Graph::new("env", Arc::new(FakeClock::new())))
}

#[test]
fn continuous_exporter_buffers_and_flushes() {
    let graph = graph();
    let dir = tempfile::tempdir().unwrap();
    let exporter = JsonLogExporter::new(&graph, dir.path());

    let host = graph.get_or_create_host("h1", "scan", Ttl::secs(60), None, None).unwrap();
    graph.set_cpus(host, 4, "scan", Ttl::secs(60));
    assert_eq!(exporter.buffered(), 2, "New and Changed are buffered");

    exporter.flush();
    assert_eq!(exporter.buffered(), 0);

    let content = std::fs::read_to_string(dir.path().join("jsonChangeLog.txt")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let new: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(new["type"], "new");
    assert_eq!(new["objectType"], "Host");
    assert_eq!(new["initialValues"]["id"], "h1");

    let changed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(changed["type"], "change_set");
    assert_eq!(changed["member"], "cpu");
    assert_eq!(changed["value"], 4);
}

#[test]
fn flush_appends_across_calls() {
    let graph = graph();
    let dir = tempfile::tempdir().unwrap();
    let exporter = JsonLogExporter::new(&graph, dir.path());

    graph.get_or_create_host("h1", "scan", Ttl::secs(60), None, None).unwrap();
    exporter.flush();
    graph.get_or_create_host("h2", "scan", Ttl::secs(60), None, None).unwrap();
    exporter.flush();

    let content = std::fs::read_to_string(dir.path().join("jsonChangeLog.txt")).unwrap();
    assert_eq!(content.lines().count(), 2);
}

#[test]
fn stopped_exporter_sees_no_further_events() {
    let graph = graph();
    let dir = tempfile::tempdir().unwrap();
    let exporter = JsonLogExporter::new(&graph, dir.path());

    exporter.stop(&graph);
    graph.get_or_create_host("h1", "scan", Ttl::secs(60), None, None).unwrap();
    assert_eq!(exporter.buffered(), 0);
}

#[test]
fn triggered_topology_export_writes_a_file() {
    let graph = graph();
    graph.get_or_create_host("h1", "scan", Ttl::secs(60), None, None).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let registry = ExporterRegistry::builtin();
    let exporter = registry.triggered("topology_xml").expect("builtin exporter");
    let snapshot = graph.copy(None).unwrap();
    exporter(dir.path(), &snapshot).unwrap();

    let content = std::fs::read_to_string(dir.path().join("topology.xml")).unwrap();
    assert!(content.contains("<host id=\"h1\""));
}

#[test]
fn unknown_exporter_names_resolve_to_none() {
    let registry = ExporterRegistry::builtin();
    assert!(registry.continuous("json_log").is_some());
    assert!(registry.continuous("nope").is_none());
    assert!(registry.triggered("nope").is_none());
}
