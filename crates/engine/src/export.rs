// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exporters.
//!
//! Continuous exporters subscribe to the graph's change streams at
//! construction, buffer records, and flush on a periodic timer owned by the
//! environment loop. Triggered exporters are plain callables fired on a
//! timer against a `copy()` snapshot of the graph.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trellis_core::{ChangeKind, Graph, GraphEvent, HandlerId};

/// Buffering subscriber to the graph's three event streams.
pub trait ContinuousExporter: Send + Sync {
    fn name(&self) -> &str;
    /// Append buffered records to the sink and clear the buffer.
    fn flush(&self);
    /// Unsubscribe from the graph; called once at environment shutdown.
    fn stop(&self, graph: &Graph);
}

/// Callable fired on a timer with (output dir, graph snapshot).
pub type TriggeredExporterFn =
    Arc<dyn Fn(&Path, &Graph) -> std::io::Result<()> + Send + Sync>;

type ContinuousFactory =
    Arc<dyn Fn(&Arc<Graph>, &Path) -> Arc<dyn ContinuousExporter> + Send + Sync>;

/// Registry of exporter implementations, keyed by config name.
#[derive(Clone, Default)]
pub struct ExporterRegistry {
    continuous: IndexMap<String, ContinuousFactory>,
    triggered: IndexMap<String, TriggeredExporterFn>,
}

impl ExporterRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register_continuous("json_log", |graph, data_dir| -> Arc<dyn ContinuousExporter> {
            JsonLogExporter::new(graph, data_dir)
        });
        registry.register_triggered(
            "topology_xml",
            Arc::new(|data_dir: &Path, snapshot: &Graph| {
                let rendered = trellis_adapters::xml::write_topology(snapshot)
                    .map_err(|error| std::io::Error::other(error.to_string()))?;
                std::fs::write(data_dir.join("topology.xml"), rendered)
            }),
        );
        registry
    }

    pub fn register_continuous(
        &mut self,
        name: &str,
        factory: impl Fn(&Arc<Graph>, &Path) -> Arc<dyn ContinuousExporter> + Send + Sync + 'static,
    ) {
        self.continuous.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_triggered(&mut self, name: &str, exporter: TriggeredExporterFn) {
        self.triggered.insert(name.to_string(), exporter);
    }

    pub fn continuous(&self, name: &str) -> Option<&ContinuousFactory> {
        self.continuous.get(name)
    }

    pub fn triggered(&self, name: &str) -> Option<&TriggeredExporterFn> {
        self.triggered.get(name)
    }
}

/// Appends one JSON object per graph change to `jsonChangeLog.txt`.
pub struct JsonLogExporter {
    out_file: PathBuf,
    buffer: Mutex<Vec<String>>,
    handlers: Mutex<Vec<HandlerId>>,
    epoch: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl JsonLogExporter {
    pub fn new(graph: &Arc<Graph>, data_dir: &Path) -> Arc<Self> {
        let clock = Arc::clone(graph.clock());
        let exporter = Arc::new(Self {
            out_file: data_dir.join("jsonChangeLog.txt"),
            buffer: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            epoch: Arc::new(move || clock.epoch_secs()),
        });

        let mut handlers = exporter.handlers.lock();
        for bus in [graph.on_new(), graph.on_changed(), graph.on_deleted()] {
            let sink = Arc::clone(&exporter);
            handlers.push(bus.add(move |event: &GraphEvent| sink.record(event)));
        }
        drop(handlers);
        exporter
    }

    fn record(&self, event: &GraphEvent) {
        let time = (self.epoch)();
        let line = match event {
            GraphEvent::New { object_type, values } => json!({
                "time": time,
                "type": "new",
                "objectType": object_type.to_string(),
                "initialValues": values,
            }),
            GraphEvent::Changed { object_type, object, change, member, value } => {
                let kind = match change {
                    ChangeKind::Set => "change_set",
                    ChangeKind::Add => "change_add",
                    ChangeKind::Delete => "change_delete",
                };
                let mut record = json!({
                    "time": time,
                    "type": kind,
                    "objectType": object_type.to_string(),
                    "object": object,
                    "value": value,
                });
                if let Some(member) = member {
                    record["member"] = json!(member.as_str());
                }
                record
            }
            GraphEvent::Deleted { object_type, object } => json!({
                "time": time,
                "type": "delete",
                "objectType": object_type.to_string(),
                "object": object,
            }),
        };
        self.buffer.lock().push(line.to_string());
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }
}

impl ContinuousExporter for JsonLogExporter {
    fn name(&self) -> &str {
        "json_log"
    }

    fn flush(&self) {
        let lines: Vec<String> = std::mem::take(&mut *self.buffer.lock());
        if lines.is_empty() {
            return;
        }
        let mut content = lines.join("\n");
        content.push('\n');
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.out_file)
            .and_then(|mut file| std::io::Write::write_all(&mut file, content.as_bytes()));
        if let Err(error) = result {
            tracing::error!(%error, file = %self.out_file.display(), "cannot write JSON change log");
        }
    }

    fn stop(&self, graph: &Graph) {
        let handlers = std::mem::take(&mut *self.handlers.lock());
        for (bus, handler) in
            [graph.on_new(), graph.on_changed(), graph.on_deleted()].into_iter().zip(handlers)
        {
            bus.remove(handler);
        }
    }
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
