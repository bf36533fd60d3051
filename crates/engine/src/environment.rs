// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-environment scheduler.
//!
//! One long-lived task per environment drives the collector timers, the
//! bounded priority queue and the worker pool, sweeps verification expiry,
//! and fires exporters. All timing state is deadline data polled by
//! [`Environment::tick`]; the run loop only decides how long to sleep
//! between polls.

use crate::export::{ContinuousExporter, ExporterRegistry, TriggeredExporterFn};
use crate::queue::BoundedPriorityQueue;
use crate::scheduler::Scheduler;
use crate::{Dispatcher, Job, RuntimeError};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trellis_adapters::{CollectorRegistry, ScanContext};
use trellis_config::{EnvironmentConfig, LocationsRegistry};
use trellis_core::{Clock, Graph, Ttl};

/// Queue priority used by full scans to jump ahead of periodic work.
pub const HIGHEST_PRIO: u8 = 1;
/// Queue priority of normal periodic collection.
pub const PRIORITY: u8 = 5;

/// Hard bound on the dequeue wait before the loop re-checks the stop flag.
const DEQUEUE_WAIT: Duration = Duration::from_secs(30);
/// Continuous exporters flush once a second.
const FLUSH_INTERVAL: Ttl = Ttl::After(Duration::from_secs(1));

const CONFIG_FILE: &str = "environment.toml";

/// Deployment progress token, readable through the command server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupProgress {
    Idle,
    Initializing,
    PlanReceived,
    Building,
    Step { index: usize, total: usize, action: String, object: String },
    Finished { started_at: String },
}

impl SetupProgress {
    /// A new deployment may only start when no other is in flight.
    pub fn can_start(&self) -> bool {
        matches!(self, SetupProgress::Idle | SetupProgress::Finished { .. })
    }
}

impl std::fmt::Display for SetupProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupProgress::Idle => Ok(()),
            SetupProgress::Initializing => write!(f, "Setup is initializing..."),
            SetupProgress::PlanReceived => write!(f, "Plan received."),
            SetupProgress::Building => write!(f, "Start building..."),
            SetupProgress::Step { index, total, action, object } => {
                write!(f, "Call step {index}/{total}: '{action}' on object '{object}'")
            }
            SetupProgress::Finished { started_at } => {
                write!(f, "Finished setup started at '{started_at}'.")
            }
        }
    }
}

struct WorkerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

pub(crate) struct EnvInner {
    name: String,
    config: EnvironmentConfig,
    data_dir: PathBuf,
    graph: Arc<Graph>,
    clock: Arc<dyn Clock>,
    locations: Arc<LocationsRegistry>,
    collectors: CollectorRegistry,
    exporters: ExporterRegistry,
    dispatcher: Dispatcher,
    queue: Mutex<BoundedPriorityQueue>,
    queue_notify: Notify,
    /// Collector timers; paused during freeze.
    timers: Mutex<Scheduler>,
    /// Exporter flush/trigger timers; they keep firing during freeze.
    exporter_timers: Mutex<Scheduler>,
    workers: Mutex<IndexMap<u64, WorkerHandle>>,
    next_worker: AtomicU64,
    continuous: Mutex<Vec<Arc<dyn ContinuousExporter>>>,
    triggered: Mutex<IndexMap<String, TriggeredExporterFn>>,
    pub(crate) progress: Mutex<SetupProgress>,
    pub(crate) setup_task: Mutex<Option<JoinHandle<()>>>,
    stop: CancellationToken,
    frozen: AtomicBool,
}

#[derive(Clone)]
pub struct Environment {
    pub(crate) inner: Arc<EnvInner>,
}

impl Environment {
    /// Build an environment from its directory. Configuration problems are
    /// fatal: the environment never reaches running state.
    pub fn new(
        name: &str,
        dir: &Path,
        locations: Arc<LocationsRegistry>,
        collectors: CollectorRegistry,
        exporters: ExporterRegistry,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        let config = EnvironmentConfig::load(&dir.join(CONFIG_FILE))?;
        let data_dir = config.data_dir(dir);
        std::fs::create_dir_all(&data_dir)
            .map_err(|source| RuntimeError::Io { path: data_dir.clone(), source })?;

        let graph = Arc::new(Graph::new(name, Arc::clone(&clock)));
        let queue = BoundedPriorityQueue::new(config.queue_size);

        Ok(Self {
            inner: Arc::new(EnvInner {
                name: name.to_string(),
                config,
                data_dir,
                graph,
                clock,
                locations,
                collectors,
                exporters,
                dispatcher,
                queue: Mutex::new(queue),
                queue_notify: Notify::new(),
                timers: Mutex::new(Scheduler::new()),
                exporter_timers: Mutex::new(Scheduler::new()),
                workers: Mutex::new(IndexMap::new()),
                next_worker: AtomicU64::new(0),
                continuous: Mutex::new(Vec::new()),
                triggered: Mutex::new(IndexMap::new()),
                progress: Mutex::new(SetupProgress::Idle),
                setup_task: Mutex::new(None),
                stop: CancellationToken::new(),
                frozen: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.inner.graph
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.inner.config
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub(crate) fn locations(&self) -> &Arc<LocationsRegistry> {
        &self.inner.locations
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn setup_progress(&self) -> String {
        self.inner.progress.lock().to_string()
    }

    pub(crate) fn set_progress(&self, progress: SetupProgress) {
        tracing::info!(environment = %self.inner.name, "{progress}");
        *self.inner.progress.lock() = progress;
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }

    /// Spawn the scheduling loop.
    pub fn start(&self) -> JoinHandle<()> {
        let env = self.clone();
        tokio::spawn(async move { env.run().await })
    }

    /// Wire exporters and load the scanning schedule without entering the
    /// loop. `start` does this as its first step.
    pub fn bootstrap(&self) {
        self.init_exporters();
        self.init_schedule();
    }

    async fn run(&self) {
        self.bootstrap();
        tracing::info!(environment = %self.inner.name, "environment running");

        loop {
            let wait = self.next_wait();
            tokio::select! {
                _ = self.inner.stop.cancelled() => break,
                _ = self.inner.queue_notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
            if self.inner.stop.is_cancelled() {
                break;
            }
            self.tick();
        }
        tracing::info!(environment = %self.inner.name, "environment stopped");
    }

    /// How long the loop may sleep before something needs attention.
    fn next_wait(&self) -> Duration {
        if !self.inner.queue.lock().is_empty() {
            return Duration::ZERO;
        }
        let now = self.inner.clock.now();
        let deadlines = [
            self.inner.timers.lock().next_deadline(),
            self.inner.exporter_timers.lock().next_deadline(),
            self.inner.graph.next_expiry(),
        ];
        deadlines
            .into_iter()
            .flatten()
            .map(|deadline| deadline.saturating_duration_since(now))
            .min()
            .unwrap_or(DEQUEUE_WAIT)
            .min(DEQUEUE_WAIT)
    }

    /// One poll of all deadline-driven state: fire timers, sweep expiry,
    /// drain the queue into workers.
    pub fn tick(&self) {
        let now = self.inner.clock.now();

        let due = self.inner.timers.lock().fired(now);
        for name in due {
            let interval =
                self.inner.config.modules.get(&name).map(|module| module.interval).unwrap_or(-1);
            self.enqueue(PRIORITY, interval, &name);
        }

        let due = self.inner.exporter_timers.lock().fired(now);
        for timer in due {
            self.fire_exporter_timer(&timer, now);
        }

        if !self.is_frozen() {
            self.inner.graph.expire();
        }

        loop {
            let job = self.inner.queue.lock().pop();
            match job {
                Some(job) => self.dispatch_job(job),
                None => break,
            }
        }
    }

    fn enqueue(&self, priority: u8, interval: i64, collector: &str) {
        let result = self.inner.queue.lock().push(priority, interval, collector);
        match result {
            Ok(()) => self.inner.queue_notify.notify_one(),
            Err(error) => {
                tracing::error!(collector, %error, "not able to enqueue collector");
            }
        }
    }

    /// Load the scanning schedule: run-once modules enqueue immediately,
    /// periodic ones arm their timer.
    fn init_schedule(&self) {
        let now = self.inner.clock.now();
        for (name, module) in &self.inner.config.modules {
            if module.interval < 0 {
                tracing::warn!(module = %name, "no interval; module runs only once");
                self.enqueue(PRIORITY, -1, name);
            } else {
                self.inner.timers.lock().set_timer(name, Ttl::from_interval(module.interval), now);
            }
        }
    }

    fn init_exporters(&self) {
        let now = self.inner.clock.now();
        for name in &self.inner.config.continuous_exporters {
            match self.inner.exporters.continuous(name) {
                Some(factory) => {
                    let exporter = factory(&self.inner.graph, &self.inner.data_dir);
                    self.inner.continuous.lock().push(exporter);
                    self.inner.exporter_timers.lock().set_timer(
                        &format!("flush:{name}"),
                        FLUSH_INTERVAL,
                        now,
                    );
                    tracing::debug!(exporter = %name, "added continuous exporter");
                }
                None => tracing::error!(exporter = %name, "unknown continuous exporter"),
            }
        }
        for (name, config) in &self.inner.config.triggered_exporters {
            match self.inner.exporters.triggered(name) {
                Some(exporter) => {
                    if config.interval < 1 {
                        tracing::error!(exporter = %name, "invalid interval for triggered exporter");
                        continue;
                    }
                    self.inner.triggered.lock().insert(name.clone(), Arc::clone(exporter));
                    self.inner.exporter_timers.lock().set_timer(
                        &format!("trigger:{name}"),
                        Ttl::from_interval(config.interval),
                        now,
                    );
                }
                None => tracing::error!(exporter = %name, "unknown triggered exporter"),
            }
        }
    }

    fn fire_exporter_timer(&self, timer: &str, now: std::time::Instant) {
        if let Some(name) = timer.strip_prefix("flush:") {
            for exporter in self.inner.continuous.lock().iter() {
                if exporter.name() == name {
                    exporter.flush();
                }
            }
            self.inner.exporter_timers.lock().set_timer(timer, FLUSH_INTERVAL, now);
        } else if let Some(name) = timer.strip_prefix("trigger:") {
            let exporter = self.inner.triggered.lock().get(name).cloned();
            if let Some(exporter) = exporter {
                // Each firing works on a snapshot of the graph.
                match self.inner.graph.copy(None) {
                    Ok(snapshot) => {
                        if let Err(error) = exporter(&self.inner.data_dir, &snapshot) {
                            tracing::error!(exporter = %name, %error, "triggered exporter failed");
                        }
                    }
                    Err(error) => {
                        tracing::error!(exporter = %name, %error, "cannot snapshot graph");
                    }
                }
                let interval = self
                    .inner
                    .config
                    .triggered_exporters
                    .get(name)
                    .map(|config| config.interval)
                    .unwrap_or(-1);
                self.inner.exporter_timers.lock().set_timer(timer, Ttl::from_interval(interval), now);
            }
        }
    }

    /// Resolve the collector for a dequeued job and run it on a worker.
    fn dispatch_job(&self, job: Job) {
        tracing::debug!(collector = %job.collector, "starting collector module");
        let Some(module) = self.inner.config.modules.get(&job.collector) else {
            tracing::error!(collector = %job.collector, "no configuration for collector");
            return;
        };
        let Some(collector) = self.inner.collectors.resolve(&module.kind) else {
            tracing::error!(collector = %job.collector, kind = %module.kind, "unknown collector type");
            return;
        };

        // Verifications outlive one missed scan; run-once modules pin
        // their findings. A module config may set an explicit timeout.
        let ttl = module
            .config
            .get("timeout")
            .and_then(|value| value.as_integer())
            .map(Ttl::from_interval)
            .unwrap_or(if job.interval < 0 {
                Ttl::Forever
            } else {
                Ttl::from_interval(job.interval * 2)
            });

        let token = self.inner.stop.child_token();
        let ctx = ScanContext {
            graph: Arc::clone(&self.inner.graph),
            name: job.collector.clone(),
            ttl,
            config: module.config.clone(),
            locations: Arc::clone(&self.inner.locations),
            stop: token.clone(),
        };

        let env = self.clone();
        let worker_id = self.inner.next_worker.fetch_add(1, Ordering::Relaxed);
        let join = tokio::spawn(async move {
            let name = ctx.name.clone();
            if let Err(error) = collector.scan(ctx).await {
                tracing::error!(collector = %name, %error, "error while executing scan");
            }
            env.worker_finished(worker_id, &name, job.interval);
        });
        self.inner.workers.lock().insert(worker_id, WorkerHandle { token, join });
    }

    /// Restart the module timer when requested and leave the worker set.
    fn worker_finished(&self, worker_id: u64, collector: &str, interval: i64) {
        if interval >= 0 {
            let now = self.inner.clock.now();
            self.inner.timers.lock().set_timer(collector, Ttl::from_interval(interval), now);
        }
        self.inner.workers.lock().shift_remove(&worker_id);
    }

    /// Wait for every running worker to finish.
    pub async fn join_workers(&self) {
        let workers: Vec<WorkerHandle> =
            self.inner.workers.lock().drain(..).map(|(_, handle)| handle).collect();
        for worker in workers {
            let _ = worker.join.await;
        }
    }

    /// Launch every configured collector once, ahead of periodic work.
    pub fn do_full_scan(&self) {
        tracing::info!(environment = %self.inner.name, "next job is a full scan");
        self.inner.timers.lock().cancel_all();
        self.inner.queue.lock().remove_periodic();
        let names: Vec<String> = self.inner.config.modules.keys().cloned().collect();
        for name in names {
            self.enqueue(HIGHEST_PRIO, -1, &name);
        }
    }

    /// Freeze for deployment: suspend expiry, pause collector timers, stop
    /// the running workers and wait for them.
    pub async fn freeze_environment(&self) {
        tracing::info!(environment = %self.inner.name, "freezing environment");
        self.inner.frozen.store(true, Ordering::SeqCst);
        self.inner.graph.freeze();
        self.inner.timers.lock().pause_all(self.inner.clock.now());
        for handle in self.inner.workers.lock().values() {
            handle.token.cancel();
        }
        self.join_workers().await;
    }

    /// Resume collection after deployment.
    pub fn unfreeze_environment(&self) {
        tracing::info!(environment = %self.inner.name, "unfreezing environment");
        self.inner.graph.melt();
        self.inner.timers.lock().resume_all(self.inner.clock.now());
        self.inner.frozen.store(false, Ordering::SeqCst);
    }

    /// Stop everything: timers, workers, exporters, the loop itself.
    pub async fn shutdown(&self) {
        self.inner.timers.lock().cancel_all();
        self.inner.exporter_timers.lock().cancel_all();
        for handle in self.inner.workers.lock().values() {
            handle.token.cancel();
        }
        for exporter in self.inner.continuous.lock().iter() {
            exporter.stop(&self.inner.graph);
        }
        self.inner.stop.cancel();
        self.join_workers().await;
    }

    // ---- data directory operations ----

    pub fn upload_configuration(&self, file_name: &str, data: &str) -> Result<(), RuntimeError> {
        let path = self.inner.data_dir.join(file_name);
        std::fs::write(&path, data).map_err(|source| RuntimeError::Io { path, source })
    }

    pub fn list_files(&self) -> Result<Vec<String>, RuntimeError> {
        let entries = std::fs::read_dir(&self.inner.data_dir)
            .map_err(|source| RuntimeError::Io { path: self.inner.data_dir.clone(), source })?;
        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        Ok(files)
    }

    pub fn read_file(&self, file_name: &str) -> Result<String, RuntimeError> {
        let path = self.inner.data_dir.join(file_name);
        std::fs::read_to_string(&path).map_err(|source| RuntimeError::Io { path, source })
    }

    /// Export the collected topology to an XML file in the data directory.
    pub fn export_xml(&self, file_name: &str) -> Result<(), RuntimeError> {
        let snapshot = self.inner.graph.copy(None)?;
        let rendered = trellis_adapters::xml::write_topology(&snapshot)?;
        let path = self.inner.data_dir.join(file_name);
        std::fs::write(&path, rendered).map_err(|source| RuntimeError::Io { path, source })
    }

    // ---- test-facing observability ----

    pub fn queued_jobs(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn timer_armed(&self, name: &str) -> bool {
        self.inner.timers.lock().is_armed(name)
    }

    pub fn running_workers(&self) -> usize {
        self.inner.workers.lock().len()
    }
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
