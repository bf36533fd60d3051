// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake collectors and builders for tests.

use crate::{BuildContext, BuildError, BuilderFn, Collector, CollectorError, ScanContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

type ScanFn = dyn Fn(&ScanContext) -> Result<(), CollectorError> + Send + Sync;

/// Collector that records its invocations and optionally runs a closure
/// against the graph.
#[derive(Clone, Default)]
pub struct FakeCollector {
    scans: Arc<Mutex<u32>>,
    on_scan: Option<Arc<ScanFn>>,
}

impl FakeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan(
        behavior: impl Fn(&ScanContext) -> Result<(), CollectorError> + Send + Sync + 'static,
    ) -> Self {
        Self { scans: Arc::new(Mutex::new(0)), on_scan: Some(Arc::new(behavior)) }
    }

    pub fn scan_count(&self) -> u32 {
        *self.scans.lock()
    }
}

#[async_trait]
impl Collector for FakeCollector {
    async fn scan(&self, ctx: ScanContext) -> Result<(), CollectorError> {
        *self.scans.lock() += 1;
        match &self.on_scan {
            Some(behavior) => behavior(&ctx),
            None => Ok(()),
        }
    }
}

/// Shared call log for fake builders: (callable name, object global ID).
pub type BuildLog = Arc<Mutex<Vec<(String, String)>>>;

/// Builder callable that records its invocation; fails when `fail` is set.
pub fn recording_builder(name: &str, log: BuildLog, fail: bool) -> BuilderFn {
    let name = name.to_string();
    Arc::new(move |ctx: &BuildContext<'_>| {
        let object = ctx.args.first().map(|id| ctx.graph.global_id(*id)).unwrap_or_default();
        log.lock().push((name.clone(), object));
        if fail {
            return Err(BuildError::Adapter(format!("{name} failed")));
        }
        Ok(())
    })
}
