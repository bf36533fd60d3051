// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-engine: the per-environment reconciliation runtime.
//!
//! One [`Environment`] owns the graph, a bounded priority queue feeding a
//! worker pool of collectors, the exporter wiring, and the deployment
//! pipeline (diff, plan, build) with its freeze discipline.

mod deploy;
mod diff;
mod dispatch;
mod environment;
mod error;
mod export;
mod planner;
mod queue;
mod scheduler;

pub use deploy::dispatch_tags;
pub use diff::{diff_report, AttrDiff, DiffReport, DiffState, ElementDiff, ObjectDiff};
pub use dispatch::{builder_entry, BuilderEntry, Dispatcher};
pub use environment::{Environment, SetupProgress, HIGHEST_PRIO, PRIORITY};
pub use error::RuntimeError;
pub use export::{
    ContinuousExporter, ExporterRegistry, JsonLogExporter, TriggeredExporterFn,
};
pub use planner::{object_index, parse_plan, write_problem, GraphSide, PlanObject, ResolvedStep};
pub use queue::{BoundedPriorityQueue, Job, QueueFull};
pub use scheduler::Scheduler;
