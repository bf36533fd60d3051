// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder callable interface.
//!
//! A builder mutates live infrastructure for one plan step. The dispatcher
//! picks the concrete callable by action name and tag specificity; the
//! callable gets the goal graph, the resolved step arguments and the
//! locations registry with hypervisor credentials.

use crate::BuildError;
use std::sync::Arc;
use trellis_config::LocationsRegistry;
use trellis_core::{Graph, NodeId};

/// Context handed to a builder for one plan step.
pub struct BuildContext<'a> {
    /// The goal graph the plan was computed for.
    pub graph: &'a Graph,
    /// Name of the configuration being deployed.
    pub config_name: &'a str,
    /// Plan arguments resolved to graph nodes; the first one is the object
    /// being acted on.
    pub args: &'a [NodeId],
    pub locations: &'a LocationsRegistry,
}

impl BuildContext<'_> {
    /// The primary object of the step.
    pub fn object(&self) -> Result<NodeId, BuildError> {
        self.args.first().copied().ok_or(BuildError::BadArity { expected: 1, got: 0 })
    }
}

pub type BuilderFn = Arc<dyn Fn(&BuildContext<'_>) -> Result<(), BuildError> + Send + Sync>;
