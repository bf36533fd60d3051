// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment pipeline: goal XML -> diff -> plan -> ordered build steps.
//!
//! The environment is frozen for the whole pipeline so verifier expiry
//! cannot delete infrastructure mid-build; whatever happens — planner
//! missing, no solution, builders failing — the freeze is unwound at the
//! end.

use crate::diff::diff_report;
use crate::environment::{Environment, SetupProgress};
use crate::planner::{self, ResolvedStep};
use crate::RuntimeError;
use std::collections::BTreeSet;
use std::sync::Arc;
use trellis_adapters::xml::{config_name, load_goal};
use trellis_adapters::BuildContext;
use trellis_core::{Entity, EntityKind, Graph, NodeId};

/// Source name used for goal graphs built from an uploaded configuration.
const APPLY_SOURCE: &str = "apply";

impl Environment {
    /// Apply a previously uploaded configuration file.
    ///
    /// Freezes the environment, builds the goal graph, snapshots the
    /// current one, diffs them and hands the rest to a background setup
    /// task. The reply is always a user-readable string.
    pub async fn apply_config(&self, file_name: &str) -> Result<String, RuntimeError> {
        if !self.inner.progress.lock().can_start() {
            return Ok("Another task is already running!!".to_string());
        }

        let started_at = self.clock().epoch_secs();
        tracing::info!(environment = %self.name(), file = file_name, "starting setup");
        self.freeze_environment().await;

        let prepared = self.prepare_deployment(file_name);
        let (goal, current) = match prepared {
            Ok(graphs) => graphs,
            Err(error) => {
                self.unfreeze_environment();
                return Err(error);
            }
        };

        let report = diff_report(&goal, &current);
        self.set_progress(SetupProgress::Initializing);

        let env = self.clone();
        let task = tokio::spawn(async move {
            env.run_setup(goal, current, report, started_at).await;
        });
        *self.inner.setup_task.lock() = Some(task);

        Ok(format!(
            "The deployment started. Get progress with 'getSetupProgress {}'",
            self.name()
        ))
    }

    /// Await the background setup task, if one is running.
    pub async fn wait_for_setup(&self) {
        let task = self.inner.setup_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn prepare_deployment(&self, file_name: &str) -> Result<(Graph, Graph), RuntimeError> {
        let xml = self.read_file(file_name)?;
        let id = config_name(&xml)?;
        tracing::info!(environment = %self.name(), configuration = %id, "applying configuration");

        let goal = Graph::new(id.clone(), Arc::clone(self.clock()));
        load_goal(&goal, &xml, APPLY_SOURCE, self.locations())?;
        let current = self.graph().copy(Some(&id))?;
        Ok((goal, current))
    }

    async fn run_setup(
        &self,
        goal: Graph,
        current: Graph,
        report: crate::diff::DiffReport,
        started_at: u64,
    ) {
        let tmp_dir = self.data_dir().join("tmp");
        if let Err(error) = std::fs::create_dir_all(&tmp_dir) {
            tracing::error!(%error, "cannot create planning directory");
        }

        let steps = planner::plan(
            self.config().planner.as_ref(),
            &tmp_dir,
            &report,
            &goal,
            &current,
        )
        .await;
        self.set_progress(SetupProgress::PlanReceived);
        self.set_progress(SetupProgress::Building);

        let total = steps.len();
        for (index, step) in steps.iter().enumerate() {
            let object = step
                .args
                .first()
                .map(|(id, _)| id.clone())
                .unwrap_or_else(|| "-".to_string());
            self.set_progress(SetupProgress::Step {
                index: index + 1,
                total,
                action: step.action.clone(),
                object,
            });
            if let Err(error) = self.execute_step(&goal, &current, step) {
                tracing::error!(action = %step.action, %error, "error while executing step");
            }
        }

        self.set_progress(SetupProgress::Finished { started_at: started_at.to_string() });
        self.unfreeze_environment();
    }

    /// Resolve one plan step through the dispatcher and invoke the builder.
    fn execute_step(
        &self,
        goal: &Graph,
        current: &Graph,
        step: &ResolvedStep,
    ) -> Result<(), RuntimeError> {
        let Some((object_id, object)) = step.args.first() else {
            tracing::error!(action = %step.action, "step without arguments, skipping");
            return Ok(());
        };
        let graph = object.graph(goal, current);

        // Renaming actions settle the host's name flag as a side effect.
        match step.action.as_str() {
            "bootandnamed" | "rebootandnamed" => graph.set_name_applied(object.node, true),
            "bootunnamed" => graph.set_name_applied(object.node, false),
            _ => {}
        }

        let (hypervisor, template, service) = dispatch_tags(graph, object.node);
        let Some(entry) = self.dispatcher().find(
            object_id,
            &step.action,
            hypervisor.as_deref(),
            &template,
            service.as_deref(),
        ) else {
            return Ok(());
        };

        let args: Vec<NodeId> = step.args.iter().map(|(_, object)| object.node).collect();
        let ctx = BuildContext {
            graph,
            config_name: goal.name(),
            args: &args,
            locations: self.locations(),
        };
        (entry.func)(&ctx)?;
        Ok(())
    }
}

/// Dispatch tags of an object: the hypervisor of its location, the metadata
/// of its (owning host's) template, and the service type or product.
pub fn dispatch_tags(
    graph: &Graph,
    node: NodeId,
) -> (Option<String>, BTreeSet<String>, Option<String>) {
    fn host_tags(graph: &Graph, host: NodeId) -> (Option<String>, BTreeSet<String>) {
        let hypervisor = graph
            .location_of(host)
            .and_then(|location| match graph.entity(location) {
                Some(Entity::Location(data)) => data.hypervisor.map(|h| h.to_string()),
                _ => None,
            });
        let template = graph
            .template_of_host(host)
            .and_then(|template| match graph.entity(template) {
                Some(Entity::Template(data)) => {
                    Some(data.metadata.iter().map(|tag| tag.to_string()).collect())
                }
                _ => None,
            })
            .unwrap_or_default();
        (hypervisor, template)
    }

    match graph.kind(node) {
        Some(EntityKind::Host) => {
            let (hypervisor, template) = host_tags(graph, node);
            (hypervisor, template, None)
        }
        Some(
            EntityKind::Interface
            | EntityKind::Disk
            | EntityKind::Route
            | EntityKind::FirewallRule
            | EntityKind::FirewallRaw,
        ) => match graph.host_of(node) {
            Some(host) => {
                let (hypervisor, template) = host_tags(graph, host);
                (hypervisor, template, None)
            }
            None => (None, BTreeSet::new(), None),
        },
        Some(EntityKind::Layer3Address) => {
            let host = graph.interface_of_address(node).and_then(|iface| graph.host_of(iface));
            match host {
                Some(host) => {
                    let (hypervisor, template) = host_tags(graph, host);
                    (hypervisor, template, None)
                }
                None => (None, BTreeSet::new(), None),
            }
        }
        Some(EntityKind::Service | EntityKind::DnsService | EntityKind::DhcpService) => {
            let service = match graph.entity(node) {
                Some(Entity::Service(data)) => {
                    Some(data.product.as_deref().unwrap_or(&data.kind).to_string())
                }
                _ => None,
            };
            let template = graph
                .host_of_service(node)
                .map(|host| host_tags(graph, host).1)
                .unwrap_or_default();
            (None, template, service)
        }
        Some(EntityKind::Layer2Network) => {
            let hypervisor = graph
                .location_of(node)
                .and_then(|location| match graph.entity(location) {
                    Some(Entity::Location(data)) => data.hypervisor.map(|h| h.to_string()),
                    _ => None,
                });
            (hypervisor, BTreeSet::new(), None)
        }
        _ => (None, BTreeSet::new(), None),
    }
}

#[cfg(test)]
#[path = "deploy_tests.rs"]
mod tests;
