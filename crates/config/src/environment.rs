// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-environment configuration: data directory, collector modules,
//! exporters and the planner invocation.

use crate::ConfigError;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_QUEUE_SIZE: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// Where uploaded configurations and exports live. Relative paths are
    /// resolved against the environment directory.
    pub data_directory: PathBuf,

    pub log_level: Option<String>,

    /// Capacity of the collector job queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Configuration names this environment manages.
    #[serde(default)]
    pub working_set: Vec<String>,

    /// Collector modules, keyed by instance name. Order matters for full
    /// scans, so the map preserves it.
    #[serde(default)]
    pub modules: IndexMap<String, ModuleConfig>,

    #[serde(default)]
    pub continuous_exporters: Vec<String>,

    #[serde(default)]
    pub triggered_exporters: IndexMap<String, TriggeredExporterConfig>,

    pub planner: Option<PlannerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Collector type name resolved through the collector registry.
    #[serde(rename = "type")]
    pub kind: String,

    /// Seconds between runs; negative means "run once, never reschedule".
    #[serde(default = "default_interval")]
    pub interval: i64,

    /// Module-specific connection settings handed to the collector.
    #[serde(default)]
    pub config: toml::Table,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggeredExporterConfig {
    /// Seconds between firings.
    pub interval: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    /// Planner binary path; without one every deployment gets an empty plan.
    pub binary: PathBuf,

    /// PDDL domain file describing the action vocabulary.
    pub domain: PathBuf,

    #[serde(default = "default_search")]
    pub search: String,
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_interval() -> i64 {
    -1
}

fn default_search() -> String {
    "eager_greedy(ff(), preferred=ff())".to_string()
}

impl EnvironmentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        crate::load_toml(path)
    }

    /// Absolute data directory, resolved against the environment directory.
    pub fn data_dir(&self, environment_dir: &Path) -> PathBuf {
        if self.data_directory.is_absolute() {
            self.data_directory.clone()
        } else {
            environment_dir.join(&self.data_directory)
        }
    }

    pub fn module(&self, name: &str) -> Result<&ModuleConfig, ConfigError> {
        self.modules.get(name).ok_or_else(|| ConfigError::MissingKey {
            key: name.to_string(),
            context: "modules".to_string(),
        })
    }
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
