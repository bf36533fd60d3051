// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-config: TOML configuration documents.
//!
//! Four documents drive a deployment: the daemon config (which environments
//! exist), the per-environment config (collectors, exporters, planner), the
//! locations registry (hypervisors and templates per site), and the
//! dispatcher override table. A missing or invalid key is fatal for the
//! affected environment: it logs and never reaches running state.

mod daemon;
mod environment;
mod error;
mod locations;
mod overrides;

pub use daemon::{DaemonConfig, EnvironmentEntry};
pub use environment::{
    EnvironmentConfig, ModuleConfig, PlannerConfig, TriggeredExporterConfig, DEFAULT_QUEUE_SIZE,
};
pub use error::ConfigError;
pub use locations::{LocationEntry, LocationsRegistry, TemplateEntry};
pub use overrides::BuilderOverrides;

use serde::de::DeserializeOwned;
use std::path::Path;

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}
