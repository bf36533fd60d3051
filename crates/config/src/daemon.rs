// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-wide configuration: the command socket and the environment roster.

use crate::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Path of the Unix socket the command server listens on.
    pub socket: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the daemon and per-environment log files.
    pub log_dir: Option<PathBuf>,

    /// Path of the locations registry shared by all environments.
    pub locations: Option<PathBuf>,

    /// Rotated log file size in bytes.
    #[serde(default = "default_log_size")]
    pub log_size: u64,

    /// How many rotated log files to keep.
    #[serde(default = "default_backup_count")]
    pub backup_count: u32,

    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentEntry {
    /// Directory holding the environment's config and data.
    pub path: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_size() -> u64 {
    10 * 1024 * 1024
}

fn default_backup_count() -> u32 {
    5
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        crate::load_toml(path)
    }
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
