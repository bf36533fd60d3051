// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Locations registry: per-site hypervisor kind, templates with metadata
//! tags, and the login fields hypervisor adapters need.

use crate::ConfigError;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct LocationsRegistry {
    entries: IndexMap<String, LocationEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationEntry {
    /// Hypervisor kind, e.g. "xen".
    pub hypervisor: Option<String>,

    pub default_template: Option<String>,

    #[serde(default)]
    pub templates: IndexMap<String, TemplateEntry>,

    // Hypervisor login fields, passed through to builder adapters.
    pub uri: Option<String>,
    pub login_id: Option<String>,
    pub login_pass: Option<String>,
    pub xen_storage: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateEntry {
    /// Metadata tags such as ["ubuntu", "router"].
    #[serde(default)]
    pub metadata: Vec<String>,
}

impl LocationsRegistry {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let registry: Self = crate::load_toml(path)?;
        Ok(registry.lowercased())
    }

    /// Location IDs are case-insensitive; the registry keys are normalized
    /// once at load time.
    fn lowercased(self) -> Self {
        let entries = self
            .entries
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&LocationEntry> {
        self.entries.get(&id.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LocationEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
#[path = "locations_tests.rs"]
mod tests;
