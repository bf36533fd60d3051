// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher override table: object global ID -> action -> callable name.
//! An entry here beats any tag-based builder ranking.

use crate::ConfigError;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct BuilderOverrides {
    entries: IndexMap<String, IndexMap<String, String>>,
}

impl BuilderOverrides {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        crate::load_toml(path)
    }

    /// The override is optional in every deployment; absence is an empty
    /// table rather than an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn lookup(&self, object_id: &str, action: &str) -> Option<&str> {
        self.entries.get(object_id)?.get(action).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "overrides_tests.rs"]
mod tests;
