// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder dispatch.
//!
//! A process-wide registration list of callables, each tagged with the
//! action it implements and optionally the hypervisor, template metadata
//! and service it is specific to. `find` ranks compatible callables by
//! specificity; a per-object override from configuration beats the ranking
//! outright.

use std::collections::BTreeSet;
use trellis_adapters::BuilderFn;
use trellis_config::BuilderOverrides;

pub struct BuilderEntry {
    /// Unique callable name, referenced by override configs.
    pub name: String,
    /// Action this callable implements, e.g. `configureInterface`.
    pub action: String,
    pub hypervisor: Option<String>,
    /// Template metadata tags this callable is suitable for.
    pub template: BTreeSet<String>,
    /// Service type or product this callable is suitable for.
    pub service: Option<String>,
    pub func: BuilderFn,
}

impl BuilderEntry {
    fn compatible(
        &self,
        action: &str,
        hypervisor: Option<&str>,
        template: &BTreeSet<String>,
        service: Option<&str>,
    ) -> bool {
        if !self.action.eq_ignore_ascii_case(action) {
            return false;
        }
        if let Some(required) = &self.hypervisor {
            if hypervisor != Some(required.as_str()) {
                return false;
            }
        }
        if !self.template.is_empty() && self.template.intersection(template).next().is_none() {
            return false;
        }
        if let Some(required) = &self.service {
            if service != Some(required.as_str()) {
                return false;
            }
        }
        true
    }

    fn specificity(&self, template: &BTreeSet<String>) -> usize {
        let hypervisor = usize::from(self.hypervisor.is_some());
        let service = usize::from(self.service.is_some());
        hypervisor + self.template.intersection(template).count() + service
    }
}

impl std::fmt::Debug for BuilderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderEntry")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("hypervisor", &self.hypervisor)
            .field("template", &self.template)
            .field("service", &self.service)
            .finish()
    }
}

/// Convenience constructor keeping registration lists compact.
pub fn builder_entry(
    name: &str,
    action: &str,
    hypervisor: Option<&str>,
    template: &[&str],
    service: Option<&str>,
    func: BuilderFn,
) -> BuilderEntry {
    BuilderEntry {
        name: name.to_string(),
        action: action.to_string(),
        hypervisor: hypervisor.map(str::to_string),
        template: template.iter().map(|tag| tag.to_string()).collect(),
        service: service.map(str::to_string),
        func,
    }
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    entries: Vec<BuilderEntry>,
    overrides: BuilderOverrides,
}

impl Dispatcher {
    pub fn new(overrides: BuilderOverrides) -> Self {
        Self { entries: Vec::new(), overrides }
    }

    pub fn register(&mut self, entry: BuilderEntry) {
        self.entries.push(entry);
    }

    /// Resolve the callable for (object, action).
    ///
    /// Override first; otherwise the compatible entry with the highest
    /// specificity wins, ties going to the earliest registration. `None`
    /// means the step has no builder and is skipped.
    pub fn find(
        &self,
        object_id: &str,
        action: &str,
        hypervisor: Option<&str>,
        template: &BTreeSet<String>,
        service: Option<&str>,
    ) -> Option<&BuilderEntry> {
        if let Some(name) = self.overrides.lookup(object_id, action) {
            let found = self.entries.iter().find(|entry| entry.name == name);
            if found.is_none() {
                tracing::error!(object = object_id, action, callable = name, "override names an unknown builder");
            }
            return found;
        }

        let mut best: Option<(&BuilderEntry, usize)> = None;
        for entry in &self.entries {
            if !entry.compatible(action, hypervisor, template, service) {
                continue;
            }
            let score = entry.specificity(template);
            let beats = best.map(|(_, current)| score > current).unwrap_or(true);
            if beats {
                best = Some((entry, score));
            }
        }
        if best.is_none() {
            tracing::error!(object = object_id, action, "no builder found");
        }
        best.map(|(entry, _)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
