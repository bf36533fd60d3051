// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collector interface and the registry resolving configured type names.

use crate::{CollectorError, XmlCollector};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trellis_config::LocationsRegistry;
use trellis_core::Graph;

/// Everything a collector invocation receives from the scheduler.
#[derive(Clone)]
pub struct ScanContext {
    pub graph: Arc<Graph>,
    /// Module instance name; doubles as the verification source name.
    pub name: String,
    /// Verification TTL for this module, derived from its interval.
    pub ttl: trellis_core::Ttl,
    /// Module-specific connection settings.
    pub config: toml::Table,
    pub locations: Arc<LocationsRegistry>,
    /// Workers check this between long operations and in loop bodies.
    pub stop: CancellationToken,
}

impl ScanContext {
    pub fn config_str(&self, key: &str) -> Result<&str, CollectorError> {
        self.config
            .get(key)
            .and_then(|value| value.as_str())
            .ok_or_else(|| CollectorError::MissingConfig(key.to_string()))
    }
}

/// A module that observes the environment and verifies graph state.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn scan(&self, ctx: ScanContext) -> Result<(), CollectorError>;
}

type CollectorFactory = Arc<dyn Fn() -> Arc<dyn Collector> + Send + Sync>;

/// Explicit registration list keyed by the `type` field of module configs.
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    factories: IndexMap<String, CollectorFactory>,
}

impl CollectorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The registry every environment starts from.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register("xml", || Arc::new(XmlCollector));
        registry
    }

    pub fn register<F, C>(&mut self, kind: &str, factory: F)
    where
        F: Fn() -> Arc<C> + Send + Sync + 'static,
        C: Collector + 'static,
    {
        let factory = move || -> Arc<dyn Collector> { factory() };
        self.factories.insert(kind.to_string(), Arc::new(factory));
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn Collector>> {
        self.factories.get(kind).map(|factory| factory())
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry").field("kinds", &self.kinds()).finish()
    }
}
