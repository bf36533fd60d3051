// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Goal-configuration XML: reading it into a graph and exporting a graph
//! back out.
//!
//! The document shape is `<config name>` with `<locations>`,
//! `<layer2networks>`, `<layer3networks>` and `<hosts>` sections; hosts nest
//! interfaces, addresses, services, routes, disks and firewall state.

mod read;
mod write;

pub use read::{config_name, load_goal};
pub use write::write_topology;

use crate::{Collector, CollectorError, ScanContext};
use async_trait::async_trait;

/// Collector that loads a static goal configuration from an XML file.
///
/// Everything it reads is verified forever; elements that disappear from
/// the file between scans lose this collector's verification instead.
pub struct XmlCollector;

#[async_trait]
impl Collector for XmlCollector {
    async fn scan(&self, ctx: ScanContext) -> Result<(), CollectorError> {
        let path = std::path::PathBuf::from(ctx.config_str("file")?);
        tracing::info!(file = %path.display(), source = %ctx.name, "reading goal configuration");
        let xml = std::fs::read_to_string(&path)
            .map_err(|source| CollectorError::Io { path, source })?;

        let read = load_goal(&ctx.graph, &xml, &ctx.name, &ctx.locations)?;

        // Withdraw this source from everything the file no longer mentions.
        for node in ctx.graph.all_nodes() {
            if !read.contains(&node) {
                ctx.graph.remove_verification(node, &ctx.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "xml_tests.rs"]
mod tests;
