// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] trellis_config::ConfigError),

    #[error(transparent)]
    Graph(#[from] trellis_core::GraphError),

    #[error(transparent)]
    Xml(#[from] trellis_adapters::XmlError),

    #[error(transparent)]
    Collector(#[from] trellis_adapters::CollectorError),

    #[error(transparent)]
    Build(#[from] trellis_adapters::BuildError),

    #[error("io error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("planner failed: {0}")]
    Planner(String),

    #[error("another task is already running")]
    Busy,

    #[error("unknown collector type '{0}'")]
    UnknownCollector(String),
}
