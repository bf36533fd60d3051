// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Collector failures are logged at the scheduler boundary; the periodic
/// schedule continues regardless.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("missing key '{0}' in module configuration")]
    MissingConfig(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Graph(#[from] trellis_core::GraphError),

    #[error("scan aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Remote(String),
}

/// Builder failures are logged by the plan executor; the plan continues.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("plan step expects {expected} argument(s), got {got}")]
    BadArity { expected: usize, got: usize },

    #[error("object is not a {0}")]
    WrongKind(&'static str),

    #[error(transparent)]
    Graph(#[from] trellis_core::GraphError),

    #[error("{0}")]
    Adapter(String),
}

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(#[from] roxmltree::Error),

    #[error("cannot serialize XML: {0}")]
    Serialize(#[from] quick_xml::Error),

    #[error("missing attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("bad value for attribute '{attribute}' on <{element}>: {value}")]
    BadAttribute { element: String, attribute: String, value: String },

    #[error("document root is not <config>")]
    NotAConfig,

    #[error(transparent)]
    Graph(#[from] trellis_core::GraphError),
}
