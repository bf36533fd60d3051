// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Per-command metadata returned by `GetCommands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub min_args: usize,
    pub max_args: usize,
    pub doc: String,
}

/// Reply from the daemon. User-visible failures are string messages, never
/// protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Message { text: String },
    Commands { commands: IndexMap<String, CommandInfo> },
}

impl Response {
    pub fn message(text: impl Into<String>) -> Self {
        Response::Message { text: text.into() }
    }
}
