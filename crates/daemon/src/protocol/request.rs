// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Request from a client to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Store a goal configuration file in an environment's data directory
    UploadConfiguration { environment: String, name: String, data: String },

    /// List the files in an environment's data directory
    ListFiles { environment: String },

    /// Read a file from an environment's data directory
    GetFile { environment: String, name: String },

    /// Deploy a previously uploaded configuration
    ApplyConfiguration { environment: String, name: String },

    /// Export the collected topology of an environment as XML
    ExportEnvironmentToXml { environment: String, name: String },

    /// List all environments
    GetEnvironments,

    /// Current deployment progress of an environment
    GetSetupProgress { environment: String },

    /// Run every collector of an environment once, ahead of periodic work
    DoFullScan { environment: String },

    /// Describe every available command
    GetCommands,

    /// Stop the daemon
    Shutdown,
}
