// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `trellis` — thin client for the trellisd command socket.

mod client;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trellis_daemon::Request;

const DEFAULT_SOCKET: &str = "/run/trellis/trellisd.sock";

#[derive(Parser)]
#[command(name = "trellis", about = "Client for the trellis reconciliation daemon")]
struct Cli {
    /// Path of the daemon's command socket
    #[arg(long, default_value = DEFAULT_SOCKET)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the daemon answers
    Ping,
    /// Upload a goal configuration file into an environment
    Upload {
        environment: String,
        /// Local file to upload
        file: PathBuf,
        /// Name to store the file under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// List the files of an environment
    Files { environment: String },
    /// Print a file of an environment
    Get { environment: String, name: String },
    /// Deploy a previously uploaded configuration
    Apply { environment: String, name: String },
    /// Export the collected topology of an environment as XML
    Export { environment: String, name: String },
    /// List all environments
    Environments,
    /// Show the deployment progress of an environment
    Progress { environment: String },
    /// Run every collector of an environment once
    FullScan { environment: String },
    /// List the daemon's commands
    Commands,
    /// Stop the daemon
    Shutdown,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let request = match cli.command {
        Command::Ping => Request::Ping,
        Command::Upload { environment, file, name } => {
            let data = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .context("file has no name")?,
            };
            Request::UploadConfiguration { environment, name, data }
        }
        Command::Files { environment } => Request::ListFiles { environment },
        Command::Get { environment, name } => Request::GetFile { environment, name },
        Command::Apply { environment, name } => Request::ApplyConfiguration { environment, name },
        Command::Export { environment, name } => {
            Request::ExportEnvironmentToXml { environment, name }
        }
        Command::Environments => Request::GetEnvironments,
        Command::Progress { environment } => Request::GetSetupProgress { environment },
        Command::FullScan { environment } => Request::DoFullScan { environment },
        Command::Commands => Request::GetCommands,
        Command::Shutdown => Request::Shutdown,
    };

    let response = client::send(&cli.socket, &request).await?;
    println!("{}", output::render(&response));
    Ok(())
}
