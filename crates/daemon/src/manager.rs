// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment roster and command handling.
//!
//! One [`Environment`] runtime per configured environment. An environment
//! whose configuration is broken is logged at startup and never reaches
//! running state; the rest are unaffected. Every command reply is a string
//! a human can read.

use crate::protocol::{CommandInfo, Request, Response};
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use trellis_adapters::CollectorRegistry;
use trellis_config::{BuilderOverrides, DaemonConfig, LocationsRegistry};
use trellis_core::Clock;
use trellis_engine::{Dispatcher, Environment, ExporterRegistry};

/// Per-environment dispatcher override file, next to `environment.toml`.
const OVERRIDES_FILE: &str = "builder.toml";

pub struct EnvironmentManager {
    environments: IndexMap<String, Environment>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl EnvironmentManager {
    /// Construct every configured environment. Builder registration is the
    /// caller's concern: hypervisor adapter crates contribute their entries
    /// through `register_builders`.
    pub fn new(
        config: &DaemonConfig,
        locations: Arc<LocationsRegistry>,
        collectors: &CollectorRegistry,
        exporters: &ExporterRegistry,
        register_builders: impl Fn(&mut Dispatcher),
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut environments = IndexMap::new();
        for (name, entry) in &config.environments {
            match Self::build_environment(
                name,
                &entry.path,
                Arc::clone(&locations),
                collectors,
                exporters,
                &register_builders,
                Arc::clone(&clock),
            ) {
                Ok(environment) => {
                    environments.insert(name.clone(), environment);
                }
                Err(error) => {
                    tracing::error!(environment = %name, %error, "not able to start environment");
                }
            }
        }
        Self { environments, tasks: parking_lot::Mutex::new(Vec::new()) }
    }

    fn build_environment(
        name: &str,
        dir: &Path,
        locations: Arc<LocationsRegistry>,
        collectors: &CollectorRegistry,
        exporters: &ExporterRegistry,
        register_builders: &impl Fn(&mut Dispatcher),
        clock: Arc<dyn Clock>,
    ) -> Result<Environment, trellis_engine::RuntimeError> {
        let overrides = BuilderOverrides::load_or_default(&dir.join(OVERRIDES_FILE))?;
        let mut dispatcher = Dispatcher::new(overrides);
        register_builders(&mut dispatcher);
        Environment::new(
            name,
            dir,
            locations,
            collectors.clone(),
            exporters.clone(),
            dispatcher,
            clock,
        )
    }

    /// Start the scheduling loop of every environment.
    pub fn start_all(&self) {
        let mut tasks = self.tasks.lock();
        for (name, environment) in &self.environments {
            tracing::info!(environment = %name, "starting environment");
            tasks.push(environment.start());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Environment> {
        self.environments.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.environments.keys().map(String::as_str).collect()
    }

    /// Handle one command. The reply is always presentable to a user.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::message("pong"),

            Request::UploadConfiguration { environment, name, data } => {
                self.with_environment(&environment, |env| match env.upload_configuration(&name, &data) {
                    Ok(()) => Response::message(format!("Successfully uploaded configuration '{name}'.")),
                    Err(error) => Response::message(error.to_string()),
                })
            }

            Request::ListFiles { environment } => {
                self.with_environment(&environment, |env| match env.list_files() {
                    Ok(files) => Response::message(format!(
                        "-------------------- Found {} file(s) --------------------\n{}",
                        files.len(),
                        files.join("\n")
                    )),
                    Err(error) => Response::message(error.to_string()),
                })
            }

            Request::GetFile { environment, name } => {
                self.with_environment(&environment, |env| match env.read_file(&name) {
                    Ok(content) => Response::message(format!(
                        "-------------------- Found file '{name}' --------------------\n{content}"
                    )),
                    Err(error) => Response::message(error.to_string()),
                })
            }

            Request::ApplyConfiguration { environment, name } => match self.environments.get(&environment) {
                Some(env) => match env.apply_config(&name).await {
                    Ok(reply) => Response::message(reply),
                    Err(error) => Response::message(error.to_string()),
                },
                None => Self::unknown(&environment),
            },

            Request::ExportEnvironmentToXml { environment, name } => {
                self.with_environment(&environment, |env| match env.export_xml(&name) {
                    Ok(()) => Response::message(format!("Saved exported information as '{name}'")),
                    Err(error) => Response::message(error.to_string()),
                })
            }

            Request::GetEnvironments => {
                Response::message(self.names().join("\n"))
            }

            Request::GetSetupProgress { environment } => {
                self.with_environment(&environment, |env| {
                    Response::message(format!(
                        "Process of '{environment}': {}",
                        env.setup_progress()
                    ))
                })
            }

            Request::DoFullScan { environment } => {
                self.with_environment(&environment, |env| {
                    env.do_full_scan();
                    Response::message(format!("Full scan scheduled for '{environment}'."))
                })
            }

            Request::GetCommands => Response::Commands { commands: Self::commands() },

            Request::Shutdown => Response::message("shutting down"),
        }
    }

    fn with_environment(&self, name: &str, action: impl FnOnce(&Environment) -> Response) -> Response {
        match self.environments.get(name) {
            Some(environment) => action(environment),
            None => Self::unknown(name),
        }
    }

    fn unknown(name: &str) -> Response {
        Response::message(format!("Environment '{name}' unknown."))
    }

    /// Command metadata: (min args, max args, doc string) per command.
    pub fn commands() -> IndexMap<String, CommandInfo> {
        let table: [(&str, usize, usize, &str); 9] = [
            ("uploadConfiguration", 3, 3, "Upload a new configuration file."),
            ("listFiles", 1, 1, "Get a list of all files associated with an environment."),
            ("getFile", 2, 2, "Read the content of a file of an environment."),
            ("applyConfiguration", 2, 2, "Apply a previously uploaded configuration."),
            (
                "exportEnvironmentToXml",
                2,
                2,
                "Export the information collected about an environment as XML.",
            ),
            ("getEnvironments", 0, 0, "Retrieve a list of all environments."),
            ("getSetupProgress", 1, 1, "Get the current setup progress of an environment."),
            ("doFullScan", 1, 1, "Run every collector of an environment once."),
            ("getCommands", 0, 0, "Retrieve all publicly available commands."),
        ];
        table
            .into_iter()
            .map(|(name, min_args, max_args, doc)| {
                (name.to_string(), CommandInfo { min_args, max_args, doc: doc.to_string() })
            })
            .collect()
    }

    /// Stop every environment and join their loops.
    pub async fn shutdown(&self) {
        for (name, environment) in &self.environments {
            tracing::info!(environment = %name, "stopping environment");
            environment.shutdown().await;
        }
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
