// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `trellisd` — the reconciliation daemon.
//!
//! Exit codes: 0 on a clean shutdown, 1 on configuration or socket failure.

use fs2::FileExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use trellis_adapters::CollectorRegistry;
use trellis_config::{DaemonConfig, LocationsRegistry};
use trellis_core::SystemClock;
use trellis_daemon::{listener, logging, EnvironmentManager};
use trellis_engine::ExporterRegistry;

const DEFAULT_CONFIG: &str = "/etc/trellis/trellisd.toml";

fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = match DaemonConfig::load(&config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("unable to parse config file {}: {error}", config_path.display());
            return ExitCode::from(1);
        }
    };

    let _log_guard = logging::init(&config.log_level, config.log_dir.as_deref());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "cannot start runtime");
            return ExitCode::from(1);
        }
    };
    runtime.block_on(run(config))
}

async fn run(config: DaemonConfig) -> ExitCode {
    // A second daemon on the same socket would fight over environments.
    let lock_path = config.socket.with_extension("lock");
    let lock_file = match std::fs::File::create(&lock_path) {
        Ok(file) => file,
        Err(error) => {
            tracing::error!(%error, path = %lock_path.display(), "cannot create lock file");
            return ExitCode::from(1);
        }
    };
    if lock_file.try_lock_exclusive().is_err() {
        tracing::error!(path = %lock_path.display(), "another daemon instance is running");
        return ExitCode::from(1);
    }

    let locations = match &config.locations {
        Some(path) => match LocationsRegistry::load(path) {
            Ok(registry) => Arc::new(registry),
            Err(error) => {
                tracing::error!(%error, "cannot load locations registry");
                return ExitCode::from(1);
            }
        },
        None => Arc::new(LocationsRegistry::default()),
    };

    let manager = Arc::new(EnvironmentManager::new(
        &config,
        locations,
        &CollectorRegistry::builtin(),
        &ExporterRegistry::builtin(),
        // Hypervisor adapter crates hook their builders in here.
        |_dispatcher| {},
        Arc::new(SystemClock),
    ));
    manager.start_all();

    let _ = std::fs::remove_file(&config.socket);
    let socket = match UnixListener::bind(&config.socket) {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(%error, socket = %config.socket.display(), "cannot open command socket");
            return ExitCode::from(1);
        }
    };
    tracing::info!(socket = %config.socket.display(), "trellis started");

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(listener::serve(socket, Arc::clone(&manager), shutdown.clone()));

    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = sigterm() => {
            tracing::info!("received termination signal, stopping all environments");
            shutdown.cancel();
        }
    }

    manager.shutdown().await;
    let _ = server.await;
    let _ = std::fs::remove_file(&config.socket);
    let _ = std::fs::remove_file(&lock_path);
    ExitCode::SUCCESS
}

async fn sigterm() {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(error) => {
            tracing::error!(%error, "cannot install SIGTERM handler");
            std::future::pending::<()>().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
