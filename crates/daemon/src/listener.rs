// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket command listener.

use crate::manager::EnvironmentManager;
use crate::protocol::{read_message, write_message, ProtocolError, Request, Response};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

/// Accept connections until a shutdown request or cancellation arrives.
pub async fn serve(
    listener: UnixListener,
    manager: Arc<EnvironmentManager>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let manager = Arc::clone(&manager);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(error) = handle_connection(stream, manager, shutdown).await {
                            match error {
                                ProtocolError::Closed => {}
                                error => tracing::warn!(%error, "connection ended with error"),
                            }
                        }
                    });
                }
                Err(error) => {
                    tracing::error!(%error, "accept failed");
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    manager: Arc<EnvironmentManager>,
    shutdown: CancellationToken,
) -> Result<(), ProtocolError> {
    loop {
        let request: Request = read_message(&mut stream).await?;
        let stop = matches!(request, Request::Shutdown);
        let response = manager.handle(request).await;
        write_message(&mut stream, &response).await?;
        if stop {
            tracing::info!("shutdown requested");
            shutdown.cancel();
            return Ok(());
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
