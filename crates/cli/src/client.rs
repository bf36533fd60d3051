// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot request/response exchange with the daemon.

use anyhow::Context;
use std::path::Path;
use tokio::net::UnixStream;
use trellis_daemon::{read_message, write_message, Request, Response};

pub async fn send(socket: &Path, request: &Request) -> anyhow::Result<Response> {
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("cannot connect to daemon at {}", socket.display()))?;
    write_message(&mut stream, request).await.context("cannot send request")?;
    read_message(&mut stream).await.context("cannot read reply")
}
