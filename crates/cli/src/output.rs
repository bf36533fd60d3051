// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response rendering.

use trellis_daemon::Response;

pub fn render(response: &Response) -> String {
    match response {
        Response::Message { text } => text.clone(),
        Response::Commands { commands } => {
            let mut lines = Vec::with_capacity(commands.len());
            for (name, info) in commands {
                let args = if info.min_args == info.max_args {
                    format!("{} arg(s)", info.min_args)
                } else {
                    format!("{}-{} arg(s)", info.min_args, info.max_args)
                };
                lines.push(format!("{name:<26} {args:<12} {}", info.doc));
            }
            lines.join("\n")
        }
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
