// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command protocol.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

mod request;
mod response;
mod wire;

pub use request::Request;
pub use response::{CommandInfo, Response};
pub use wire::{read_message, write_message, ProtocolError};

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
