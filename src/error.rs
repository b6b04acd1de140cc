/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use thiserror::Error;

/// Failures at the byte stream boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Failed to connect to {peer}: {reason}")]
    ConnectFailed { peer: String, reason: String },
    #[error("Transport is not connected.")]
    NotConnected,
    #[error("Connection closed.")]
    Closed,
    #[error("Timed out.")]
    Timeout,
    #[error("Failed to do I/O: {0}")]
    Io(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum LinkError {
    #[error("Payload too large to fit in one frame: {0} bytes")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Send failed: {cause}")]
    SendFailed { cause: TransportError },
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Transport(TransportError::from(e))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => TransportError::Closed,
            std::io::ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Io(e.to_string()),
        }
    }
}
