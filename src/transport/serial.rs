/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! RFCOMM links exposed by the OS as a serial port
//! (`/dev/rfcommN` after `rfcomm bind`, an outgoing `COMn` on Windows).

use super::{Connector, StreamTransport};
use crate::consts::DEFAULT_BAUD;
use crate::error::TransportError;
use async_trait::async_trait;
use log::debug;
use tokio_serial::{self, SerialPortBuilderExt, SerialStream};

pub struct SerialConnector {
    baud: u32,
}

impl SerialConnector {
    pub fn new(baud: u32) -> Self {
        Self { baud }
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD)
    }
}

#[async_trait]
impl Connector for SerialConnector {
    type Stream = SerialStream;

    async fn open(&self, peer: &str) -> Result<SerialStream, TransportError> {
        debug!("Opening {} at {} baud", peer, self.baud);
        tokio_serial::new(peer, self.baud)
            .open_native_async()
            .map_err(|e| TransportError::ConnectFailed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })
    }
}

pub type SerialTransport = StreamTransport<SerialConnector>;

impl SerialTransport {
    pub fn serial(baud: u32) -> Self {
        StreamTransport::new(SerialConnector::new(baud))
    }
}
