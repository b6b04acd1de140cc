/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Framed message link to a microcontroller behind a serial-over-radio
//! (RFCOMM) port.
//!
//! [`ConnectionSupervisor`] keeps the link up and hands every received
//! message to a [`MessageSink`]. Messages travel as one header byte
//! (`0x80 | len`) followed by up to 127 payload bytes, see [`codec`].

pub mod codec;
pub mod config;
pub mod consts;
pub mod error;
pub mod sink;
pub mod state;
pub mod supervisor;
pub mod transport;

pub use codec::{decode_one, encode_frame, FrameCodec};
pub use config::{BackoffConfig, LinkConfig, ReconnectBackoff};
pub use error::{LinkError, TransportError};
pub use sink::{ChannelSink, LogSink, MessageSink};
pub use state::{ConnectionState, LinkEvent};
pub use supervisor::ConnectionSupervisor;
#[cfg(feature = "serial")]
pub use transport::serial::{SerialConnector, SerialTransport};
pub use transport::tcp::{TcpConnector, TcpTransport};
pub use transport::{Connector, StreamTransport, Transport};
