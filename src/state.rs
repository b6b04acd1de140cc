/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

/// Link lifecycle as seen by the host.
///
/// The supervisor cycles `Connecting -> Connected -> Lost -> Connecting`
/// for as long as it runs. `Disconnected` is where it starts, and where it
/// ends up after an explicit disconnect or shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Lost,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// Everything a [`crate::sink::MessageSink`] gets told, as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Status {
        state: ConnectionState,
        detail: String,
    },
    Message(Vec<u8>),
}
