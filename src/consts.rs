/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Bit 7 of the frame header. Always set by the sender, so any byte
/// without it can never start a frame.
pub const HEADER_FLAG: u8 = 0x80;
/// Bits 0-6 of the frame header carry the payload length.
pub const LENGTH_MASK: u8 = 0x7f;
/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LENGTH: usize = LENGTH_MASK as usize;
/// Default baud rate of the RFCOMM serial port profile modules the peer
/// firmware ships with (HC-05 factory setting).
pub const DEFAULT_BAUD: u32 = 9600;
/// Linux binds a paired RFCOMM channel to this tty by default.
pub const DEFAULT_PEER: &str = "/dev/rfcomm0";
/// Header hunting yields to the scheduler after this many skipped bytes.
pub const RESYNC_YIELD_INTERVAL: usize = 64;
