/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::state::{ConnectionState, LinkEvent};
use log::{info, trace};
use pretty_hex::*;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Receiver of decoded messages and status changes.
///
/// Called from the supervisor's task. Implementations must return quickly
/// and never block on the link.
pub trait MessageSink: Send + Sync {
    fn on_status_changed(&self, state: ConnectionState, detail: &str);
    fn on_message_received(&self, payload: &[u8]);
}

/// Forwards every notification into an async stream of [`LinkEvent`]s.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiverStream<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }

    fn forward(&self, event: LinkEvent) {
        // Receiver gone means nobody is listening any more.
        if self.tx.send(event).is_err() {
            trace!("Event dropped, receiver closed");
        }
    }
}

impl MessageSink for ChannelSink {
    fn on_status_changed(&self, state: ConnectionState, detail: &str) {
        self.forward(LinkEvent::Status {
            state,
            detail: detail.to_string(),
        });
    }

    fn on_message_received(&self, payload: &[u8]) {
        self.forward(LinkEvent::Message(payload.to_vec()));
    }
}

/// Writes everything to the log.
#[derive(Default)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn on_status_changed(&self, state: ConnectionState, detail: &str) {
        info!("Link {}: {}", state, detail);
    }

    fn on_message_received(&self, payload: &[u8]) {
        info!("Message: {}", String::from_utf8_lossy(payload));
        trace!("{}", payload.hex_dump());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn channel_sink_keeps_order() {
        let (sink, events) = ChannelSink::new();
        sink.on_status_changed(ConnectionState::Connected, "Connected");
        sink.on_message_received(b"one");
        sink.on_message_received(b"two");
        drop(sink);

        let got: Vec<LinkEvent> = events.collect().await;
        assert_eq!(
            got,
            vec![
                LinkEvent::Status {
                    state: ConnectionState::Connected,
                    detail: "Connected".to_string()
                },
                LinkEvent::Message(b"one".to_vec()),
                LinkEvent::Message(b"two".to_vec()),
            ]
        );
    }

    #[test]
    fn channel_sink_survives_closed_receiver() {
        let (sink, events) = ChannelSink::new();
        drop(events);
        sink.on_message_received(b"nobody home");
    }
}
