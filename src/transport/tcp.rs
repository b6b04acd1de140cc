/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Serial line tunnelled over TCP, `host:port` (ser2net and friends).

use super::{Connector, StreamTransport};
use crate::error::TransportError;
use async_trait::async_trait;
use log::debug;
use tokio::net::TcpStream;

#[derive(Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn open(&self, peer: &str) -> Result<TcpStream, TransportError> {
        debug!("Dialing {}", peer);
        let stream = TcpStream::connect(peer)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        // Frames are tiny, don't let Nagle sit on them.
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(stream)
    }
}

pub type TcpTransport = StreamTransport<TcpConnector>;

impl TcpTransport {
    pub fn tcp() -> Self {
        StreamTransport::new(TcpConnector)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::Transport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn talks_to_a_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let transport = TcpTransport::tcp();
        let (connected, accepted) = tokio::join!(transport.connect(&addr), listener.accept());
        connected.unwrap();
        let (mut peer, _) = accepted.unwrap();

        transport.write_bytes(&[0x81, b'!']).await.unwrap();
        let mut got = [0u8; 2];
        peer.read_exact(&mut got).await.unwrap();
        assert_eq!(got, [0x81, b'!']);

        peer.write_all(&[0x80]).await.unwrap();
        assert_eq!(transport.read_exactly(1).await.unwrap(), vec![0x80]);
    }

    #[tokio::test]
    async fn refused_connect_is_connect_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let transport = TcpTransport::tcp();
        let res = transport.connect(&addr).await;
        assert!(matches!(res, Err(TransportError::ConnectFailed { .. })));
    }
}
