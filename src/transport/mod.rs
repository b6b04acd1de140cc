/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::error::TransportError;
use async_lock::Mutex;
use async_trait::async_trait;
use log::{debug, trace};
use pretty_hex::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "serial")]
pub mod serial;
pub mod tcp;

/// Transport interface definition
///
/// Reads and writes go in independent directions: a read blocked waiting
/// for the peer must not hold up a concurrent write.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a link to the peer. Does nothing if already connected.
    async fn connect(&self, peer: &str) -> Result<(), TransportError>;
    /// Release the link. Idempotent. Interrupts in-flight reads and writes.
    async fn disconnect(&self);
    /// Write the whole buffer to the peer.
    async fn write_bytes(&self, buf: &[u8]) -> Result<(), TransportError>;
    /// Wait until exactly `n` bytes arrived, or fail.
    async fn read_exactly(&self, n: usize) -> Result<Vec<u8>, TransportError>;
    fn is_connected(&self) -> bool;
}

/// Opens a fresh byte stream to a peer. Each call yields a new handle;
/// handles are never reused across connect attempts.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    async fn open(&self, peer: &str) -> Result<Self::Stream, TransportError>;
}

/// [`Transport`] over any duplex byte stream a [`Connector`] produces.
pub struct StreamTransport<C: Connector> {
    connector: C,
    reader: Mutex<Option<ReadHalf<C::Stream>>>,
    writer: Mutex<Option<WriteHalf<C::Stream>>>,
    // Cancelled when the current link is released.
    link: std::sync::Mutex<CancellationToken>,
    connected: AtomicBool,
    connecting: Mutex<()>,
}

impl<C: Connector> StreamTransport<C> {
    pub fn new(connector: C) -> Self {
        let closed = CancellationToken::new();
        closed.cancel();
        Self {
            connector,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            link: std::sync::Mutex::new(closed),
            connected: AtomicBool::new(false),
            connecting: Mutex::new(()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn link_token(&self) -> CancellationToken {
        match self.link.lock() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace_link_token(&self, token: CancellationToken) -> CancellationToken {
        match self.link.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, token),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), token),
        }
    }

    /// Drop both halves of the current stream, if any.
    ///
    /// Caller holds `connecting`, so no new link shows up halfway through.
    async fn release(&self) {
        // Wakes up reads and writes parked on the halves.
        self.link_token().cancel();

        let mut writer = self.writer.lock().await;
        let mut reader = self.reader.lock().await;
        self.connected.store(false, Ordering::SeqCst);
        reader.take();
        if let Some(mut write_half) = writer.take() {
            // Best effort, the peer might be gone already.
            if let Err(e) = write_half.shutdown().await {
                trace!("Shutdown on release failed: {}", e);
            }
        }
    }

    fn mark_failed(&self, e: &TransportError) {
        debug!("Link failed: {}", e);
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl<C: Connector> Transport for StreamTransport<C> {
    async fn connect(&self, peer: &str) -> Result<(), TransportError> {
        let _guard = self.connecting.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        // Stale handle from a failed link goes first.
        self.release().await;

        let stream = self.connector.open(peer).await?;
        let (read_half, write_half) = tokio::io::split(stream);

        let mut writer = self.writer.lock().await;
        let mut reader = self.reader.lock().await;
        *reader = Some(read_half);
        *writer = Some(write_half);
        self.replace_link_token(CancellationToken::new());
        self.connected.store(true, Ordering::SeqCst);

        debug!("Link to {} is up", peer);
        Ok(())
    }

    async fn disconnect(&self) {
        let _guard = self.connecting.lock().await;
        if self.is_connected() {
            debug!("Releasing link");
        }
        self.release().await;
    }

    async fn write_bytes(&self, buf: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let closed = self.link_token();
        let writer = match guard.as_mut() {
            Some(w) => w,
            None => {
                self.mark_failed(&TransportError::NotConnected);
                return Err(TransportError::NotConnected);
            }
        };

        trace!("TX - {}", buf.hex_dump());
        let res = tokio::select! {
            _ = closed.cancelled() => Err(TransportError::Closed),
            res = async {
                writer.write_all(buf).await?;
                writer.flush().await
            } => res.map_err(TransportError::from),
        };

        if let Err(e) = &res {
            self.mark_failed(e);
        }
        res
    }

    async fn read_exactly(&self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut guard = self.reader.lock().await;
        let closed = self.link_token();
        let reader = match guard.as_mut() {
            Some(r) => r,
            None => {
                self.mark_failed(&TransportError::NotConnected);
                return Err(TransportError::NotConnected);
            }
        };

        let mut buf = vec![0u8; n];
        let res = tokio::select! {
            _ = closed.cancelled() => Err(TransportError::Closed),
            res = reader.read_exact(&mut buf) => res.map_err(TransportError::from),
        };

        match res {
            Ok(_) => {
                trace!("RX - {}", buf.hex_dump());
                Ok(buf)
            }
            Err(e) => {
                self.mark_failed(&e);
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
