/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Keeps the link to the peer up and pumps frames off it.
//!
//! ```text
//! Disconnected ──run()──> Connecting ──ok──> Connected
//!                              ^                 │ read failed
//!                              └───── Lost <─────┘
//! ```
//!
//! [`ConnectionSupervisor::run`] never gives up on its own. Transport
//! failures inside the loop become status notifications and a reconnect;
//! only [`ConnectionSupervisor::shutdown`] ends it. The one-shot
//! [`connect`](ConnectionSupervisor::connect) and
//! [`send`](ConnectionSupervisor::send) paths hand their errors to the caller
//! instead.

use crate::codec::{decode_one, encode_frame};
use crate::config::{LinkConfig, ReconnectBackoff};
use crate::error::{LinkError, TransportError};
use crate::sink::MessageSink;
use crate::state::ConnectionState;
use crate::transport::Transport;
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ConnectionSupervisor<T: Transport> {
    transport: T,
    config: LinkConfig,
    sink: Arc<dyn MessageSink>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    running: AtomicBool,
    // Keeps the watch value and sink notifications in the same order.
    notify: Mutex<()>,
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn new(transport: T, config: LinkConfig, sink: Arc<dyn MessageSink>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            config,
            sink,
            state,
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
            notify: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes from another task.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn peer(&self) -> &str {
        &self.config.peer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Ask [`run`](Self::run) to stop. Interrupts a blocked connect or read.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run the supervisor loop on a background task.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()>
    where
        T: 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }

    /// Connect, receive, and reconnect until shut down.
    ///
    /// Releases the transport and publishes `Disconnected` before returning.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Supervisor for {} is already running", self.config.peer);
            return;
        }
        info!("Supervising link to {}", self.config.peer);

        let mut backoff = ReconnectBackoff::new(self.config.backoff.clone());
        while self.establish(&mut backoff).await {
            let cause = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                cause = self.receive_loop() => cause,
            };

            warn!("Lost link to {}: {}", self.config.peer, cause);
            self.set_state(ConnectionState::Lost, &cause.to_string());
            self.transport.disconnect().await;
        }

        self.transport.disconnect().await;
        self.running.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected, "Stopped");
        info!("Supervisor for {} stopped", self.config.peer);
    }

    /// Single connect attempt.
    ///
    /// Does not stop a running loop from retrying if this fails.
    pub async fn connect(&self) -> Result<(), LinkError> {
        self.connect_once().await.map_err(LinkError::from)
    }

    /// Frame and write one message, connecting first if the link is down.
    pub async fn send(&self, payload: &[u8]) -> Result<(), LinkError> {
        // Oversized payloads are rejected before touching the link.
        let frame = encode_frame(payload)?;

        if !self.transport.is_connected() {
            debug!("Link down, connecting before send");
            self.connect_once()
                .await
                .map_err(|cause| LinkError::SendFailed { cause })?;
        }

        self.transport.write_bytes(&frame).await.map_err(|cause| {
            warn!("Send to {} failed: {}", self.config.peer, cause);
            LinkError::SendFailed { cause }
        })
    }

    pub async fn send_text(&self, text: &str) -> Result<(), LinkError> {
        self.send(text.as_bytes()).await
    }

    /// Close the link. Safe to call any number of times.
    ///
    /// Only an established link moves the state to `Disconnected`. A running
    /// loop sees the link drop and reconnects.
    pub async fn disconnect(&self) {
        if self.transport.is_connected() || self.state() == ConnectionState::Connected {
            self.set_state(ConnectionState::Disconnected, "Disconnected");
        }
        self.transport.disconnect().await;
    }

    async fn connect_once(&self) -> Result<(), TransportError> {
        if self.transport.is_connected() {
            self.set_state(ConnectionState::Connected, "Connected");
            return Ok(());
        }

        self.set_state(
            ConnectionState::Connecting,
            &format!("Connecting to {}", self.config.peer),
        );
        match self.try_connect().await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected, "Connected");
                Ok(())
            }
            Err(e) => {
                // A running loop owns the Connecting state and keeps at it.
                if !self.running.load(Ordering::SeqCst) {
                    self.set_state(ConnectionState::Disconnected, "Not Connected");
                }
                Err(e)
            }
        }
    }

    /// Retry connecting until it works. False on shutdown.
    async fn establish(&self, backoff: &mut ReconnectBackoff) -> bool {
        if self.transport.is_connected() {
            self.set_state(ConnectionState::Connected, "Connected");
            return true;
        }

        self.set_state(
            ConnectionState::Connecting,
            &format!("Connecting to {}", self.config.peer),
        );
        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                res = self.try_connect() => res,
            };

            match attempt {
                Ok(()) => {
                    backoff.reset();
                    self.set_state(ConnectionState::Connected, "Connected");
                    return true;
                }
                Err(e) => debug!("Connect attempt failed: {}", e),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = backoff.wait() => {}
            }
        }
    }

    async fn try_connect(&self) -> Result<(), TransportError> {
        let attempt = self.transport.connect(&self.config.peer);
        match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => attempt.await,
        }
    }

    /// Deliver frames in arrival order until the transport fails.
    async fn receive_loop(&self) -> TransportError {
        loop {
            match decode_one(&self.transport).await {
                Ok(payload) => {
                    debug!("Received {} byte message", payload.len());
                    self.sink.on_message_received(&payload);
                }
                Err(e) => return e,
            }
        }
    }

    fn set_state(&self, state: ConnectionState, detail: &str) {
        let _order = match self.notify.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let prev = self.state.send_replace(state);
        if prev == state {
            trace!("Already {}", state);
            return;
        }

        info!("Link {} -> {}: {}", prev, state, detail);
        self.sink.on_status_changed(state, detail);
    }
}
