/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::consts::DEFAULT_PEER;
use std::time::Duration;

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Peer identifier handed to the transport on every connect.
    pub peer: String,
    /// Upper bound for a single connect attempt. `None` waits as long as
    /// the transport does.
    pub connect_timeout: Option<Duration>,
    pub backoff: BackoffConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            peer: DEFAULT_PEER.to_string(),
            connect_timeout: None,
            backoff: BackoffConfig::default(),
        }
    }
}

impl LinkConfig {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Delay between failed connect attempts. Retries never stop; this only
/// keeps an unreachable peer from pinning a core.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl BackoffConfig {
    /// Retry back to back, only yielding to the scheduler in between.
    pub fn immediate() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            multiplier: 1,
        }
    }
}

/// Exponential backoff state, reset once a connect goes through.
#[derive(Debug)]
pub struct ReconnectBackoff {
    config: BackoffConfig,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial;
        Self { config, current }
    }

    /// Delay to wait before the next attempt. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.config.max);
        self.current = self
            .current
            .saturating_mul(self.config.multiplier.max(1))
            .min(self.config.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial;
    }

    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}
