// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Graceful shutdown coordination for SIGINT/SIGTERM (:
//! readers/writer must stop dispatching new chunks and let in-flight ones
//! drain before exit). Built on the real `tokio_util::sync::CancellationToken`
//! rather than a hand-rolled one - every worker task across the transfer
//! engine clones the same token and `select!`s on `cancelled()`.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace_period,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn initiate_shutdown(&self) {
        if !self.token.is_cancelled() {
            tracing::info!(grace_period = ?self.grace_period, "initiating graceful shutdown");
            self.token.cancel();
        }
    }

    /// Races `worker_drain` against the grace period. Returns `true` if the
    /// workers drained in time, `false` if the grace period expired first.
    pub async fn wait_for_drain<F>(&self, worker_drain: F) -> bool
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = worker_drain => {
                tracing::info!("transfer drained cleanly");
                true
            }
            _ = tokio::time::sleep(self.grace_period) => {
                tracing::warn!("grace period expired before drain completed");
                false
            }
        }
    }

    /// Spawns the signal listener (SIGINT plus SIGTERM on unix) that calls
    /// [`Self::initiate_shutdown`] on first receipt.
    pub fn spawn_signal_listener(&self) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            coordinator.initiate_shutdown();
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initiate_shutdown_cancels_every_cloned_token() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let token = coordinator.token();
        assert!(!token.is_cancelled());
        coordinator.initiate_shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn wait_for_drain_times_out_if_worker_never_finishes() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(20));
        let drained = coordinator.wait_for_drain(std::future::pending::<()>()).await;
        assert!(!drained);
    }

    #[tokio::test]
    async fn wait_for_drain_succeeds_when_worker_finishes_first() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let drained = coordinator.wait_for_drain(async {}).await;
        assert!(drained);
    }
}
