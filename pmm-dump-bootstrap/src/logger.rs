// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Bootstrap-phase logging abstraction. A `BootstrapLogger` trait keeps
//! bootstrap code testable without a
//! live `tracing` subscriber, while the production implementation installs
//! a real `tracing-subscriber` pipeline.

use tracing_subscriber::EnvFilter;

pub trait BootstrapLogger: Send + Sync {
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn debug(&self, message: &str);
}

#[derive(Default)]
pub struct ConsoleLogger;

impl ConsoleLogger {
    pub fn new() -> Self {
        Self
    }
}

impl BootstrapLogger for ConsoleLogger {
    fn error(&self, message: &str) {
        tracing::error!(target: "bootstrap", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "bootstrap", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "bootstrap", "{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "bootstrap", "{message}");
    }
}

#[derive(Default)]
pub struct NoOpLogger;

impl NoOpLogger {
    pub fn new() -> Self {
        Self
    }
}

impl BootstrapLogger for NoOpLogger {
    fn error(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn debug(&self, _message: &str) {}
}

/// Installs the process-wide `tracing` subscriber. `verbose` raises the
/// default filter from `info` to `debug`; `--just-key` callers should skip
/// this entirely so stdout carries nothing but the derived key.
///
/// Honors `RUST_LOG` when set, the way `EnvFilter::from_default_env` does -
/// `--verbose` only changes the *default* that env var falls back to.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_logger_never_panics() {
        let logger = NoOpLogger::new();
        logger.error("e");
        logger.warn("w");
        logger.info("i");
        logger.debug("d");
    }
}
