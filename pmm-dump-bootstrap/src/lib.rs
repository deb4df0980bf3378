// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Module
//!
//! Sits outside the domain/application/infrastructure layers and owns
//! everything a process needs before its first meaningful line of business
//! logic runs:
//!
//! - **Entry point** - CLI parsing and validation
//! - **Logging** - `tracing` subscriber installation
//! - **Signal handling** - graceful shutdown on SIGINT/SIGTERM
//! - **Platform probes** - CPU count, total RAM
//! - **Exit codes** - mapping a top-level `anyhow::Result` to a process exit
//!   status
//!
//! Enterprise layers (`pmm-dump-domain`, `pmm-dump`) never depend back on
//! this crate.

pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod platform;
pub mod shutdown;

pub use cli::{parse_and_validate, ValidatedCli, ValidatedCommand};
pub use exit_code::result_to_exit_code;
pub use platform::{create_platform, Platform, PlatformError};
pub use shutdown::ShutdownCoordinator;

/// Parses and validates CLI arguments. Clap handles `--help`/`--version`
/// and exits the process on its own before this ever returns.
pub fn bootstrap_cli() -> Result<ValidatedCli, cli::ParseError> {
    cli::parse_and_validate()
}
