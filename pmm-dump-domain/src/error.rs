// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Error kinds shared across every layer, grouped by the propagation policy
//! they carry : validation errors are fatal before
//! any I/O happens, transient network errors are retried below this type and
//! only surface here once retries are exhausted, load-shedding/critical are
//! fatal-with-explanation, server limits are recoverable by the adapter that
//! raised them (they only reach here if recovery bottoms out), and corrupt
//! archives/encryption failures are always fatal.

use thiserror::Error;

/// The single error type returned by every `pmm-dump-domain` and
/// `pmm-dump` API. Kept flat (no nested source enums per adapter) so that
/// callers can match on it directly the way the transfer engine's error
/// group does.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("export aborted: server load did not recover after {wait_cycles} consecutive WAIT cycles")]
    LoadShedding { wait_cycles: u32 },

    #[error("export aborted: server load reached the critical threshold")]
    LoadCritical,

    #[error("server limit exceeded: {0}")]
    ServerLimit(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("clickhouse error [{code}] {message}")]
    ClickHouse { code: i32, message: String },

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DumpError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn server_limit(msg: impl Into<String>) -> Self {
        Self::ServerLimit(msg.into())
    }

    pub fn corrupt_archive(msg: impl Into<String>) -> Self {
        Self::CorruptArchive(msg.into())
    }

    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for the error kinds  calls "recover by
    /// splitting chunk; re-emit" candidates - i.e. ones the VictoriaMetrics
    /// adapter's adaptive splitting should react to rather than propagate.
    pub fn is_server_limit(&self) -> bool {
        matches!(self, Self::ServerLimit(_))
    }
}

pub type DumpResult<T> = Result<T, DumpError>;
