// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Lightweight domain events emitted by the transfer engine. Nothing in this
//! crate subscribes to them - `pmm_dump::infrastructure` maps them onto
//! `tracing` spans/fields instead.

use crate::value_objects::{ChunkMeta, LoadStatus, SourceType};
use chrono::{DateTime, Utc};

pub trait DomainEvent: std::fmt::Debug {
    /// Stable event name, used as the `tracing` event's message.
    fn name(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone)]
pub struct ChunkWritten {
    pub source: SourceType,
    pub meta: ChunkMeta,
    pub bytes: u64,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for ChunkWritten {
    fn name(&self) -> &'static str {
        "chunk_written"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[derive(Debug, Clone)]
pub struct LoadStatusChanged {
    pub previous: LoadStatus,
    pub current: LoadStatus,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for LoadStatusChanged {
    fn name(&self) -> &'static str {
        "load_status_changed"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[derive(Debug, Clone)]
pub struct TransferAborted {
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for TransferAborted {
    fn name(&self) -> &'static str {
        "transfer_aborted"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_stable_for_log_filtering() {
        let e = ChunkWritten {
            source: SourceType::ClickHouse,
            meta: ChunkMeta::row_range(SourceType::ClickHouse, 0, 10),
            bytes: 10,
            occurred_at: Utc::now(),
        };
        assert_eq!(e.name(), "chunk_written");
    }
}
