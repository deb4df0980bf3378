// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Descriptor of one unit of transfer work.
//!
//! A `ChunkMeta` is deliberately small and `Copy`-ish - it is what flows
//! through the [`crate::ChunkPool`], not the payload itself. The
//! VictoriaMetrics adapter fills `start`/`end`; the ClickHouse adapter fills
//! `index`/`rows_len`. A single `ChunkMeta` never mixes both shapes.

use crate::value_objects::SourceType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub source: SourceType,
    /// Inclusive range start, unix seconds. `None` for row-range chunks.
    pub start: Option<i64>,
    /// Exclusive range end, unix seconds. `None` for row-range chunks.
    pub end: Option<i64>,
    /// Chunk ordinal within its source's plan. `0` for time-range chunks
    /// that do not need one (VictoriaMetrics never reorders, so the field
    /// is unused there beyond filename derivation of sub-splits).
    pub index: u64,
    /// Row count this chunk covers, for ClickHouse's `LIMIT`. `0` for
    /// time-range chunks.
    pub rows_len: u64,
}

impl ChunkMeta {
    pub fn time_range(source: SourceType, start: i64, end: i64) -> Self {
        Self {
            source,
            start: Some(start),
            end: Some(end),
            index: 0,
            rows_len: 0,
        }
    }

    pub fn row_range(source: SourceType, index: u64, rows_len: u64) -> Self {
        Self {
            source,
            start: None,
            end: None,
            index,
            rows_len,
        }
    }

    /// Filename stem used by the VictoriaMetrics adapter:
    /// `"<start_unix>-<end_unix>"`. Panics if this is not a time-range
    /// chunk - callers must not call it on a ClickHouse `ChunkMeta`.
    pub fn range_label(&self) -> String {
        format!(
            "{}-{}",
            self.start.expect("range_label on a non-time-range chunk"),
            self.end.expect("range_label on a non-time-range chunk")
        )
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some((e - s) * 1000),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.start, self.end) {
            (Some(s), Some(e)) => write!(f, "{s}-{e}"),
            _ => write!(f, "#{}", self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_label_matches_printable_form() {
        let m = ChunkMeta::time_range(SourceType::VictoriaMetrics, 100, 200);
        assert_eq!(m.range_label(), "100-200");
        assert_eq!(m.to_string(), "100-200");
    }

    #[test]
    fn row_range_chunk_displays_index() {
        let m = ChunkMeta::row_range(SourceType::ClickHouse, 3, 1000);
        assert_eq!(m.to_string(), "#3");
    }
}
