// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Which data plane a chunk belongs to, and the on-disk directory prefix
//! that encodes it.

use crate::error::DumpError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies which adapter produced or consumes a [`crate::Chunk`].
///
/// The string form is stable: it is the archive's top-level directory name
/// (`vm/...`, `ch/...`), so changing the `Display`/`FromStr` impls would
/// break every existing dump file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    VictoriaMetrics,
    ClickHouse,
    /// Sentinel value for a `ChunkMeta` that has not been assigned a source
    /// yet. Never written to disk; constructing an archive entry with this
    /// value is a bug.
    Undefined,
}

impl SourceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SourceType::VictoriaMetrics => "vm",
            SourceType::ClickHouse => "ch",
            SourceType::Undefined => "undefined",
        }
    }

    pub const fn is_defined(&self) -> bool {
        !matches!(self, SourceType::Undefined)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = DumpError;

    /// Parses the directory prefix used on disk. Per the archive invariant
    /// in , any entry whose directory does not parse here
    /// is a corrupt-archive error for the caller to raise, not a panic.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vm" => Ok(SourceType::VictoriaMetrics),
            "ch" => Ok(SourceType::ClickHouse),
            other => Err(DumpError::corrupt_archive(format!(
                "unknown source directory prefix `{other}`"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_stable_string_form() {
        for s in [SourceType::VictoriaMetrics, SourceType::ClickHouse] {
            assert_eq!(s.as_str().parse::<SourceType>().unwrap(), s);
        }
    }

    #[test]
    fn rejects_unknown_prefixes() {
        assert!("nope".parse::<SourceType>().is_err());
    }

    #[test]
    fn undefined_does_not_parse() {
        // Undefined is a sentinel, never a real directory name.
        assert!("undefined".parse::<SourceType>().is_err());
    }
}
