// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The in-archive manifest and the
//! version-compatibility rules that go with it (section 4.9).

use serde::{Deserialize, Serialize};

/// Build identifiers recorded at export time, compared (loosely - a
/// mismatch only warns) at import time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub git_branch: String,
    pub git_commit: String,
}

/// `vm/api/v1/export` (`"json"`) vs `vm/api/v1/export/native` (`"native"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmDataFormat {
    Json,
    Native,
}

impl std::fmt::Display for VmDataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VmDataFormat::Json => "json",
            VmDataFormat::Native => "native",
        })
    }
}

/// `meta.json`'s schema. Every field here is written exactly once, last,
/// by the Transfer Engine's writer ( writer-order
/// invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub version: VersionInfo,
    pub pmm_server_version: String,
    /// Largest payload size observed across every chunk written - a
    /// monotone maximum, never recomputed downward.
    pub max_chunk_size: u64,
    /// `None` when PMM's timezone setting is `"browser"` (ambiguous,
    /// client-local); `Some(tz)` otherwise.
    pub pmm_timezone: Option<String>,
    /// The CLI invocation that produced this archive, with
    /// `--pmm-pass`/`--pmm-token`/`--pmm-cookie` replaced by `***`.
    pub arguments: String,
    pub vm_data_format: VmDataFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmm_server_services: Option<Vec<String>>,
}

impl Meta {
    /// Folds one freshly-written chunk's size into the manifest's
    /// monotone maximum.
    pub fn observe_chunk_size(&mut self, size: u64) {
        if size > self.max_chunk_size {
            self.max_chunk_size = size;
        }
    }

    /// Lowest `pmmServerVersion` this binary can safely import from.
    pub const MIN_SUPPORTED_PMM_VERSION: &'static str = "2.12.0";

    /// Plain lexical (string) compare against [`Self::MIN_SUPPORTED_PMM_VERSION`].
    /// This is intentionally not a numeric
    /// semver compare, quirks included (e.g. `"2.9.0" < "2.12.0"` lexically is
    /// false, unlike numeric compare) - callers must not silently "fix"
    /// this.
    pub fn is_supported_pmm_version(version: &str) -> bool {
        version >= Self::MIN_SUPPORTED_PMM_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observes_a_growing_monotone_maximum() {
        let mut m = sample_meta();
        m.observe_chunk_size(100);
        m.observe_chunk_size(50);
        m.observe_chunk_size(200);
        assert_eq!(m.max_chunk_size, 200);
    }

    #[test]
    fn version_compare_is_lexical_quirks_included() {
        assert!(Meta::is_supported_pmm_version("2.12.0"));
        assert!(Meta::is_supported_pmm_version("2.40.0"));
        assert!(!Meta::is_supported_pmm_version("1.99.0"));
        // Lexical compare, not numeric: "2.9.0" > "2.12.0" as strings
        // (the byte '9' sorts after '1'), even though 2.9.0 is the older
        // release numerically.
        assert!(Meta::is_supported_pmm_version("2.9.0"));
    }

    fn sample_meta() -> Meta {
        Meta {
            version: VersionInfo::default(),
            pmm_server_version: "2.40.0".into(),
            max_chunk_size: 0,
            pmm_timezone: None,
            arguments: String::new(),
            vm_data_format: VmDataFormat::Json,
            pmm_server_services: None,
        }
    }
}
