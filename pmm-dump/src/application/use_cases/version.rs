// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `version` command and the build-identifier pair recorded into every
//! archive's manifest.

use pmm_dump_domain::value_objects::VersionInfo;

/// Reads the git branch/commit this binary was built from, if the build
/// set them (`PMM_DUMP_GIT_BRANCH`/`PMM_DUMP_GIT_COMMIT`). Neither is
/// required - a `cargo build` outside CI just records `"unknown"`.
pub fn build_version_info() -> VersionInfo {
    VersionInfo {
        git_branch: option_env!("PMM_DUMP_GIT_BRANCH").unwrap_or("unknown").to_string(),
        git_commit: option_env!("PMM_DUMP_GIT_COMMIT").unwrap_or("unknown").to_string(),
    }
}

pub fn run() {
    let info = build_version_info();
    println!("pmm-dump {}", env!("CARGO_PKG_VERSION"));
    println!("git branch: {}", info.git_branch);
    println!("git commit: {}", info.git_commit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_build_env_falls_back_to_unknown() {
        let info = build_version_info();
        assert!(!info.git_branch.is_empty());
        assert!(!info.git_commit.is_empty());
    }
}
