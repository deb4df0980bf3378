// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Maps a top-level `anyhow::Result` to the process exit code: 0 on
//! success, 1 on any fatal error.

use std::process::ExitCode as StdExitCode;

pub fn result_to_exit_code<T>(result: anyhow::Result<T>) -> StdExitCode {
    match result {
        Ok(_) => StdExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            StdExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_do_not_panic() {
        let _ = result_to_exit_code(Ok::<(), anyhow::Error>(()));
        let _ = result_to_exit_code(Err::<(), anyhow::Error>(anyhow::anyhow!("boom")));
    }
}
