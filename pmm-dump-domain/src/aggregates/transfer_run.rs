// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `TransferRun` is the consistency boundary around one export or import
//! invocation: it is the only place allowed to mutate the in-progress
//! [`Meta`] and the only place that decides whether a run is still live.
//! Everything below it (adapters, the chunk pool, the load checker) reports
//! up through this aggregate instead of mutating shared state directly.

use crate::entities::TransferProgress;
use crate::events::TransferAborted;
use crate::value_objects::{Meta, SourceType};
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
}

pub struct TransferRun {
    meta: Meta,
    progress: TransferProgress,
    status: RunStatus,
    abort_reason: Option<String>,
}

impl TransferRun {
    pub fn new(meta: Meta) -> Self {
        Self {
            meta,
            progress: TransferProgress::new(),
            status: RunStatus::Running,
            abort_reason: None,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    /// Folds a chunk's size into both the progress counters and the
    /// manifest's monotone maximum. Returns an error if the run already
    /// terminated - the engine must stop dispatching work once a run is
    /// no longer `Running`.
    pub fn record_chunk(
        &mut self,
        source: SourceType,
        size: u64,
    ) -> Result<(), crate::error::DumpError> {
        if self.status != RunStatus::Running {
            return Err(crate::error::DumpError::internal(
                "record_chunk called on a non-running transfer",
            ));
        }
        self.progress.record_chunk(source, size);
        self.meta.observe_chunk_size(size);
        Ok(())
    }

    /// Marks the run aborted and returns the event the engine should log
    /// and propagate to the caller as the final error.
    pub fn abort(&mut self, reason: impl Into<String>) -> TransferAborted {
        let reason = reason.into();
        self.status = RunStatus::Aborted;
        self.abort_reason = Some(reason.clone());
        TransferAborted {
            reason,
            occurred_at: Utc::now(),
        }
    }

    /// Finalizes the run and hands back the manifest to be serialized as
    /// `meta.json`. Fails if the run was aborted - callers must not write
    /// a manifest for a transfer that did not complete.
    pub fn complete(mut self) -> Result<Meta, crate::error::DumpError> {
        if self.status == RunStatus::Aborted {
            return Err(crate::error::DumpError::internal(format!(
                "cannot complete an aborted transfer: {}",
                self.abort_reason.unwrap_or_default()
            )));
        }
        self.status = RunStatus::Completed;
        Ok(self.meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::VmDataFormat;

    fn meta() -> Meta {
        Meta {
            version: Default::default(),
            pmm_server_version: "2.40.0".into(),
            max_chunk_size: 0,
            pmm_timezone: None,
            arguments: String::new(),
            vm_data_format: VmDataFormat::Json,
            pmm_server_services: None,
        }
    }

    #[test]
    fn completing_hands_back_meta_with_observed_max() {
        let mut run = TransferRun::new(meta());
        run.record_chunk(SourceType::ClickHouse, 10).unwrap();
        run.record_chunk(SourceType::ClickHouse, 500).unwrap();
        let m = run.complete().unwrap();
        assert_eq!(m.max_chunk_size, 500);
    }

    #[test]
    fn aborted_run_refuses_to_complete() {
        let mut run = TransferRun::new(meta());
        run.abort("load critical");
        assert!(run.complete().is_err());
    }

    #[test]
    fn terminated_run_refuses_further_chunks() {
        let mut run = TransferRun::new(meta());
        run.abort("load critical");
        assert!(run.record_chunk(SourceType::ClickHouse, 1).is_err());
    }
}
