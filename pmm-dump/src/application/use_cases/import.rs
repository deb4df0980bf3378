// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Import use case: opens the archive, drains it through the Transfer
//! Engine into whichever adapters `--dump-core`/`--dump-qan` enabled, and
//! warns (never fails) on a version mismatch against the archive's
//! manifest.

use pmm_dump_domain::error::{DumpError, DumpResult};
use pmm_dump_domain::services::ArchiveReader;
use pmm_dump_domain::value_objects::{Meta, SourceType};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::commands::ImportCommand;
use crate::application::use_cases::version::build_version_info;
use crate::infrastructure::adapters::archive::TarGzArchiveReader;
use crate::infrastructure::adapters::clickhouse::ClickHouseAdapter;
use crate::infrastructure::adapters::victoria_metrics::VictoriaMetricsAdapter;
use crate::infrastructure::http_client;
use crate::infrastructure::meta::warn_on_version_mismatch;
use crate::infrastructure::runtime::load_checker::{LocalRamSampler, LoadChecker, RemoteLoadSampler};
use crate::infrastructure::runtime::transfer_engine::{AdapterMap, TransferEngine};

pub async fn run(cmd: ImportCommand, cancel: CancellationToken) -> DumpResult<()> {
    if cmd.just_key {
        println!("{}", cmd.password.as_deref().unwrap_or(""));
        return Ok(());
    }

    let client = http_client::build_client(cmd.connection.allow_insecure_certs)?;
    let mut adapters: AdapterMap = HashMap::new();
    if cmd.dump.dump_core {
        let vm = VictoriaMetricsAdapter::new(client.clone(), cmd.connection.pmm_url.clone(), Vec::new(), cmd.dump.vm_native_data, cmd.vm_content_limit);
        adapters.insert(SourceType::VictoriaMetrics, Arc::new(vm));
    }
    if cmd.dump.dump_qan {
        let ch = ClickHouseAdapter::connect(
            &cmd.dump.clickhouse_url,
            &cmd.dump.clickhouse_database,
            cmd.dump.clickhouse_user.as_deref(),
            cmd.dump.clickhouse_password.as_deref(),
            None,
            None,
            None,
        )
        .await?;
        adapters.insert(SourceType::ClickHouse, Arc::new(ch));
    }

    let source = open_source(&cmd)?;
    let reader: Box<dyn ArchiveReader> = Box::new(TarGzArchiveReader::new(source, cmd.password.as_deref())?);

    let load_checker = LoadChecker::new(
        pmm_dump_domain::Thresholds::new(),
        RemoteLoadSampler::new(client.clone(), cmd.connection.pmm_url.clone()),
        LocalRamSampler::new(pmm_dump_bootstrap::create_platform().total_memory().unwrap_or(1)),
    );
    let workers = cmd.dump.workers.unwrap_or_else(|| pmm_dump_bootstrap::create_platform().cpu_count());
    let engine = TransferEngine::new(adapters, load_checker, workers, cancel);

    let meta_bytes = engine.import(reader).await?;

    if let Some(bytes) = meta_bytes {
        let archive_meta: Meta = serde_json::from_slice(&bytes)?;
        let running = build_version_info();
        warn_on_version_mismatch(&archive_meta, &running.git_commit);
    } else {
        return Err(DumpError::corrupt_archive("archive has no meta.json entry"));
    }

    info!("import finished");
    Ok(())
}

fn open_source(cmd: &ImportCommand) -> DumpResult<Box<dyn std::io::Read + Send>> {
    match &cmd.dump.dump_path {
        Some(path) => Ok(Box::new(std::fs::File::open(path).map_err(DumpError::from)?)),
        None => Ok(Box::new(std::io::stdin())),
    }
}
