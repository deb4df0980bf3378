// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Export use case: resolves selectors, plans a combined VictoriaMetrics +
//! ClickHouse chunk pool, drains it through the Transfer Engine, and writes
//! the manifest last.

use pmm_dump_domain::error::{DumpError, DumpResult};
use pmm_dump_domain::services::{ArchiveWriter, EntryHeader};
use pmm_dump_domain::value_objects::{Meta, SourceType, VmDataFormat};
use pmm_dump_domain::{ChunkPool, TransferRun};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::commands::ExportCommand;
use crate::infrastructure::adapters::archive::TarGzArchiveWriter;
use crate::infrastructure::adapters::clickhouse::ClickHouseAdapter;
use crate::infrastructure::adapters::selector_resolver::SelectorResolver;
use crate::infrastructure::adapters::victoria_metrics::{split_time_range_into_chunks, VictoriaMetricsAdapter};
use crate::infrastructure::http_client;
use crate::infrastructure::runtime::load_checker::{LocalRamSampler, LoadChecker, RemoteLoadSampler};
use crate::infrastructure::runtime::transfer_engine::{AdapterMap, TransferEngine};

pub async fn run(cmd: ExportCommand, cancel: CancellationToken) -> DumpResult<()> {
    if cmd.just_key {
        print_just_key(cmd.password.as_deref());
        return Ok(());
    }

    let client = http_client::build_client(cmd.connection.allow_insecure_certs)?;
    let start_unix = cmd.start_ts.timestamp();
    let end_unix = cmd.end_ts.timestamp();

    let explicit_selectors: Vec<String> = cmd.ts_selector.iter().cloned().collect();
    let selectors = if cmd.dashboards.is_empty() && cmd.instances.is_empty() && explicit_selectors.is_empty() {
        Vec::new()
    } else {
        let resolver = SelectorResolver::new(client.clone(), cmd.connection.pmm_url.clone());
        resolver.resolve(&cmd.dashboards, &cmd.instances, &explicit_selectors, start_unix, end_unix).await?
    };

    let mut metas = Vec::new();
    let mut adapters: AdapterMap = HashMap::new();

    if cmd.dump.dump_core {
        let step = cmd.chunk_time_range.num_seconds().max(1);
        metas.extend(split_time_range_into_chunks(start_unix, end_unix, step));
        let vm = VictoriaMetricsAdapter::new(client.clone(), cmd.connection.pmm_url.clone(), selectors, cmd.dump.vm_native_data, 0);
        adapters.insert(SourceType::VictoriaMetrics, Arc::new(vm));
    }

    if cmd.dump.dump_qan {
        let ch = ClickHouseAdapter::connect(
            &cmd.dump.clickhouse_url,
            &cmd.dump.clickhouse_database,
            cmd.dump.clickhouse_user.as_deref(),
            cmd.dump.clickhouse_password.as_deref(),
            cmd.r#where.clone(),
            Some(start_unix),
            Some(end_unix),
        )
        .await?;
        metas.extend(ch.plan_chunks(cmd.chunk_rows).await?);
        adapters.insert(SourceType::ClickHouse, Arc::new(ch));
    }

    if metas.is_empty() {
        info!("export window contains no data; writing an archive with only a manifest");
    }

    let services = if cmd.export_services_info {
        Some(fetch_service_names(&client, &cmd.connection.pmm_url).await?)
    } else {
        None
    };
    let pmm_server_version = fetch_server_version(&client, &cmd.connection.pmm_url).await?;
    let pmm_timezone = fetch_server_timezone(&client, &cmd.connection.pmm_url).await?;

    let meta = Meta {
        version: super::version::build_version_info(),
        pmm_server_version,
        max_chunk_size: 0,
        pmm_timezone,
        arguments: cmd.masked_arguments.clone(),
        vm_data_format: if cmd.dump.vm_native_data { VmDataFormat::Native } else { VmDataFormat::Json },
        pmm_server_services: services,
    };
    let mut run = TransferRun::new(meta);

    let workers = cmd.dump.workers.unwrap_or_else(num_cpus);
    let thresholds = if cmd.ignore_load { pmm_dump_domain::Thresholds::new() } else { cmd.thresholds.clone() };
    let load_checker = LoadChecker::new(
        thresholds,
        RemoteLoadSampler::new(client.clone(), cmd.connection.pmm_url.clone()),
        LocalRamSampler::new(pmm_dump_bootstrap::create_platform().total_memory().unwrap_or(1)),
    );
    let load_checker_handle = load_checker.clone().spawn(cancel.clone());

    let sink = open_sink(&cmd)?;
    let writer: Box<dyn ArchiveWriter> = Box::new(TarGzArchiveWriter::new(sink, cmd.password.as_deref())?);

    let engine = TransferEngine::new(adapters, load_checker, workers, cancel.clone());

    let outcome = if metas.is_empty() {
        Ok(writer)
    } else {
        let pool = Arc::new(ChunkPool::new(metas)?);
        engine.export(pool, writer, &mut run).await
    };
    cancel.cancel();
    load_checker_handle.abort();

    let mut writer = outcome?;
    let total_chunks = run.progress().total_chunks();
    let bytes_written = run.progress().bytes_written;
    let meta = run.complete()?;
    write_manifest(writer.as_mut(), &meta)?;
    writer.close()?;
    info!(chunks = total_chunks, bytes = bytes_written, "export finished");
    Ok(())
}

fn print_just_key(password: Option<&str>) {
    println!("{}", password.unwrap_or(""));
}

fn open_sink(cmd: &ExportCommand) -> DumpResult<Box<dyn std::io::Write + Send>> {
    if cmd.stdout {
        return Ok(Box::new(std::io::stdout()));
    }
    let path = cmd
        .dump
        .dump_path
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from(format!("pmm-dump-{}.tar.gz", cmd.start_ts.format("%Y%m%d%H%M%S"))));
    let file = std::fs::File::create(&path).map_err(DumpError::from)?;
    Ok(Box::new(file))
}

fn write_manifest(writer: &mut dyn ArchiveWriter, meta: &Meta) -> DumpResult<()> {
    let bytes = serde_json::to_vec_pretty(meta)?;
    writer.write_header(&EntryHeader::new("meta.json", bytes.len() as u64))?;
    writer.write(&bytes)?;

    let log = serde_json::to_vec(&serde_json::json!([]))?;
    writer.write_header(&EntryHeader::new("log.json", log.len() as u64))?;
    writer.write(&log)?;
    Ok(())
}

async fn fetch_server_version(client: &reqwest::Client, base_url: &str) -> DumpResult<String> {
    let url = format!("{base_url}/v1/server/version");
    let response = http_client::get_with_retries(client, &url).await?;
    let body: serde_json::Value = response.json().await.map_err(|e| DumpError::network(e.to_string()))?;
    Ok(body["version"].as_str().unwrap_or(Meta::MIN_SUPPORTED_PMM_VERSION).to_string())
}

/// `None` when the server's timezone setting is `"browser"` (ambiguous,
/// client-local), `Some(tz)` otherwise.
async fn fetch_server_timezone(client: &reqwest::Client, base_url: &str) -> DumpResult<Option<String>> {
    let url = format!("{base_url}/v1/Settings/Get");
    let response = http_client::get_with_retries(client, &url).await?;
    let body: serde_json::Value = response.json().await.map_err(|e| DumpError::network(e.to_string()))?;
    match body["settings"]["timezone"].as_str() {
        Some("browser") | None => Ok(None),
        Some(tz) => Ok(Some(tz.to_string())),
    }
}

async fn fetch_service_names(client: &reqwest::Client, base_url: &str) -> DumpResult<Vec<String>> {
    let url = format!("{base_url}/v1/inventory/services");
    let response = http_client::get_with_retries(client, &url).await?;
    let body: serde_json::Value = response.json().await.map_err(|e| DumpError::network(e.to_string()))?;
    let names = body
        .as_object()
        .into_iter()
        .flat_map(|services| services.values())
        .filter_map(|list| list.as_array())
        .flatten()
        .filter_map(|entry| entry["service_name"].as_str())
        .map(str::to_string)
        .collect();
    Ok(names)
}

fn num_cpus() -> usize {
    pmm_dump_bootstrap::create_platform().cpu_count()
}
