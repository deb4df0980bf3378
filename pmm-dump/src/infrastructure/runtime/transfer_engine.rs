// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Transfer Engine: the export and import state
//! machines that move chunks between a [`ChunkPool`]/archive channel and
//! the concrete [`SourceAdapter`]s, consulting the Load Checker between
//! chunks and honoring a single shared cancellation token.

use pmm_dump_domain::error::{DumpError, DumpResult};
use pmm_dump_domain::services::{ArchiveReader, ArchiveWriter, EntryHeader, SourceAdapter};
use pmm_dump_domain::value_objects::{Chunk, ChunkMeta, LoadStatus, SourceType};
use pmm_dump_domain::{ChunkPool, TransferRun};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::load_checker::{LoadChecker, MAX_WAIT_STATUS_IN_SEQUENCE};

/// Capacity of the bounded chunk channel between reader and writer workers.
pub const CHANNEL_CAPACITY: usize = 4;

/// The set of adapters an engine run dispatches chunks to, keyed by the
/// `SourceType` each one owns. Built by the caller from `--dump-core`/
/// `--dump-qan` flags before the engine is invoked.
pub type AdapterMap = HashMap<SourceType, Arc<dyn SourceAdapter>>;

pub struct TransferEngine {
    adapters: AdapterMap,
    load_checker: Arc<LoadChecker>,
    workers: usize,
    cancel: CancellationToken,
}

impl TransferEngine {
    pub fn new(
        adapters: AdapterMap,
        load_checker: Arc<LoadChecker>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapters,
            load_checker,
            workers: workers.max(1),
            cancel,
        }
    }

    /// Export state machine. Drains `pool` through
    /// `self.workers` reader tasks, writes every non-empty chunk through
    /// `writer` on a single writer task, and folds each chunk's size into
    /// `run`. The archive is closed (and `meta.json`/`log.json` written by
    /// the caller once this returns) regardless of whether a worker
    /// errored, so a cancelled or load-shed export still yields a partial,
    /// readable archive.
    pub async fn export(
        &self,
        pool: Arc<ChunkPool>,
        mut writer: Box<dyn ArchiveWriter>,
        run: &mut TransferRun,
    ) -> DumpResult<Box<dyn ArchiveWriter>> {
        let (tx, mut rx) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);

        let mut reader_handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let pool = pool.clone();
            let load_checker = self.load_checker.clone();
            let cancel = self.cancel.clone();
            let tx = tx.clone();
            let adapters = self.adapters.clone();
            reader_handles.push(tokio::spawn(async move {
                reader_worker(pool, adapters, load_checker, cancel, tx).await
            }));
        }
        drop(tx);

        let reader_cancel = self.cancel.clone();
        let sentinel = tokio::spawn(async move {
            let mut first_error = None;
            for handle in reader_handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(error = %e, "reader worker failed, cancelling siblings");
                        reader_cancel.cancel();
                        first_error.get_or_insert(e);
                    }
                    Err(join_err) => {
                        reader_cancel.cancel();
                        first_error.get_or_insert(DumpError::internal(join_err.to_string()));
                    }
                }
            }
            first_error
        });

        while let Some(chunk) = rx.recv().await {
            if chunk.is_empty() {
                continue;
            }
            let size = chunk.size() as u64;
            let header = EntryHeader::new(format!("{}/{}", chunk.meta.source.as_str(), chunk.filename), size);
            writer.write_header(&header)?;
            writer.write(&chunk.content)?;
            run.record_chunk(chunk.meta.source, size)?;
        }

        let worker_error = sentinel.await.map_err(|e| DumpError::internal(e.to_string()))?;
        if let Some(e) = worker_error {
            run.abort(e.to_string());
            return Err(e);
        }
        Ok(writer)
    }

    /// Import state machine. Reads the archive
    /// sequentially on the calling task (the archive pipeline is a single
    /// forward-only stream, so there is nothing to parallelize here),
    /// classifies each entry by its directory prefix, and fans chunk
    /// bodies out to `self.workers` writer tasks. `meta.json` is parsed and
    /// returned to the caller for version comparison; `log.json` is
    /// skipped.
    pub async fn import(&self, mut reader: Box<dyn ArchiveReader>) -> DumpResult<Option<Vec<u8>>> {
        let (tx, rx) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut writer_handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let rx = rx.clone();
            let adapters = self.adapters.clone();
            let cancel = self.cancel.clone();
            writer_handles.push(tokio::spawn(async move { writer_worker(rx, adapters, cancel).await }));
        }

        let mut meta_bytes = None;
        let read_result: DumpResult<()> = async {
            while let Some(header) = reader.next_header()? {
                if self.cancel.is_cancelled() {
                    break;
                }
                if header.name == "meta.json" {
                    meta_bytes = Some(reader.read_all()?);
                    continue;
                }
                if header.name == "log.json" {
                    reader.read_all()?;
                    continue;
                }
                let (dir, filename) = header
                    .name
                    .split_once('/')
                    .ok_or_else(|| DumpError::corrupt_archive(format!("entry `{}` has no directory prefix", header.name)))?;
                let source: SourceType = dir.parse()?;
                let content = reader.read_all()?;
                let chunk = Chunk::new(ChunkMeta::row_range(source, 0, 0), content, filename.to_string());
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Ok(())
        }
        .await;
        drop(tx);

        let mut first_error = read_result.err();
        for handle in writer_handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.cancel.cancel();
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    self.cancel.cancel();
                    first_error.get_or_insert(DumpError::internal(join_err.to_string()));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        for (source, adapter) in &self.adapters {
            adapter.finalize_writes().await.map_err(|e| {
                DumpError::internal(format!("finalize_writes failed for {source}: {e}"))
            })?;
        }
        info!("import finalized every adapter's buffered writes");
        Ok(meta_bytes)
    }
}

/// Polls the Load Checker's latest status once. `Ok` and `None` (no sample
/// yet) let the caller proceed; `Wait` sleeps one cycle and is retried by
/// the caller's own loop, aborting once the streak exceeds
/// [`MAX_WAIT_STATUS_IN_SEQUENCE`]; `Terminate` aborts immediately.
async fn wait_for_clearance(load_checker: &LoadChecker, cancel: &CancellationToken) -> DumpResult<()> {
    loop {
        let latest = load_checker.latest();
        match latest.status {
            LoadStatus::None | LoadStatus::Ok => return Ok(()),
            LoadStatus::Terminate => return Err(DumpError::LoadCritical),
            LoadStatus::Wait => {
                if latest.consecutive_same_count > MAX_WAIT_STATUS_IN_SEQUENCE {
                    return Err(DumpError::LoadShedding {
                        wait_cycles: latest.consecutive_same_count,
                    });
                }
                tokio::select! {
                    _ = cancel.cancelled() => return Err(DumpError::internal("cancelled while waiting for load to recover")),
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }
}

async fn reader_worker(
    pool: Arc<ChunkPool>,
    adapters: AdapterMap,
    load_checker: Arc<LoadChecker>,
    cancel: CancellationToken,
    tx: mpsc::Sender<Chunk>,
) -> DumpResult<()> {
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        wait_for_clearance(&load_checker, &cancel).await?;

        let Some(meta) = pool.next() else {
            return Ok(());
        };
        let adapter = adapters
            .get(&meta.source)
            .ok_or_else(|| DumpError::internal(format!("no adapter registered for {}", meta.source)))?;

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            chunks = adapter.read_chunks(meta) => {
                for chunk in chunks? {
                    if tx.send(chunk).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn writer_worker(
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Chunk>>>,
    adapters: AdapterMap,
    cancel: CancellationToken,
) -> DumpResult<()> {
    loop {
        let chunk = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(chunk) = chunk else {
            return Ok(());
        };
        if cancel.is_cancelled() {
            return Ok(());
        }
        match adapters.get(&chunk.meta.source) {
            Some(adapter) => adapter.write_chunk(chunk).await?,
            None => warn!(source = %chunk.meta.source, filename = %chunk.filename, "no adapter registered for this chunk's source, skipping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pmm_dump_domain::value_objects::{Meta, Threshold, ThresholdKey, Thresholds, VersionInfo, VmDataFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingAdapter {
        source: SourceType,
        reads: AtomicUsize,
        written: StdMutex<Vec<Chunk>>,
        finalized: AtomicUsize,
    }

    impl RecordingAdapter {
        fn new(source: SourceType) -> Self {
            Self {
                source,
                reads: AtomicUsize::new(0),
                written: StdMutex::new(Vec::new()),
                finalized: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for RecordingAdapter {
        fn source(&self) -> SourceType {
            self.source
        }

        async fn read_chunks(&self, meta: ChunkMeta) -> DumpResult<Vec<Chunk>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Chunk::new(meta, vec![1, 2, 3], format!("{}.bin", meta.index))])
        }

        async fn write_chunk(&self, chunk: Chunk) -> DumpResult<()> {
            self.written.lock().unwrap().push(chunk);
            Ok(())
        }

        async fn finalize_writes(&self) -> DumpResult<()> {
            self.finalized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn never_trips_load_checker() -> Arc<LoadChecker> {
        LoadChecker::new(
            Thresholds::new(),
            super::super::load_checker::RemoteLoadSampler::new(reqwest::Client::new(), "http://unused"),
            super::super::load_checker::LocalRamSampler::new(1),
        )
    }

    #[derive(Clone, Default)]
    struct RecordedWrites(Arc<StdMutex<Vec<String>>>);

    struct CollectingWriter {
        recorded: RecordedWrites,
    }

    impl ArchiveWriter for CollectingWriter {
        fn write_header(&mut self, header: &EntryHeader) -> DumpResult<()> {
            self.recorded.0.lock().unwrap().push(header.name.clone());
            Ok(())
        }

        fn write(&mut self, _bytes: &[u8]) -> DumpResult<()> {
            Ok(())
        }

        fn close(self: Box<Self>) -> DumpResult<()> {
            Ok(())
        }
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

    #[tokio::test]
    async fn export_drains_the_pool_and_writes_every_chunk() {
        let metas: Vec<ChunkMeta> = (0..5).map(|i| ChunkMeta::row_range(SourceType::ClickHouse, i, 10)).collect();
        let pool = Arc::new(ChunkPool::new(metas).unwrap());
        let adapter = Arc::new(RecordingAdapter::new(SourceType::ClickHouse));
        let mut adapters: AdapterMap = HashMap::new();
        adapters.insert(SourceType::ClickHouse, adapter.clone());

        let engine = TransferEngine::new(adapters, never_trips_load_checker(), 3, CancellationToken::new());
        let mut run = TransferRun::new(sample_meta());
        let recorded = RecordedWrites::default();
        let writer: Box<dyn ArchiveWriter> = Box::new(CollectingWriter { recorded: recorded.clone() });

        engine.export(pool, writer, &mut run).await.unwrap();
        assert_eq!(recorded.0.lock().unwrap().len(), 5);
        assert_eq!(adapter.reads.load(Ordering::SeqCst), 5);
        assert_eq!(run.progress().total_chunks(), 5);
    }

    #[tokio::test]
    async fn export_aborts_the_run_when_load_checker_reports_terminate() {
        let metas = vec![ChunkMeta::row_range(SourceType::ClickHouse, 0, 10)];
        let pool = Arc::new(ChunkPool::new(metas).unwrap());
        let adapter = Arc::new(RecordingAdapter::new(SourceType::ClickHouse));
        let mut adapters: AdapterMap = HashMap::new();
        adapters.insert(SourceType::ClickHouse, adapter.clone());

        let mut thresholds = Thresholds::new();
        thresholds.insert(ThresholdKey::MyRam, Threshold::new(0.0, 0.0));
        let load_checker = LoadChecker::new(
            thresholds,
            super::super::load_checker::RemoteLoadSampler::new(reqwest::Client::new(), "http://unused"),
            super::super::load_checker::LocalRamSampler::new(1),
        );
        load_checker.tick().await;

        let engine = TransferEngine::new(adapters, load_checker, 1, CancellationToken::new());
        let mut run = TransferRun::new(sample_meta());
        let writer: Box<dyn ArchiveWriter> = Box::new(CollectingWriter { recorded: RecordedWrites::default() });

        let result = engine.export(pool, writer, &mut run).await;
        assert!(result.is_err());
        assert_eq!(run.status(), pmm_dump_domain::RunStatus::Aborted);
    }

    #[tokio::test]
    async fn import_dispatches_chunks_to_the_matching_adapter_and_finalizes() {
        struct ScriptedReader {
            entries: std::vec::IntoIter<(String, Vec<u8>)>,
            pending_body: Option<Vec<u8>>,
        }

        impl ArchiveReader for ScriptedReader {
            fn next_header(&mut self) -> DumpResult<Option<EntryHeader>> {
                match self.entries.next() {
                    Some((name, body)) => {
                        self.pending_body = Some(body);
                        Ok(Some(EntryHeader::new(name, 0)))
                    }
                    None => Ok(None),
                }
            }

            fn read_all(&mut self) -> DumpResult<Vec<u8>> {
                Ok(self.pending_body.take().unwrap_or_default())
            }
        }

        let entries = vec![
            ("ch/0.tsv".to_string(), b"row-one".to_vec()),
            ("meta.json".to_string(), b"{}".to_vec()),
            ("log.json".to_string(), b"[]".to_vec()),
        ];
        let reader: Box<dyn ArchiveReader> = Box::new(ScriptedReader { entries: entries.into_iter(), pending_body: None });

        let adapter = Arc::new(RecordingAdapter::new(SourceType::ClickHouse));
        let mut adapters: AdapterMap = HashMap::new();
        adapters.insert(SourceType::ClickHouse, adapter.clone());

        let engine = TransferEngine::new(adapters, never_trips_load_checker(), 2, CancellationToken::new());
        let meta_bytes = engine.import(reader).await.unwrap();

        assert_eq!(meta_bytes, Some(b"{}".to_vec()));
        assert_eq!(adapter.written.lock().unwrap().len(), 1);
        assert_eq!(adapter.finalized.load(Ordering::SeqCst), 1);
    }
}
