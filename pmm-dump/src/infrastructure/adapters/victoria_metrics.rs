// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! VictoriaMetrics Adapter: reads/writes metrics
//! chunks over VictoriaMetrics' `/api/v1/export`/`/api/v1/import` HTTP API,
//! with adaptive behavior on both sides - time-range splitting on the
//! server's sample-limit error, and body splitting on HTTP 413.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use pmm_dump_domain::error::{DumpError, DumpResult};
use pmm_dump_domain::value_objects::{Chunk, ChunkMeta, SourceType};
use reqwest::Client;
use std::io::Write;

use crate::infrastructure::http_client;

const SAMPLE_LIMIT_MARKER: &str = "cannot select more than -search.maxSamplesPerQuery";
const MIN_SPLIT_SPAN_MS: i64 = 1;

/// Reads/writes the VictoriaMetrics data plane. One instance is built per
/// transfer with its selector set already resolved by the Selector
/// Resolver; `read_chunks` issues one request per selector and
/// unions the results.
pub struct VictoriaMetricsAdapter {
    client: Client,
    base_url: String,
    selectors: Vec<String>,
    native_data: bool,
    content_limit: u64,
}

impl VictoriaMetricsAdapter {
    pub fn new(client: Client, base_url: impl Into<String>, selectors: Vec<String>, native_data: bool, content_limit: u64) -> Self {
        let selectors = if selectors.is_empty() {
            vec!["{__name__=~\".*\"}".to_string()]
        } else {
            selectors
        };
        Self {
            client,
            base_url: base_url.into(),
            selectors,
            native_data,
            content_limit,
        }
    }

    fn export_path(&self) -> &'static str {
        if self.native_data {
            "/api/v1/export/native"
        } else {
            "/api/v1/export"
        }
    }

    fn import_path(&self) -> &'static str {
        if self.native_data {
            "/api/v1/import/native"
        } else {
            "/api/v1/import"
        }
    }

    async fn export_selector(&self, selector: &str, meta: ChunkMeta) -> DumpResult<Vec<Chunk>> {
        let start = meta.start.ok_or_else(|| DumpError::internal("VictoriaMetrics chunk missing start"))?;
        let end = meta.end.ok_or_else(|| DumpError::internal("VictoriaMetrics chunk missing end"))?;
        self.export_range(selector, start, end).await
    }

    fn export_range<'a>(
        &'a self,
        selector: &'a str,
        start: i64,
        end: i64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = DumpResult<Vec<Chunk>>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!(
                "{}{}?match[]={}&start={}&end={}",
                self.base_url,
                self.export_path(),
                urlencode(selector),
                start,
                end
            );
            let response = http_client::get_with_retries(&self.client, &url).await?;

            if response.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
                return self.split_and_retry(selector, start, end).await;
            }
            let status = response.status();
            let body = response.bytes().await.map_err(|e| DumpError::network(e.to_string()))?;
            if body_reports_sample_limit(&body) {
                return self.split_and_retry(selector, start, end).await;
            }
            if !status.is_success() {
                return Err(DumpError::network(format!("export {selector} [{start},{end}): HTTP {status}")));
            }

            if body.is_empty() {
                return Ok(Vec::new());
            }
            let chunk_meta = ChunkMeta::time_range(SourceType::VictoriaMetrics, start, end);
            Ok(vec![Chunk::new(chunk_meta, body.to_vec(), format!("{}.bin", chunk_meta.range_label()))])
        })
    }

    async fn split_and_retry(&self, selector: &str, start: i64, end: i64) -> DumpResult<Vec<Chunk>> {
        if (end - start) * 1000 < MIN_SPLIT_SPAN_MS {
            return Err(DumpError::server_limit(format!(
                "sample limit exceeded and range [{start},{end}) cannot be split further"
            )));
        }
        let mid = start + (end - start) / 2;
        if mid <= start || mid >= end {
            return Err(DumpError::server_limit(format!(
                "sample limit exceeded and range [{start},{end}) cannot be split further"
            )));
        }
        let mut left = self.export_range(selector, start, mid).await?;
        let right = self.export_range(selector, mid, end).await?;
        left.extend(right);
        Ok(renumber_parts(left))
    }
}

#[async_trait]
impl pmm_dump_domain::services::source_adapter::SourceAdapter for VictoriaMetricsAdapter {
    fn source(&self) -> SourceType {
        SourceType::VictoriaMetrics
    }

    async fn read_chunks(&self, meta: ChunkMeta) -> DumpResult<Vec<Chunk>> {
        let mut all = Vec::new();
        for selector in &self.selectors {
            all.extend(self.export_selector(selector, meta).await?);
        }
        Ok(all)
    }

    async fn write_chunk(&self, chunk: Chunk) -> DumpResult<()> {
        self.import_body(chunk.content).await
    }

    async fn finalize_writes(&self) -> DumpResult<()> {
        Ok(())
    }
}

impl VictoriaMetricsAdapter {
    async fn import_body(&self, body: Vec<u8>) -> DumpResult<()> {
        let gzipped = gzip(&body)?;
        if self.content_limit > 0 && gzipped.len() as u64 > self.content_limit {
            let halves = split_json_lines_in_half(&body)?;
            for half in halves {
                Box::pin(self.import_body(half)).await?;
            }
            return Ok(());
        }

        let url = format!("{}{}", self.base_url, self.import_path());
        let response = self
            .client
            .post(&url)
            .header("Content-Encoding", "gzip")
            .body(gzipped)
            .send()
            .await
            .map_err(|e| DumpError::network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
            return Err(DumpError::server_limit(
                "import payload too large: lower --vm-content-limit or shrink --chunk-time-range",
            ));
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(DumpError::network(format!("import: HTTP {status}")));
        }
        Ok(())
    }
}

fn gzip(body: &[u8]) -> DumpResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

fn body_reports_sample_limit(body: &[u8]) -> bool {
    std::str::from_utf8(body)
        .map(|s| s.contains(SAMPLE_LIMIT_MARKER))
        .unwrap_or(false)
}

/// Splits a newline-delimited-JSON metrics body into two halves by line
/// count, for the 413 remediation path on the write side.
fn split_json_lines_in_half(body: &[u8]) -> DumpResult<Vec<Vec<u8>>> {
    let text = std::str::from_utf8(body).map_err(|e| DumpError::corrupt_archive(format!("non-UTF8 metrics body: {e}")))?;
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 2 {
        return Err(DumpError::server_limit("import body too large but contains a single metric line; cannot split further"));
    }
    let mid = lines.len() / 2;
    let join = |slice: &[&str]| slice.join("\n").into_bytes();
    Ok(vec![join(&lines[..mid]), join(&lines[mid..])])
}

/// Splits non-overlapping, back-to-back [`ChunkMeta`]s covering `[start,end)`
/// with width `step`; the last chunk may be shorter.
pub fn split_time_range_into_chunks(start: i64, end: i64, step: i64) -> Vec<ChunkMeta> {
    if step <= 0 || start >= end {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let chunk_end = (cursor + step).min(end);
        chunks.push(ChunkMeta::time_range(SourceType::VictoriaMetrics, cursor, chunk_end));
        cursor = chunk_end;
    }
    chunks
}

/// After an adaptive split, sub-chunks of the same original range share one
/// filename stem with a `-part-K` suffix.
fn renumber_parts(chunks: Vec<Chunk>) -> Vec<Chunk> {
    if chunks.len() <= 1 {
        return chunks;
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, mut chunk)| {
            chunk.filename = format!("{}-part-{}.bin", chunk.meta.range_label(), i);
            chunk
        })
        .collect()
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn splits_range_into_fixed_width_chunks_with_short_tail() {
        let chunks = split_time_range_into_chunks(0, 250, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].range_label(), "0-100");
        assert_eq!(chunks[1].range_label(), "100-200");
        assert_eq!(chunks[2].range_label(), "200-250");
    }

    #[test]
    fn empty_range_produces_no_chunks() {
        assert!(split_time_range_into_chunks(100, 100, 10).is_empty());
    }

    #[test]
    fn detects_sample_limit_error_in_body() {
        let body = br#"{"status":"error","errorType":"...","error":"cannot select more than -search.maxSamplesPerQuery=1000000"}"#;
        assert!(body_reports_sample_limit(body));
        assert!(!body_reports_sample_limit(b"not an error"));
    }

    #[test]
    fn splits_json_lines_roughly_in_half() {
        let body = b"{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n{\"a\":4}".to_vec();
        let halves = split_json_lines_in_half(&body).unwrap();
        assert_eq!(halves.len(), 2);
        assert_eq!(halves[0], b"{\"a\":1}\n{\"a\":2}".to_vec());
        assert_eq!(halves[1], b"{\"a\":3}\n{\"a\":4}".to_vec());
    }

    #[test]
    fn single_line_body_cannot_be_split_further() {
        assert!(split_json_lines_in_half(b"{\"a\":1}").is_err());
    }

    #[test]
    fn gzip_round_trips() {
        let body = b"hello metrics".to_vec();
        let compressed = gzip(&body).unwrap();
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, body);
    }
}
