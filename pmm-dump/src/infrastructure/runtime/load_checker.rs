// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Load Checker background task: samples every
//! configured [`ThresholdKey`] once per tick, folds the results through the
//! pure [`classify`] rule, and exposes the latest `(status,
//! consecutive_same_count)` behind a read-write lock for reader workers to
//! poll between chunks.

use async_trait::async_trait;
use parking_lot::RwLock;
use pmm_dump_domain::error::DumpResult;
use pmm_dump_domain::services::load_checker::{classify, LoadSampler};
use pmm_dump_domain::value_objects::{LatestStatus, LoadStatus, ThresholdKey, Thresholds};
use reqwest::Client;
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::infrastructure::http_client;

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_WAIT_STATUS_IN_SEQUENCE: u32 = 10;

/// Samples `CPU`/`RAM` against the PMM server's own `/api/v1/query`.
pub struct RemoteLoadSampler {
    client: Client,
    base_url: String,
}

impl RemoteLoadSampler {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }

    fn promql_for(key: ThresholdKey) -> &'static str {
        match key {
            ThresholdKey::Cpu => r#"100 - (avg(rate(node_cpu_seconds_total{mode="idle"}[1m])) * 100)"#,
            ThresholdKey::Ram => "100 * (1 - (node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes))",
            ThresholdKey::MyRam => "",
        }
    }
}

#[async_trait]
impl LoadSampler for RemoteLoadSampler {
    async fn sample(&self, key: ThresholdKey) -> DumpResult<f64> {
        let expr = Self::promql_for(key);
        let url = format!("{}/api/v1/query?query={}", self.base_url, urlencode(expr));
        let response = http_client::get_with_retries(&self.client, &url).await?;
        let body: Json = response.json().await.map_err(|e| pmm_dump_domain::error::DumpError::network(e.to_string()))?;
        body["data"]["result"][0]["value"][1]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| pmm_dump_domain::error::DumpError::network(format!("no scalar result sampling {key}")))
    }
}

/// Samples `MYRAM`: the dumper's own resident memory divided by host total
/// memory, sampled locally rather than over the network.
pub struct LocalRamSampler {
    total_memory: u64,
}

impl LocalRamSampler {
    pub fn new(total_memory: u64) -> Self {
        Self { total_memory }
    }
}

#[async_trait]
impl LoadSampler for LocalRamSampler {
    async fn sample(&self, _key: ThresholdKey) -> DumpResult<f64> {
        let rss = self_resident_memory_bytes()?;
        Ok(100.0 * rss as f64 / self.total_memory as f64)
    }
}

#[cfg(unix)]
fn self_resident_memory_bytes() -> DumpResult<u64> {
    // `ru_maxrss` is kibibytes on Linux; this is an approximation of
    // current RSS (it is a running maximum, not instantaneous), adequate
    // for a load-shedding heuristic sampled once a second.
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
            return Err(pmm_dump_domain::error::DumpError::internal("getrusage failed"));
        }
        Ok(usage.ru_maxrss as u64 * 1024)
    }
}

#[cfg(not(unix))]
fn self_resident_memory_bytes() -> DumpResult<u64> {
    Err(pmm_dump_domain::error::DumpError::internal("MYRAM sampling is not supported on this platform"))
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

/// The polling loop itself: every [`SAMPLE_INTERVAL`], samples each
/// configured threshold key (remote for `CPU`/`RAM`, local for `MYRAM`),
/// classifies the tick, and publishes the result. On sampling failure the
/// status becomes `Wait`.
pub struct LoadChecker {
    thresholds: Thresholds,
    remote: RemoteLoadSampler,
    local_ram: LocalRamSampler,
    latest: RwLock<LatestStatus>,
}

impl LoadChecker {
    pub fn new(thresholds: Thresholds, remote: RemoteLoadSampler, local_ram: LocalRamSampler) -> Arc<Self> {
        Arc::new(Self { thresholds, remote, local_ram, latest: RwLock::new(LatestStatus::default()) })
    }

    pub fn latest(&self) -> LatestStatus {
        *self.latest.read()
    }

    pub(crate) async fn tick(&self) {
        if self.thresholds.is_empty() {
            let current = *self.latest.read();
            *self.latest.write() = current.advance(LoadStatus::Ok);
            return;
        }

        let mut samples = Vec::new();
        for (key, _) in self.thresholds.iter() {
            let sampler: &dyn LoadSampler = if *key == ThresholdKey::MyRam { &self.local_ram } else { &self.remote };
            match sampler.sample(*key).await {
                Ok(value) => samples.push((*key, value)),
                Err(e) => {
                    warn!(%key, error = %e, "load sample failed, treating tick as WAIT");
                    let current = *self.latest.read();
                    *self.latest.write() = current.advance(LoadStatus::Wait);
                    return;
                }
            }
        }

        let status = classify(&self.thresholds, &samples);
        debug!(%status, "load checker tick");
        let current = *self.latest.read();
        *self.latest.write() = current.advance(status);
    }

    /// Spawns the background polling task. The task exits once `cancel` is
    /// triggered.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => self.tick().await,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmm_dump_domain::value_objects::Threshold;

    #[tokio::test]
    async fn empty_thresholds_reports_ok_without_sampling() {
        let checker = LoadChecker::new(
            Thresholds::new(),
            RemoteLoadSampler::new(Client::new(), "http://unused"),
            LocalRamSampler::new(1),
        );
        checker.tick().await;
        assert_eq!(checker.latest().status, LoadStatus::Ok);
    }

    #[tokio::test]
    async fn local_ram_sampler_reports_a_percentage() {
        let sampler = LocalRamSampler::new(1024 * 1024 * 1024 * 1024);
        let pct = sampler.sample(ThresholdKey::MyRam).await.unwrap();
        assert!(pct >= 0.0 && pct < 100.0);
    }

    #[test]
    fn max_wait_status_in_sequence_is_ten() {
        assert_eq!(MAX_WAIT_STATUS_IN_SEQUENCE, 10);
    }

    #[test]
    fn promql_is_defined_for_remote_keys() {
        assert!(!RemoteLoadSampler::promql_for(ThresholdKey::Cpu).is_empty());
        assert!(!RemoteLoadSampler::promql_for(ThresholdKey::Ram).is_empty());
    }

    fn thresholds_with_myram() -> Thresholds {
        let mut t = Thresholds::new();
        t.insert(ThresholdKey::MyRam, Threshold::new(1.0, 2.0));
        t
    }

    #[tokio::test]
    async fn myram_over_threshold_reports_wait_or_terminate() {
        // total_memory of 1 byte guarantees the sampled percentage is huge.
        let checker = LoadChecker::new(thresholds_with_myram(), RemoteLoadSampler::new(Client::new(), "http://unused"), LocalRamSampler::new(1));
        checker.tick().await;
        assert_ne!(checker.latest().status, LoadStatus::None);
    }
}
