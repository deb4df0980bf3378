// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared HTTP client builder: stateless and shared, per-host connection
//! cap = 2, idle duration = 1 min, used by the
//! VictoriaMetrics adapter and the Selector Resolver's Grafana calls.
//! Idempotent-retry attempts (5) are implemented
//! here as a thin wrapper rather than a client setting, since `reqwest`
//! itself has no retry policy - only the callers that make idempotent GETs
//! use [`get_with_retries`].

use pmm_dump_domain::error::{DumpError, DumpResult};
use reqwest::{Client, Response};
use std::time::Duration;

const POOL_MAX_IDLE_PER_HOST: usize = 2;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_ATTEMPTS: u32 = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Builds the client every adapter shares. `allow_insecure_certs` maps to
/// `--allow-insecure-certs`, for self-signed PMM server deployments.
pub fn build_client(allow_insecure_certs: bool) -> DumpResult<Client> {
    Client::builder()
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .danger_accept_invalid_certs(allow_insecure_certs)
        .build()
        .map_err(|e| DumpError::network(format!("failed to build HTTP client: {e}")))
}

/// Retries a GET up to [`RETRY_ATTEMPTS`] times on network-level failure or
/// a 5xx response. Non-retryable client errors (4xx) return immediately.
pub async fn get_with_retries(client: &Client, url: &str) -> DumpResult<Response> {
    let mut last_err = None;
    for attempt in 0..RETRY_ATTEMPTS {
        match client.get(url).send().await {
            Ok(resp) if !resp.status().is_server_error() => return Ok(resp),
            Ok(resp) => last_err = Some(DumpError::network(format!("{url}: server error {}", resp.status()))),
            Err(e) => last_err = Some(DumpError::network(format!("{url}: {e}"))),
        }
        if attempt + 1 < RETRY_ATTEMPTS {
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    }
    Err(last_err.unwrap_or_else(|| DumpError::network(format!("{url}: exhausted retries"))))
}
