// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `clap` derive surface. This module only parses; it
//! does not canonicalize paths, mask credentials, or reject out-of-range
//! values - that is [`super::validator`]'s job.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pmm-dump", version, about = "Export and import PMM monitoring data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Raise the log level from info to debug.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read from PMM, produce an archive.
    Export {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        dump: DumpArgs,
        #[command(flatten)]
        encryption: EncryptionArgs,

        /// RFC3339 start of the export window. Defaults to 4 hours ago.
        #[arg(long)]
        start_ts: Option<String>,
        /// RFC3339 end of the export window. Defaults to now.
        #[arg(long)]
        end_ts: Option<String>,
        /// Explicit VictoriaMetrics `match[]` selector, e.g. `{__name__=~"up"}`.
        /// Combined with any `--dashboard`/`--instance`-derived selectors.
        #[arg(long)]
        ts_selector: Option<String>,
        /// Extra ClickHouse `WHERE` clause, ANDed with the time-range filter.
        #[arg(long)]
        r#where: Option<String>,
        /// Service instance to scope dashboard-derived selectors to (repeatable).
        #[arg(long = "instance")]
        instances: Vec<String>,
        /// Grafana dashboard name or UID to derive selectors from (repeatable).
        #[arg(long = "dashboard")]
        dashboards: Vec<String>,
        /// VictoriaMetrics chunk width, e.g. "5m", "1h".
        #[arg(long, default_value = "5m")]
        chunk_time_range: String,
        /// ClickHouse rows per chunk.
        #[arg(long, default_value_t = 100_000)]
        chunk_rows: u64,
        /// Skip Load Checker sampling entirely.
        #[arg(long)]
        ignore_load: bool,
        /// `KEY=PCT[,KEY=PCT...]` WAIT thresholds, e.g. "CPU=80,RAM=85".
        #[arg(long, default_value = "")]
        max_load: String,
        /// `KEY=PCT[,KEY=PCT...]` TERMINATE thresholds.
        #[arg(long, default_value = "")]
        critical_load: String,
        /// Write the archive to stdout instead of `--dump-path`.
        #[arg(long)]
        stdout: bool,
        /// Record the PMM server's active service list into `meta.json`.
        #[arg(long)]
        export_services_info: bool,
    },
    /// Ingest an archive into PMM.
    Import {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        dump: DumpArgs,
        #[command(flatten)]
        encryption: EncryptionArgs,

        /// Max gzip-encoded body size per VictoriaMetrics import POST, before
        /// adaptive splitting on HTTP 413.
        #[arg(long, default_value_t = 10 * 1024 * 1024)]
        vm_content_limit: u64,
    },
    /// Print an archive's manifest without importing it.
    ShowMeta {
        /// Path to the dump file.
        path: PathBuf,
        /// Emit the manifest as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
        /// Password, if the archive is encrypted.
        #[arg(long)]
        pass: Option<String>,
        /// Read the password from a file instead of `--pass`.
        #[arg(long)]
        pass_filepath: Option<PathBuf>,
    },
    /// Print build identifiers.
    Version,
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    #[arg(long, env = "PMM_URL")]
    pub pmm_url: String,
    #[arg(long, env = "PMM_USER")]
    pub pmm_user: Option<String>,
    #[arg(long, env = "PMM_PASS")]
    pub pmm_pass: Option<String>,
    #[arg(long, env = "PMM_TOKEN")]
    pub pmm_token: Option<String>,
    #[arg(long, env = "PMM_COOKIE")]
    pub pmm_cookie: Option<String>,
    #[arg(long)]
    pub allow_insecure_certs: bool,
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    /// Archive path (export: write target; import: read source).
    #[arg(short = 'd', long)]
    pub dump_path: Option<PathBuf>,
    #[arg(long, default_value_t = true)]
    pub dump_core: bool,
    #[arg(long)]
    pub dump_qan: bool,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub vm_native_data: bool,
    /// ClickHouse HTTP endpoint backing the QAN `metrics` table.
    #[arg(long, default_value = "http://127.0.0.1:8123")]
    pub clickhouse_url: String,
    /// ClickHouse database containing the QAN `metrics` table.
    #[arg(long, default_value = "pmm")]
    pub clickhouse_database: String,
    #[arg(long)]
    pub clickhouse_user: Option<String>,
    #[arg(long)]
    pub clickhouse_password: Option<String>,
}

#[derive(Debug, Args)]
pub struct EncryptionArgs {
    #[arg(long)]
    pub no_encryption: bool,
    #[arg(long)]
    pub pass: Option<String>,
    #[arg(long)]
    pub pass_filepath: Option<PathBuf>,
    #[arg(long)]
    pub force_pass_filepath: bool,
    /// Print the derived key/password and exit, without running the
    /// command. Suppresses all other log output.
    #[arg(long)]
    pub just_key: bool,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
