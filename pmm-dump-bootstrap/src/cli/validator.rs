// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Parse-then-validate split: everything
//! in [`super::parser`] is untrusted strings; everything here is either a
//! validated, typed value or a fatal [`ParseError`] raised before any I/O
//! happens, .

use super::parser::{Cli, Commands, ConnectionArgs, DumpArgs, EncryptionArgs};
use chrono::{DateTime, Duration, Utc};
use pmm_dump_domain::Thresholds;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },
    #[error("{0}")]
    Validation(#[from] pmm_dump_domain::DumpError),
}

impl ParseError {
    fn invalid(arg: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            arg: arg.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    /// The original invocation, credential flags replaced with `***`,
    /// recorded verbatim into `Meta.arguments`.
    pub masked_arguments: String,
}

#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Export(ExportArgs),
    Import(ImportArgs),
    ShowMeta { path: PathBuf, json: bool, password: Option<String> },
    Version,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub pmm_url: String,
    pub pmm_user: Option<String>,
    pub pmm_pass: Option<String>,
    pub pmm_token: Option<String>,
    pub pmm_cookie: Option<String>,
    pub allow_insecure_certs: bool,
}

#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub dump_path: Option<PathBuf>,
    pub dump_core: bool,
    pub dump_qan: bool,
    pub workers: Option<usize>,
    pub vm_native_data: bool,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
}

#[derive(Debug, Clone)]
pub enum EncryptionMode {
    Disabled,
    Password(String),
    PasswordFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ExportArgs {
    pub connection: ConnectionConfig,
    pub dump: DumpConfig,
    pub encryption: EncryptionMode,
    pub just_key: bool,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub ts_selector: Option<String>,
    pub r#where: Option<String>,
    pub instances: Vec<String>,
    pub dashboards: Vec<String>,
    pub chunk_time_range: Duration,
    pub chunk_rows: u64,
    pub ignore_load: bool,
    pub thresholds: Thresholds,
    pub stdout: bool,
    pub export_services_info: bool,
}

#[derive(Debug, Clone)]
pub struct ImportArgs {
    pub connection: ConnectionConfig,
    pub dump: DumpConfig,
    pub encryption: EncryptionMode,
    pub just_key: bool,
    pub vm_content_limit: u64,
}

pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = super::parser::parse_cli();
    let masked_arguments = mask_credentials(&std::env::args().collect::<Vec<_>>());
    validate_cli(cli, masked_arguments)
}

fn validate_cli(cli: Cli, masked_arguments: String) -> Result<ValidatedCli, ParseError> {
    let command = match cli.command {
        Commands::Export {
            connection,
            dump,
            encryption,
            start_ts,
            end_ts,
            ts_selector,
            r#where,
            instances,
            dashboards,
            chunk_time_range,
            chunk_rows,
            ignore_load,
            max_load,
            critical_load,
            stdout,
            export_services_info,
        } => {
            let end_ts = match end_ts {
                Some(s) => parse_rfc3339("end-ts", &s)?,
                None => Utc::now(),
            };
            let start_ts = match start_ts {
                Some(s) => parse_rfc3339("start-ts", &s)?,
                None => end_ts - Duration::hours(4),
            };
            if start_ts >= end_ts {
                return Err(ParseError::invalid("start-ts", "must be before --end-ts"));
            }
            let thresholds = Thresholds::parse(&max_load, &critical_load)?;
            ValidatedCommand::Export(ExportArgs {
                connection: validate_connection(connection)?,
                dump: validate_dump(dump)?,
                encryption: validate_encryption(&encryption)?,
                just_key: encryption.just_key,
                start_ts,
                end_ts,
                ts_selector,
                r#where,
                instances,
                dashboards,
                chunk_time_range: parse_go_duration("chunk-time-range", &chunk_time_range)?,
                chunk_rows,
                ignore_load,
                thresholds,
                stdout,
                export_services_info,
            })
        }
        Commands::Import {
            connection,
            dump,
            encryption,
            vm_content_limit,
        } => ValidatedCommand::Import(ImportArgs {
            connection: validate_connection(connection)?,
            dump: validate_dump(dump)?,
            encryption: validate_encryption(&encryption)?,
            just_key: encryption.just_key,
            vm_content_limit,
        }),
        Commands::ShowMeta { path, json, pass, pass_filepath } => {
            if !path.exists() {
                return Err(ParseError::invalid("path", format!("`{}` does not exist", path.display())));
            }
            let password = match (pass, pass_filepath) {
                (Some(pass), _) => Some(pass),
                (None, Some(path)) => Some(
                    std::fs::read_to_string(&path)
                        .map_err(|e| ParseError::invalid("pass-filepath", e.to_string()))?
                        .trim()
                        .to_string(),
                ),
                (None, None) => None,
            };
            ValidatedCommand::ShowMeta {
                path: path.canonicalize().map_err(|e| ParseError::invalid("path", e.to_string()))?,
                json,
                password,
            }
        }
        Commands::Version => ValidatedCommand::Version,
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        masked_arguments,
    })
}

fn validate_connection(c: ConnectionArgs) -> Result<ConnectionConfig, ParseError> {
    if !c.pmm_url.starts_with("http://") && !c.pmm_url.starts_with("https://") {
        return Err(ParseError::invalid("pmm-url", "must start with http:// or https://"));
    }
    if c.pmm_user.is_none() && c.pmm_token.is_none() && c.pmm_cookie.is_none() {
        return Err(ParseError::invalid(
            "pmm-user",
            "one of --pmm-user/--pmm-pass, --pmm-token, or --pmm-cookie is required",
        ));
    }
    Ok(ConnectionConfig {
        pmm_url: c.pmm_url.trim_end_matches('/').to_string(),
        pmm_user: c.pmm_user,
        pmm_pass: c.pmm_pass,
        pmm_token: c.pmm_token,
        pmm_cookie: c.pmm_cookie,
        allow_insecure_certs: c.allow_insecure_certs,
    })
}

fn validate_dump(d: DumpArgs) -> Result<DumpConfig, ParseError> {
    if !d.dump_core && !d.dump_qan {
        return Err(ParseError::invalid(
            "dump-core",
            "at least one of --dump-core or --dump-qan must be enabled",
        ));
    }
    if let Some(workers) = d.workers {
        if workers == 0 || workers > 128 {
            return Err(ParseError::invalid("workers", "must be between 1 and 128"));
        }
    }
    Ok(DumpConfig {
        dump_path: d.dump_path,
        dump_core: d.dump_core,
        dump_qan: d.dump_qan,
        workers: d.workers,
        vm_native_data: d.vm_native_data,
        clickhouse_url: d.clickhouse_url,
        clickhouse_database: d.clickhouse_database,
        clickhouse_user: d.clickhouse_user,
        clickhouse_password: d.clickhouse_password,
    })
}

fn validate_encryption(e: &EncryptionArgs) -> Result<EncryptionMode, ParseError> {
    if e.no_encryption {
        if e.pass.is_some() || e.pass_filepath.is_some() {
            return Err(ParseError::invalid(
                "no-encryption",
                "conflicts with --pass/--pass-filepath",
            ));
        }
        return Ok(EncryptionMode::Disabled);
    }
    if let Some(path) = &e.pass_filepath {
        if !e.force_pass_filepath && !path.exists() {
            return Err(ParseError::invalid(
                "pass-filepath",
                format!("`{}` does not exist (use --force-pass-filepath to create it)", path.display()),
            ));
        }
        return Ok(EncryptionMode::PasswordFile(path.clone()));
    }
    if let Some(pass) = &e.pass {
        if pass.is_empty() {
            return Err(ParseError::invalid("pass", "must not be empty"));
        }
        return Ok(EncryptionMode::Password(pass.clone()));
    }
    Err(ParseError::invalid(
        "pass",
        "one of --no-encryption, --pass, or --pass-filepath is required",
    ))
}

fn parse_rfc3339(arg: &str, s: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ParseError::invalid(arg, e.to_string()))
}

/// Parses a Go-style single-unit duration string ("5m", "1h", "30s",
/// "250ms") - the subset  actually needs for
/// `--chunk-time-range`.
fn parse_go_duration(arg: &str, s: &str) -> Result<Duration, ParseError> {
    let s = s.trim();
    let split_at = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ParseError::invalid(arg, "missing unit suffix (s, m, h, ms)"))?;
    let (value, unit) = s.split_at(split_at);
    let value: i64 = value.parse().map_err(|_| ParseError::invalid(arg, "not a number"))?;
    match unit {
        "ms" => Ok(Duration::milliseconds(value)),
        "s" => Ok(Duration::seconds(value)),
        "m" => Ok(Duration::minutes(value)),
        "h" => Ok(Duration::hours(value)),
        other => Err(ParseError::invalid(arg, format!("unknown unit `{other}`"))),
    }
}

const SECRET_FLAGS: [&str; 4] = ["--pmm-pass", "--pmm-token", "--pmm-cookie", "--pass"];

/// Replaces the value following any credential flag with `***`, the way
/// `Meta.arguments` must never leak a secret into an
/// archive that could be shared for support purposes.
fn mask_credentials(argv: &[String]) -> String {
    let mut out = Vec::with_capacity(argv.len());
    let mut mask_next = false;
    for arg in argv {
        if mask_next {
            out.push("***".to_string());
            mask_next = false;
            continue;
        }
        if let Some((flag, _)) = arg.split_once('=') {
            if SECRET_FLAGS.contains(&flag) {
                out.push(format!("{flag}=***"));
                continue;
            }
        }
        if SECRET_FLAGS.contains(&arg.as_str()) {
            mask_next = true;
        }
        out.push(arg.clone());
    }
    out.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_separated_and_equals_form_credentials() {
        let argv = vec![
            "pmm-dump".into(),
            "export".into(),
            "--pmm-pass".into(),
            "hunter2".into(),
            "--pmm-token=abc123".into(),
        ];
        let masked = mask_credentials(&argv);
        assert_eq!(masked, "pmm-dump export --pmm-pass *** --pmm-token=***");
    }

    #[test]
    fn go_duration_parses_minutes_and_hours() {
        assert_eq!(parse_go_duration("x", "5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_go_duration("x", "1h").unwrap(), Duration::hours(1));
    }

    #[test]
    fn rejects_start_after_end() {
        let cli = Cli {
            verbose: false,
            command: Commands::Export {
                connection: ConnectionArgs {
                    pmm_url: "https://pmm.example.com".into(),
                    pmm_user: Some("admin".into()),
                    pmm_pass: Some("pw".into()),
                    pmm_token: None,
                    pmm_cookie: None,
                    allow_insecure_certs: false,
                },
                dump: DumpArgs {
                    dump_path: None,
                    dump_core: true,
                    dump_qan: false,
                    workers: None,
                    vm_native_data: false,
                    clickhouse_url: "http://127.0.0.1:8123".into(),
                    clickhouse_database: "pmm".into(),
                    clickhouse_user: None,
                    clickhouse_password: None,
                },
                encryption: EncryptionArgs {
                    no_encryption: true,
                    pass: None,
                    pass_filepath: None,
                    force_pass_filepath: false,
                    just_key: false,
                },
                start_ts: Some("2025-01-02T00:00:00Z".into()),
                end_ts: Some("2025-01-01T00:00:00Z".into()),
                ts_selector: None,
                r#where: None,
                instances: vec![],
                dashboards: vec![],
                chunk_time_range: "5m".into(),
                chunk_rows: 100_000,
                ignore_load: true,
                max_load: String::new(),
                critical_load: String::new(),
                stdout: false,
                export_services_info: false,
            },
        };
        assert!(validate_cli(cli, String::new()).is_err());
    }
}
