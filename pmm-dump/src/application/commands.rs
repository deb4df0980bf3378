// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Application-layer commands: the bootstrap crate's `ValidatedCommand`
//! variants, re-shaped into the vocabulary the use cases actually consume.
//! The one piece of real work done here rather than in bootstrap is
//! encryption-password resolution - `EncryptionMode` names *where* the
//! password comes from, not what it *is*.

use pmm_dump_bootstrap::cli::validator::{ConnectionConfig, DumpConfig, EncryptionMode, ExportArgs, ImportArgs};
use pmm_dump_domain::error::{DumpError, DumpResult};
use rand::Rng;
use std::path::{Path, PathBuf};

/// An export, with its password already resolved and its masked argument
/// string carried along for `meta.json`.
pub struct ExportCommand {
    pub connection: ConnectionConfig,
    pub dump: DumpConfig,
    pub password: Option<String>,
    pub just_key: bool,
    pub start_ts: chrono::DateTime<chrono::Utc>,
    pub end_ts: chrono::DateTime<chrono::Utc>,
    pub ts_selector: Option<String>,
    pub r#where: Option<String>,
    pub instances: Vec<String>,
    pub dashboards: Vec<String>,
    pub chunk_time_range: chrono::Duration,
    pub chunk_rows: u64,
    pub ignore_load: bool,
    pub thresholds: pmm_dump_domain::Thresholds,
    pub stdout: bool,
    pub export_services_info: bool,
    pub masked_arguments: String,
}

impl ExportCommand {
    pub fn from_args(args: ExportArgs, masked_arguments: String) -> DumpResult<Self> {
        let password = resolve_encryption(&args.encryption)?;
        Ok(Self {
            connection: args.connection,
            dump: args.dump,
            password,
            just_key: args.just_key,
            start_ts: args.start_ts,
            end_ts: args.end_ts,
            ts_selector: args.ts_selector,
            r#where: args.r#where,
            instances: args.instances,
            dashboards: args.dashboards,
            chunk_time_range: args.chunk_time_range,
            chunk_rows: args.chunk_rows,
            ignore_load: args.ignore_load,
            thresholds: args.thresholds,
            stdout: args.stdout,
            export_services_info: args.export_services_info,
            masked_arguments,
        })
    }
}

/// An import, with its password resolved the same way.
pub struct ImportCommand {
    pub connection: ConnectionConfig,
    pub dump: DumpConfig,
    pub password: Option<String>,
    pub just_key: bool,
    pub vm_content_limit: u64,
}

impl ImportCommand {
    pub fn from_args(args: ImportArgs) -> DumpResult<Self> {
        let password = resolve_encryption(&args.encryption)?;
        Ok(Self {
            connection: args.connection,
            dump: args.dump,
            password,
            just_key: args.just_key,
            vm_content_limit: args.vm_content_limit,
        })
    }
}

pub struct ShowMetaCommand {
    pub path: PathBuf,
    pub json: bool,
    pub password: Option<String>,
}

/// Resolves an [`EncryptionMode`] into the actual password bytes, per the
/// "password is either user-provided or a hex-encoded 16-character random
/// string" rule: `--pass` is used verbatim, `--pass-filepath` is read if it
/// exists and otherwise freshly generated and written there (the validator
/// only accepts a missing path when `--force-pass-filepath` allowed it).
pub fn resolve_encryption(mode: &EncryptionMode) -> DumpResult<Option<String>> {
    match mode {
        EncryptionMode::Disabled => Ok(None),
        EncryptionMode::Password(password) => Ok(Some(password.clone())),
        EncryptionMode::PasswordFile(path) => Ok(Some(password_from_file(path)?)),
    }
}

fn password_from_file(path: &Path) -> DumpResult<String> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        return Ok(contents.trim().to_string());
    }
    let password = generate_random_password();
    std::fs::write(path, &password).map_err(|e| DumpError::encryption(format!("could not write generated password to `{}`: {e}", path.display())))?;
    Ok(password)
}

/// A hex-encoded 16-character random string.
pub fn generate_random_password() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_mode_resolves_to_no_password() {
        assert!(resolve_encryption(&EncryptionMode::Disabled).unwrap().is_none());
    }

    #[test]
    fn explicit_password_passes_through_unchanged() {
        let resolved = resolve_encryption(&EncryptionMode::Password("hunter2".into())).unwrap();
        assert_eq!(resolved.as_deref(), Some("hunter2"));
    }

    #[test]
    fn password_file_is_read_back_when_it_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pw.txt");
        std::fs::write(&path, "from-file\n").unwrap();
        let resolved = resolve_encryption(&EncryptionMode::PasswordFile(path)).unwrap();
        assert_eq!(resolved.as_deref(), Some("from-file"));
    }

    #[test]
    fn missing_password_file_is_generated_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pw.txt");
        let resolved = resolve_encryption(&EncryptionMode::PasswordFile(path.clone())).unwrap().unwrap();
        assert_eq!(resolved.len(), 16);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), resolved);
    }

    #[test]
    fn generated_passwords_are_sixteen_hex_characters() {
        let password = generate_random_password();
        assert_eq!(password.len(), 16);
        assert!(password.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
