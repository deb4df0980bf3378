// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Meta & Versioning: scanning an archive for its
//! `meta.json` manifest, and the version-compatibility check performed
//! before an import is allowed to proceed.

use pmm_dump_domain::error::{DumpError, DumpResult};
use pmm_dump_domain::services::ArchiveReader;
use pmm_dump_domain::value_objects::Meta;
use tracing::warn;

/// Scans `reader` forward until `meta.json` is found and returns the
/// parsed manifest. Does not rewind: callers that also need the archive's
/// data entries must open a second reader over the same source.
pub fn read_meta_from_dump(reader: &mut dyn ArchiveReader) -> DumpResult<Meta> {
    while let Some(header) = reader.next_header()? {
        if header.name == "meta.json" {
            let bytes = reader.read_all()?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        reader.read_all()?;
    }
    Err(DumpError::corrupt_archive("archive has no meta.json entry"))
}

/// Compares the archive's recorded build identifiers against the running
/// binary's own: a mismatch only warns, it never
/// fails the import.
pub fn warn_on_version_mismatch(archive_meta: &Meta, running_git_commit: &str) {
    if !Meta::is_supported_pmm_version(&archive_meta.pmm_server_version) {
        warn!(
            archive_version = %archive_meta.pmm_server_version,
            minimum = Meta::MIN_SUPPORTED_PMM_VERSION,
            "archive was produced by a pmmServerVersion below the minimum this binary supports"
        );
    }
    if !archive_meta.version.git_commit.is_empty() && archive_meta.version.git_commit != running_git_commit {
        warn!(
            archive_commit = %archive_meta.version.git_commit,
            running_commit = running_git_commit,
            "archive was produced by a different pmm-dump build"
        );
    }
}

/// Human-readable rendering for the `show-meta` command, which prints the
/// manifest either as formatted human text or as JSON.
pub fn render_human(meta: &Meta) -> String {
    let mut out = String::new();
    out.push_str(&format!("PMM server version: {}\n", meta.pmm_server_version));
    out.push_str(&format!(
        "Build:              {} ({})\n",
        meta.version.git_branch, meta.version.git_commit
    ));
    out.push_str(&format!("Max chunk size:     {} bytes\n", meta.max_chunk_size));
    out.push_str(&format!(
        "PMM timezone:       {}\n",
        meta.pmm_timezone.as_deref().unwrap_or("browser (client-local)")
    ));
    out.push_str(&format!("VM data format:     {}\n", meta.vm_data_format));
    out.push_str(&format!("Arguments:          {}\n", meta.arguments));
    if let Some(services) = &meta.pmm_server_services {
        out.push_str(&format!("Services:           {}\n", services.join(", ")));
    }
    out
}

/// JSON rendering for `show-meta --json`.
pub fn render_json(meta: &Meta) -> DumpResult<String> {
    Ok(serde_json::to_string_pretty(meta)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmm_dump_domain::services::EntryHeader;
    use pmm_dump_domain::value_objects::{VersionInfo, VmDataFormat};

    struct ScriptedReader {
        entries: std::vec::IntoIter<(&'static str, Vec<u8>)>,
        pending: Option<Vec<u8>>,
    }

    impl ArchiveReader for ScriptedReader {
        fn next_header(&mut self) -> DumpResult<Option<EntryHeader>> {
            match self.entries.next() {
                Some((name, body)) => {
                    self.pending = Some(body);
                    Ok(Some(EntryHeader::new(name, 0)))
                }
                None => Ok(None),
            }
        }

        fn read_all(&mut self) -> DumpResult<Vec<u8>> {
            Ok(self.pending.take().unwrap_or_default())
        }
    }

    fn sample_meta() -> Meta {
        Meta {
            version: VersionInfo {
                git_branch: "main".into(),
                git_commit: "abc123".into(),
            },
            pmm_server_version: "2.40.0".into(),
            max_chunk_size: 1024,
            pmm_timezone: Some("UTC".into()),
            arguments: "export --dump-path out.tar.gz".into(),
            vm_data_format: VmDataFormat::Json,
            pmm_server_services: Some(vec!["mysql".into()]),
        }
    }

    #[test]
    fn finds_meta_json_past_unrelated_entries() {
        let meta_bytes = serde_json::to_vec(&sample_meta()).unwrap();
        let mut reader = ScriptedReader {
            entries: vec![("vm/1-2.bin", b"payload".to_vec()), ("meta.json", meta_bytes), ("log.json", b"[]".to_vec())].into_iter(),
            pending: None,
        };
        let found = read_meta_from_dump(&mut reader).unwrap();
        assert_eq!(found.pmm_server_version, "2.40.0");
    }

    #[test]
    fn missing_meta_json_is_a_corrupt_archive_error() {
        let mut reader = ScriptedReader {
            entries: vec![("vm/1-2.bin", b"payload".to_vec())].into_iter(),
            pending: None,
        };
        assert!(matches!(read_meta_from_dump(&mut reader), Err(DumpError::CorruptArchive(_))));
    }

    #[test]
    fn human_rendering_includes_every_field() {
        let text = render_human(&sample_meta());
        assert!(text.contains("2.40.0"));
        assert!(text.contains("main (abc123)"));
        assert!(text.contains("mysql"));
    }

    #[test]
    fn json_rendering_round_trips() {
        let json = render_json(&sample_meta()).unwrap();
        let back: Meta = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pmm_server_version, sample_meta().pmm_server_version);
    }

    #[test]
    fn old_pmm_server_version_warns_but_does_not_panic() {
        let mut m = sample_meta();
        m.pmm_server_version = "1.0.0".into();
        warn_on_version_mismatch(&m, "abc123");
    }
}
