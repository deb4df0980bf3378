// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `show-meta`: prints an archive's manifest without importing anything.
//! `meta.json` sits inside the same tar/gzip/AES
//! pipeline as everything else, so an encrypted archive still needs
//! `--pass`/`--pass-filepath` just to read its manifest.

use pmm_dump_domain::error::DumpResult;
use pmm_dump_domain::services::ArchiveReader;

use crate::application::commands::ShowMetaCommand;
use crate::infrastructure::adapters::archive::TarGzArchiveReader;
use crate::infrastructure::meta::{read_meta_from_dump, render_human, render_json};

pub fn run(cmd: ShowMetaCommand) -> DumpResult<()> {
    let file = std::fs::File::open(&cmd.path)?;
    let mut reader: Box<dyn ArchiveReader> = Box::new(TarGzArchiveReader::new(Box::new(file), cmd.password.as_deref())?);
    let meta = read_meta_from_dump(reader.as_mut())?;

    if cmd.json {
        println!("{}", render_json(&meta)?);
    } else {
        print!("{}", render_human(&meta));
    }
    Ok(())
}
