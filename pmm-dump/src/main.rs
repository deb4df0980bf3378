// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

use pmm_dump::application::commands::{ExportCommand, ImportCommand, ShowMetaCommand};
use pmm_dump::application::use_cases::{export, import, show_meta, version};
use pmm_dump_bootstrap::{bootstrap_cli, logger, result_to_exit_code, ShutdownCoordinator, ValidatedCommand};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    result_to_exit_code(run().await)
}

async fn run() -> anyhow::Result<()> {
    let cli = bootstrap_cli()?;

    let just_key = match &cli.command {
        ValidatedCommand::Export(args) => args.just_key,
        ValidatedCommand::Import(args) => args.just_key,
        _ => false,
    };
    if !just_key {
        logger::init_tracing(cli.verbose);
    }

    let shutdown = ShutdownCoordinator::default();
    shutdown.spawn_signal_listener();

    match cli.command {
        ValidatedCommand::Export(args) => {
            let cmd = ExportCommand::from_args(args, cli.masked_arguments)?;
            export::run(cmd, shutdown.token()).await?;
        }
        ValidatedCommand::Import(args) => {
            let cmd = ImportCommand::from_args(args)?;
            import::run(cmd, shutdown.token()).await?;
        }
        ValidatedCommand::ShowMeta { path, json, password } => {
            show_meta::run(ShowMetaCommand { path, json, password })?;
        }
        ValidatedCommand::Version => version::run(),
    }
    Ok(())
}
