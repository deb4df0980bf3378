// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Orchestrates infrastructure adapters into the four commands the CLI
//! exposes. Everything here is I/O-shaped glue; the actual algorithms live
//! in `pmm-dump-domain` and `crate::infrastructure`.

pub mod commands;
pub mod use_cases;
