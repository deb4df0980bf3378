// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete adapters, the transfer engine, and the CLI command handlers
//! that implement the ports declared in `pmm-dump-domain`.

pub mod application;
pub mod infrastructure;
