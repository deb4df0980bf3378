// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Immutable, source-agnostic data that flows through the transfer engine
//! and the archive on disk.

mod chunk;
mod chunk_meta;
mod column_type;
mod load_status;
mod meta;
mod source_type;
mod threshold;

pub use chunk::Chunk;
pub use chunk_meta::ChunkMeta;
pub use column_type::{ColumnType, ColumnValue};
pub use load_status::{LatestStatus, LoadStatus};
pub use meta::{Meta, VersionInfo, VmDataFormat};
pub use source_type::SourceType;
pub use threshold::{Threshold, ThresholdKey, Thresholds};
