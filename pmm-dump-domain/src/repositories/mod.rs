// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! In-process, no-persistence "repositories" - structures that own shared
//! mutable state under their own lock; here there is nothing to persist,
//! only a pool of work items to guard.

mod chunk_pool;

pub use chunk_pool::ChunkPool;
