// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Chunk Pool: a thread-safe FIFO of `ChunkMeta`
//! with a monotonically advancing cursor. Every reader worker calls
//! [`ChunkPool::next`] independently; the pool itself, not the caller,
//! owns the mutex that makes that safe.

use crate::error::DumpError;
use crate::value_objects::ChunkMeta;
use parking_lot::Mutex;

pub struct ChunkPool {
    items: Mutex<PoolState>,
}

struct PoolState {
    metas: Vec<ChunkMeta>,
    cursor: usize,
}

impl ChunkPool {
    /// Construction rejects empty input.
    pub fn new(metas: Vec<ChunkMeta>) -> Result<Self, DumpError> {
        if metas.is_empty() {
            return Err(DumpError::validation("chunk pool requires at least one chunk"));
        }
        Ok(Self {
            items: Mutex::new(PoolState { metas, cursor: 0 }),
        })
    }

    /// Returns the next `ChunkMeta`, or `None` once the pool is exhausted.
    /// Safe under concurrent callers: each call advances the cursor by
    /// exactly one under the pool's mutex.
    pub fn next(&self) -> Option<ChunkMeta> {
        let mut state = self.items.lock();
        let item = state.metas.get(state.cursor).copied();
        if item.is_some() {
            state.cursor += 1;
        }
        item
    }

    pub fn len(&self) -> usize {
        self.items.lock().metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::SourceType;
    use std::sync::Arc;

    fn meta(i: u64) -> ChunkMeta {
        ChunkMeta::row_range(SourceType::ClickHouse, i, 100)
    }

    #[test]
    fn rejects_empty_construction() {
        assert!(ChunkPool::new(vec![]).is_err());
    }

    #[test]
    fn drains_every_item_exactly_once_in_order() {
        let pool = ChunkPool::new(vec![meta(0), meta(1), meta(2)]).unwrap();
        assert_eq!(pool.next().unwrap().index, 0);
        assert_eq!(pool.next().unwrap().index, 1);
        assert_eq!(pool.next().unwrap().index, 2);
        assert!(pool.next().is_none());
    }

    #[test]
    fn concurrent_callers_never_see_duplicates() {
        let pool = Arc::new(ChunkPool::new((0..200).map(meta).collect()).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(m) = pool.next() {
                        seen.push(m.index);
                    }
                    seen
                })
            })
            .collect();

        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..200).collect::<Vec<_>>());
    }
}
