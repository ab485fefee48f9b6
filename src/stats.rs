// SPDX-License-Identifier: MIT
//
// Statistics snapshotter: the out-of-scope external collaborator the core
// publishes a read-only hook for. Walks each pool the same way the
// original's `stat()` does, plus handle-table occupancy.

use crate::engine::Engine;

/// Acquired/free slot counts for one size-class pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub dir: u32,
    pub chunk_size: usize,
    pub acquired: u64,
    pub has_free: bool,
}

/// A point-in-time snapshot of the whole engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub pools: Vec<PoolStats>,
    pub handles_acquired: u64,
    pub handle_range: (u32, u32),
}

impl Engine {
    /// Snapshot per-pool occupancy and handle-table usage. Walking every
    /// pool's acquired slots is O(used addresses); safe to call
    /// periodically but not on a hot path.
    pub fn stats(&self) -> EngineStats {
        let pools = self
            .pools()
            .iter()
            .map(|pool| {
                let mut acquired = 0u64;
                let mut next = 0u32;
                while let Some(slot) = pool.next_used(next) {
                    acquired += 1;
                    next = slot + 1;
                }
                PoolStats {
                    dir: pool.dir(),
                    chunk_size: pool.chunk_size(),
                    acquired,
                    has_free: pool.avail(),
                }
            })
            .collect::<Vec<_>>();
        let handles_acquired = pools.iter().map(|p| p.acquired).sum();
        EngineStats {
            pools,
            handles_acquired,
            handle_range: self.handle_range(),
        }
    }
}
