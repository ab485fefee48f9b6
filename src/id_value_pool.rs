// SPDX-License-Identifier: MIT
//
// Id Pool extended with a value carried alongside each acquired id. Used by
// the engine's handle table, whose value is the internal address a handle
// currently resolves to.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{BdbError, ErrorKind};
use crate::id_pool::{self, IdPool, Op};

/// An [`IdPool`] where every acquired id also carries a `u32` value,
/// durable through the same transaction log.
pub struct IdValuePool {
    inner: IdPool,
    values: HashMap<u32, u32>,
}

impl IdValuePool {
    pub fn open(path: impl AsRef<Path>, beg: u32, end: u32) -> Result<Self, BdbError> {
        let inner = IdPool::open(&path, beg, end)?;
        let mut values = HashMap::new();
        for rec in id_pool::rescan(&path)? {
            match rec.op {
                Op::AcquireValue | Op::UpdateValue => {
                    if let Some(v) = rec.value {
                        values.insert(rec.id, v);
                    }
                }
                Op::Release => {
                    values.remove(&rec.id);
                }
                _ => {}
            }
        }
        // Drop values for ids the bitmap no longer considers acquired (can
        // happen if a Release record followed a stale AcquireValue from a
        // discarded generation the bitmap replay also discarded).
        values.retain(|&id, _| inner.is_acquired(id));
        Ok(Self { inner, values })
    }

    pub fn begin(&self) -> u32 {
        self.inner.begin()
    }

    pub fn end(&self) -> u32 {
        self.inner.end()
    }

    pub fn is_acquired(&self, id: u32) -> bool {
        self.inner.is_acquired(id)
    }

    pub fn is_locked(&self, id: u32) -> bool {
        self.inner.is_locked(id)
    }

    pub fn lock(&mut self, id: u32) -> Result<(), BdbError> {
        self.inner.lock(id)
    }

    pub fn unlock(&mut self, id: u32) -> Result<(), BdbError> {
        self.inner.unlock(id)
    }

    pub fn avail(&self) -> bool {
        self.inner.avail()
    }

    /// Acquire a fresh id and associate `value` with it.
    pub fn acquire(&mut self, value: u32) -> Result<u32, BdbError> {
        let id = self.inner.acquire_raw()?;
        self.inner.append_record(Op::AcquireValue, id, Some(value))?;
        self.values.insert(id, value);
        Ok(id)
    }

    /// Value currently associated with `id`.
    ///
    /// # Panics
    /// Panics if `id` is not acquired — callers must check
    /// [`Self::is_acquired`] first, matching the precondition in spec.md.
    pub fn find(&self, id: u32) -> u32 {
        assert!(self.inner.is_acquired(id), "IdValuePool::find: id not acquired");
        *self.values.get(&id).expect("acquired id missing its value")
    }

    /// Update the value associated with `id`.
    pub fn update(&mut self, id: u32, value: u32) -> Result<(), BdbError> {
        if !self.inner.is_acquired(id) {
            return Err(BdbError::id_pool(ErrorKind::NonExist, line!()));
        }
        self.inner.append_record(Op::UpdateValue, id, Some(value))?;
        self.values.insert(id, value);
        Ok(())
    }

    pub fn release(&mut self, id: u32) -> Result<(), BdbError> {
        self.values.remove(&id);
        self.inner.release(id)
    }

    pub fn commit(&mut self, id: u32) -> Result<(), BdbError> {
        self.inner.commit(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_find_update() {
        let dir = tempdir().unwrap();
        let mut pool = IdValuePool::open(dir.path().join("g.trans"), 0, 16).unwrap();
        let id = pool.acquire(100).unwrap();
        assert_eq!(pool.find(id), 100);
        pool.update(id, 200).unwrap();
        assert_eq!(pool.find(id), 200);
    }

    #[test]
    fn replay_restores_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g.trans");
        let id = {
            let mut pool = IdValuePool::open(&path, 0, 16).unwrap();
            let id = pool.acquire(7).unwrap();
            pool.commit(id).unwrap();
            pool.update(id, 9).unwrap();
            pool.commit(id).unwrap();
            id
        };
        let pool = IdValuePool::open(&path, 0, 16).unwrap();
        assert!(pool.is_acquired(id));
        assert_eq!(pool.find(id), 9);
    }

    #[test]
    fn release_drops_value() {
        let dir = tempdir().unwrap();
        let mut pool = IdValuePool::open(dir.path().join("g.trans"), 0, 16).unwrap();
        let id = pool.acquire(1).unwrap();
        pool.release(id).unwrap();
        assert!(!pool.is_acquired(id));
    }
}
