// SPDX-License-Identifier: MIT
//
// Durable bitmap allocator over an integer range `[beg, end)`. Every
// mutating operation appends a fixed-width record to a transaction file;
// `commit` flushes it to disk. Replaying the log at open time reconstructs
// the bitmap, so `acquire`/`release`/`lock`/`unlock` are crash-safe up to
// the last complete record.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{BdbError, ErrorKind};

/// One transaction-log opcode. `AcquireValue`/`UpdateValue` are only ever
/// emitted by [`crate::id_value_pool::IdValuePool`], which shares this log
/// format so replay reconstructs the bitmap and the value array together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Op {
    Acquire = 1,
    Release = 2,
    Lock = 3,
    Unlock = 4,
    AcquireValue = 5,
    UpdateValue = 6,
}

impl Op {
    fn from_byte(b: u8) -> Option<Op> {
        Some(match b {
            1 => Op::Acquire,
            2 => Op::Release,
            3 => Op::Lock,
            4 => Op::Unlock,
            5 => Op::AcquireValue,
            6 => Op::UpdateValue,
            _ => return None,
        })
    }

    /// Total on-disk record length for this opcode (1-byte op + 4-byte id,
    /// plus a 4-byte value for the value-carrying variants).
    fn record_len(self) -> usize {
        match self {
            Op::AcquireValue | Op::UpdateValue => 9,
            _ => 5,
        }
    }
}

/// A decoded transaction record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Record {
    pub op: Op,
    pub id: u32,
    pub value: Option<u32>,
}

/// A simple growable bitset over `[0, len)`.
#[derive(Default)]
struct Bitset {
    words: Vec<u64>,
    len: usize,
}

impl Bitset {
    fn with_capacity(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(64)],
            len,
        }
    }

    fn try_grow_to(&mut self, len: usize) -> Result<(), ()> {
        if len <= self.len {
            return Ok(());
        }
        let want_words = len.div_ceil(64);
        if want_words > self.words.len() {
            self.words
                .try_reserve(want_words - self.words.len())
                .map_err(|_| ())?;
            self.words.resize(want_words, 0);
        }
        self.len = len;
        Ok(())
    }

    fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.words[idx / 64] >> (idx % 64)) & 1 != 0
    }

    fn set(&mut self, idx: usize, val: bool) {
        debug_assert!(idx < self.len);
        let word = &mut self.words[idx / 64];
        let mask = 1u64 << (idx % 64);
        if val {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// Lowest clear bit in `[0, len)`, or `None` if all set.
    fn first_clear(&self) -> Option<usize> {
        for (wi, &w) in self.words.iter().enumerate() {
            if w != u64::MAX {
                let bit = (!w).trailing_zeros() as usize;
                let idx = wi * 64 + bit;
                if idx < self.len {
                    return Some(idx);
                }
            }
        }
        None
    }
}

/// The durable bitmap allocator described in spec.md §4.2.
pub struct IdPool {
    beg: u32,
    end: u32,
    acquired: Bitset,
    locked: Bitset,
    file: File,
}

const GROW_STEP: usize = 1024;

impl IdPool {
    /// Open (creating if absent) the transaction file at `path` and replay
    /// it to reconstruct the bitmap.
    pub fn open(path: impl AsRef<Path>, beg: u32, end: u32) -> Result<Self, BdbError> {
        assert!(beg <= end, "IdPool: beg must be <= end");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| BdbError::id_pool(ErrorKind::DiskFailure, line!()))?;

        let mut pool = Self {
            beg,
            end,
            acquired: Bitset::with_capacity(0),
            locked: Bitset::with_capacity(0),
            file,
        };
        let valid_len = replay(&mut pool)?;
        pool.file
            .set_len(valid_len)
            .map_err(|_| BdbError::id_pool(ErrorKind::DiskFailure, line!()))?;
        pool.file
            .seek(SeekFrom::End(0))
            .map_err(|_| BdbError::id_pool(ErrorKind::DiskFailure, line!()))?;
        Ok(pool)
    }

    pub fn begin(&self) -> u32 {
        self.beg
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    fn idx(&self, id: u32) -> usize {
        (id - self.beg) as usize
    }

    fn ensure_capacity(&mut self, up_to_idx: usize) -> Result<(), BdbError> {
        let want = up_to_idx + 1;
        self.acquired
            .try_grow_to(want)
            .map_err(|_| BdbError::id_pool(ErrorKind::MemoryFull, line!()))?;
        self.locked
            .try_grow_to(want)
            .map_err(|_| BdbError::id_pool(ErrorKind::MemoryFull, line!()))?;
        Ok(())
    }

    /// Lowest free id in `[beg, end)`, marking it acquired in the bitmap
    /// but without journaling — the caller appends whichever record fits
    /// (`Acquire`, or `AcquireValue` for [`crate::id_value_pool::IdValuePool`]).
    pub(crate) fn acquire_raw(&mut self) -> Result<u32, BdbError> {
        let range = (self.end - self.beg) as usize;
        // Grow the bitmap toward `end` until a free slot turns up or the
        // whole range has been materialized.
        while self.acquired.first_clear().is_none() && self.acquired.len < range {
            let next = (self.acquired.len + GROW_STEP).min(range);
            self.ensure_capacity(next - 1)?;
        }
        let idx = match self.acquired.first_clear() {
            Some(idx) if idx < range => idx,
            _ => return Err(BdbError::id_pool(ErrorKind::BitmapFull, line!())),
        };
        self.acquired.set(idx, true);
        Ok(self.beg + idx as u32)
    }

    /// Lowest free id in `[beg, end)`, marking it acquired.
    pub fn acquire(&mut self) -> Result<u32, BdbError> {
        let id = self.acquire_raw()?;
        self.append_record(Op::Acquire, id, None)?;
        Ok(id)
    }

    /// Mark an acquired id free. Idempotent: freeing an already-free id
    /// succeeds silently.
    pub fn release(&mut self, id: u32) -> Result<(), BdbError> {
        if id < self.beg || id >= self.end {
            return Err(BdbError::id_pool(ErrorKind::WrongAddress, line!()));
        }
        let idx = self.idx(id);
        if idx < self.acquired.len {
            self.acquired.set(idx, false);
            self.locked.set(idx, false);
        }
        self.append_record(Op::Release, id, None)
    }

    /// Flush the transaction file so all effects up to this point are
    /// durable.
    pub fn commit(&mut self, _id: u32) -> Result<(), BdbError> {
        self.file
            .flush()
            .map_err(|_| BdbError::id_pool(ErrorKind::CommitFailure, line!()))?;
        self.file
            .sync_data()
            .map_err(|_| BdbError::id_pool(ErrorKind::CommitFailure, line!()))?;
        Ok(())
    }

    pub fn lock(&mut self, id: u32) -> Result<(), BdbError> {
        if !self.is_acquired(id) {
            return Err(BdbError::id_pool(ErrorKind::NonExist, line!()));
        }
        self.locked.set(self.idx(id), true);
        self.append_record(Op::Lock, id, None)
    }

    pub fn unlock(&mut self, id: u32) -> Result<(), BdbError> {
        if !self.is_acquired(id) {
            return Err(BdbError::id_pool(ErrorKind::NonExist, line!()));
        }
        self.locked.set(self.idx(id), false);
        self.append_record(Op::Unlock, id, None)
    }

    pub fn is_locked(&self, id: u32) -> bool {
        if id < self.beg || id >= self.end {
            return false;
        }
        self.locked.get(self.idx(id))
    }

    pub fn is_acquired(&self, id: u32) -> bool {
        if id < self.beg || id >= self.end {
            return false;
        }
        self.acquired.get(self.idx(id))
    }

    /// Lowest acquired id `>= id`, or `end` if none. Only scans the range
    /// the bitmap has actually grown into — ids beyond that were never
    /// acquired, however far `end` is — so this stays O(ids ever seen)
    /// rather than O(`end - beg`).
    pub fn next_used(&self, id: u32) -> u32 {
        let start = id.max(self.beg);
        let grown_end = self.beg.saturating_add(self.acquired.len as u32).min(self.end);
        for cand in start..grown_end {
            if self.is_acquired(cand) {
                return cand;
            }
        }
        self.end
    }

    /// `true` if at least one id in `[beg, end)` is free.
    pub fn avail(&self) -> bool {
        let range = (self.end - self.beg) as usize;
        if self.acquired.len < range {
            return true;
        }
        self.acquired.first_clear().is_some()
    }

    pub(crate) fn append_record(
        &mut self,
        op: Op,
        id: u32,
        value: Option<u32>,
    ) -> Result<(), BdbError> {
        let mut buf = Vec::with_capacity(9);
        buf.push(op as u8);
        buf.extend_from_slice(&id.to_le_bytes());
        if let Some(v) = value {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        self.file
            .write_all(&buf)
            .map_err(|_| BdbError::id_pool(ErrorKind::DiskFailure, line!()))
    }

    pub(crate) fn apply_replay(&mut self, rec: Record) -> Result<(), BdbError> {
        if rec.id < self.beg || rec.id >= self.end {
            return Ok(()); // ignore out-of-range garbage from a torn record
        }
        let idx = self.idx(rec.id);
        self.ensure_capacity(idx)?;
        match rec.op {
            Op::Acquire | Op::AcquireValue => self.acquired.set(idx, true),
            Op::Release => {
                self.acquired.set(idx, false);
                self.locked.set(idx, false);
            }
            Op::Lock => self.locked.set(idx, true),
            Op::Unlock => self.locked.set(idx, false),
            Op::UpdateValue => self.acquired.set(idx, true),
        }
        Ok(())
    }
}

/// Replay `pool.file` from the start, applying every complete record. A
/// partial tail record is discarded and a recovery notice is logged.
/// Returns the byte length of the valid (non-truncated) prefix.
fn replay(pool: &mut IdPool) -> Result<u64, BdbError> {
    pool.file
        .seek(SeekFrom::Start(0))
        .map_err(|_| BdbError::id_pool(ErrorKind::DiskFailure, line!()))?;
    let (records, valid_len) = scan_records(&mut pool.file)?;
    for rec in records {
        pool.apply_replay(rec)?;
    }
    Ok(valid_len)
}

/// Decode every complete record from `file` (read from the start). A
/// partial tail record is discarded and a recovery notice is logged.
/// Returns the decoded records plus the byte length of the valid prefix.
pub(crate) fn scan_records(file: &mut File) -> Result<(Vec<Record>, u64), BdbError> {
    file.seek(SeekFrom::Start(0))
        .map_err(|_| BdbError::id_pool(ErrorKind::DiskFailure, line!()))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|_| BdbError::id_pool(ErrorKind::DiskFailure, line!()))?;

    let mut pos = 0usize;
    let mut records = Vec::new();
    while pos < buf.len() {
        let op = match Op::from_byte(buf[pos]) {
            Some(op) => op,
            None => break, // corrupt opcode byte; treat rest as torn tail
        };
        let len = op.record_len();
        if pos + len > buf.len() {
            log::warn!(
                "transaction log: discarding {} truncated trailing bytes",
                buf.len() - pos
            );
            break;
        }
        let id = u32::from_le_bytes(buf[pos + 1..pos + 5].try_into().unwrap());
        let value = if len == 9 {
            Some(u32::from_le_bytes(buf[pos + 5..pos + 9].try_into().unwrap()))
        } else {
            None
        };
        records.push(Record { op, id, value });
        pos += len;
    }
    Ok((records, pos as u64))
}

/// Reopen the transaction file at `path` for a second, independent replay
/// pass (used by [`crate::id_value_pool::IdValuePool`] to reconstruct its
/// value array after [`IdPool::open`] has already reconstructed the bitmap
/// and truncated away any torn tail).
pub(crate) fn rescan(path: impl AsRef<Path>) -> Result<Vec<Record>, BdbError> {
    let mut file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|_| BdbError::id_pool(ErrorKind::DiskFailure, line!()))?;
    Ok(scan_records(&mut file)?.0)
}
