// SPDX-License-Identifier: MIT
//
// One instance per size class. Owns a chunk file laid out as an array of
// fixed-size slots, plus its own id pool (slot allocation) and header pool
// (per-slot logical size). All body mutation funnels through a bounded
// "migration buffer" used both for in-place tail shifts and for building
// chunks migrated from another pool.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{BdbError, ErrorKind};
use crate::header_pool::{ChunkHeader, HeaderPool};
use crate::id_pool::IdPool;
use crate::NPOS;

/// Bound on how much tail data an in-place shift or cross-pool migration
/// will move through memory in one step.
pub const MIGBUF_SIZ: usize = 64 * 1024;

/// Bounded queue depth for a pool's internal error buffer (drained by the
/// engine into the error log).
const ERROR_QUEUE_CAP: usize = 64;

/// One source range for [`ChunkPool::write_scatter`]: either literal bytes,
/// an unspecified gap (left as whatever the file already holds — used by
/// streaming inserts that fill the gap later), or a range copied from
/// another slot's body through the migration buffer.
pub enum WriteSource<'a> {
    Raw(&'a [u8]),
    Gap(usize),
    CopyFrom { file: &'a mut File, offset: u64, length: usize },
}

impl WriteSource<'_> {
    fn len(&self) -> usize {
        match self {
            WriteSource::Raw(b) => b.len(),
            WriteSource::Gap(n) => *n,
            WriteSource::CopyFrom { length, .. } => *length,
        }
    }
}

pub struct ChunkPool {
    dir: u32,
    chunk_size: usize,
    file: File,
    ids: IdPool,
    headers: HeaderPool,
    errors: VecDeque<(ErrorKind, u32)>,
}

fn io_write_at(file: &mut File, offset: u64, buf: &[u8]) -> (usize, Option<io::Error>) {
    if let Err(e) = file.seek(SeekFrom::Start(offset)) {
        return (0, Some(e));
    }
    let mut written = 0;
    while written < buf.len() {
        match file.write(&buf[written..]) {
            Ok(0) => {
                return (
                    written,
                    Some(io::Error::new(io::ErrorKind::WriteZero, "write returned 0 bytes")),
                )
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (written, Some(e)),
        }
    }
    (written, None)
}

fn io_read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

impl ChunkPool {
    pub fn open(
        pool_path: impl AsRef<Path>,
        trans_path: impl AsRef<Path>,
        header_path: impl AsRef<Path>,
        dir: u32,
        chunk_size: usize,
        slot_range: std::ops::Range<u32>,
    ) -> Result<Self, BdbError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(pool_path)
            .map_err(|_| BdbError::pool(ErrorKind::DiskFailure, line!()))?;
        let ids = IdPool::open(trans_path, slot_range.start, slot_range.end)?;
        let headers = HeaderPool::open(header_path)?;
        Ok(Self {
            dir,
            chunk_size,
            file,
            ids,
            headers,
            errors: VecDeque::new(),
        })
    }

    pub fn dir(&self) -> u32 {
        self.dir
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn push_error(&mut self, kind: ErrorKind, line: u32) -> BdbError {
        if self.errors.len() >= ERROR_QUEUE_CAP {
            self.errors.pop_front();
        }
        self.errors.push_back((kind, line));
        BdbError::pool(kind, line)
    }

    /// Dequeue the oldest buffered error, if any.
    pub fn get_error(&mut self) -> Option<(ErrorKind, u32)> {
        self.errors.pop_front()
    }

    fn slot_offset(&self, slot: u32) -> u64 {
        slot as u64 * self.chunk_size as u64
    }

    pub fn is_acquired(&self, slot: u32) -> bool {
        self.ids.is_acquired(slot)
    }

    /// `true` if this pool can still acquire another slot.
    pub fn avail(&self) -> bool {
        self.ids.avail()
    }

    /// Lowest acquired slot `>= from`, or `None` if none remain.
    pub fn next_used(&self, from: u32) -> Option<u32> {
        let n = self.ids.next_used(from);
        if n == self.ids.end() {
            None
        } else {
            Some(n)
        }
    }

    pub fn pin(&mut self, slot: u32) -> Result<(), BdbError> {
        self.ids.lock(slot)
    }

    pub fn unpin(&mut self, slot: u32) -> Result<(), BdbError> {
        self.ids.unlock(slot)
    }

    pub fn is_pinned(&self, slot: u32) -> bool {
        self.ids.is_locked(slot)
    }

    pub fn head(&mut self, slot: u32) -> Result<ChunkHeader, BdbError> {
        self.headers.read(slot)
    }

    pub fn free(&mut self, slot: u32) -> Result<(), BdbError> {
        if !self.ids.is_acquired(slot) {
            return Err(self.push_error(ErrorKind::NotFound, line!()));
        }
        self.ids.release(slot)?;
        self.ids.commit(slot)?;
        Ok(())
    }

    /// Allocate a slot and write `size` bytes into it. `data == None` zero
    /// fills (used by stream preallocation).
    pub fn write(&mut self, data: Option<&[u8]>, size: usize) -> Result<u32, BdbError> {
        if size > self.chunk_size {
            return Err(self.push_error(ErrorKind::TooLarge, line!()));
        }
        let slot = self.ids.acquire()?;
        let result = (|| -> Result<(), BdbError> {
            if let Some(d) = data {
                let offset = self.slot_offset(slot);
                let (written, err) = io_write_at(&mut self.file, offset, &d[..size]);
                if err.is_some() || written != size {
                    return Err(BdbError::pool(ErrorKind::DiskFailure, line!()));
                }
            }
            self.headers.write(slot, ChunkHeader { size: size as u32 })?;
            Ok(())
        })();

        match result {
            Ok(()) => match self.ids.commit(slot) {
                Ok(()) => Ok(slot),
                Err(_) => {
                    let _ = self.ids.release(slot);
                    Err(self.push_error(ErrorKind::CommitFailure, line!()))
                }
            },
            Err(_) => {
                let _ = self.ids.release(slot);
                Err(self.push_error(ErrorKind::SystemError, line!()))
            }
        }
    }

    /// Build a chunk from several source ranges (used by migration). The
    /// total length must fit `chunk_size`.
    pub fn write_scatter(&mut self, sources: &mut [WriteSource]) -> Result<u32, BdbError> {
        let total: usize = sources.iter().map(WriteSource::len).sum();
        if total > self.chunk_size {
            return Err(self.push_error(ErrorKind::TooLarge, line!()));
        }
        let slot = self.ids.acquire()?;
        let result = (|| -> Result<(), BdbError> {
            let base = self.slot_offset(slot);
            let mut cursor = 0u64;
            for src in sources.iter_mut() {
                match src {
                    WriteSource::Raw(bytes) => {
                        let (written, err) = io_write_at(&mut self.file, base + cursor, bytes);
                        if err.is_some() || written != bytes.len() {
                            return Err(BdbError::pool(ErrorKind::DiskFailure, line!()));
                        }
                        cursor += bytes.len() as u64;
                    }
                    WriteSource::Gap(n) => {
                        cursor += *n as u64;
                    }
                    WriteSource::CopyFrom { file, offset, length } => {
                        let mut remaining = *length;
                        let mut src_off = *offset;
                        let mut dst_off = base + cursor;
                        let mut buf = vec![0u8; MIGBUF_SIZ.min(remaining.max(1))];
                        while remaining > 0 {
                            let chunk = remaining.min(buf.len());
                            io_read_at(file, src_off, &mut buf[..chunk])
                                .map_err(|_| BdbError::pool(ErrorKind::DiskFailure, line!()))?;
                            let (written, err) = io_write_at(&mut self.file, dst_off, &buf[..chunk]);
                            if err.is_some() || written != chunk {
                                return Err(BdbError::pool(ErrorKind::DiskFailure, line!()));
                            }
                            remaining -= chunk;
                            src_off += chunk as u64;
                            dst_off += chunk as u64;
                        }
                        cursor += *length as u64;
                    }
                }
            }
            self.headers.write(slot, ChunkHeader { size: total as u32 })?;
            Ok(())
        })();

        match result {
            Ok(()) => match self.ids.commit(slot) {
                Ok(()) => Ok(slot),
                Err(_) => {
                    let _ = self.ids.release(slot);
                    Err(self.push_error(ErrorKind::CommitFailure, line!()))
                }
            },
            Err(e) => {
                let _ = self.ids.release(slot);
                Err(self.push_error(e.kind, line!()))
            }
        }
    }

    /// Overwrite the whole body of an already-acquired slot and rewrite its
    /// header to `size`.
    pub fn replace(&mut self, data: &[u8], size: usize, slot: u32) -> Result<u32, BdbError> {
        if !self.ids.is_acquired(slot) {
            return Err(self.push_error(ErrorKind::NotFound, line!()));
        }
        if size > self.chunk_size {
            return Err(self.push_error(ErrorKind::TooLarge, line!()));
        }
        let base = self.slot_offset(slot);
        let (written, err) = io_write_at(&mut self.file, base, &data[..size]);
        if err.is_some() || written != size {
            return Err(self.push_error(ErrorKind::SystemError, line!()));
        }
        self.headers.write(slot, ChunkHeader { size: size as u32 })?;
        Ok(slot)
    }

    /// Write without touching the header — used by streaming writes whose
    /// header was already set by the preallocation step.
    pub fn overwrite(&mut self, data: &[u8], size: usize, slot: u32, offset: usize) -> Result<(), BdbError> {
        if !self.ids.is_acquired(slot) {
            return Err(self.push_error(ErrorKind::NotFound, line!()));
        }
        if offset + size > self.chunk_size {
            return Err(self.push_error(ErrorKind::TooLarge, line!()));
        }
        let base = self.slot_offset(slot) + offset as u64;
        let (written, err) = io_write_at(&mut self.file, base, &data[..size]);
        if err.is_some() || written != size {
            return Err(self.push_error(ErrorKind::SystemError, line!()));
        }
        Ok(())
    }

    /// Read up to `output.len()` bytes starting at `offset`, returning the
    /// number of bytes actually read (`min(output.len(), size - offset)`,
    /// or 0 if `offset > size`).
    pub fn read(&mut self, output: &mut [u8], slot: u32, offset: usize) -> Result<usize, BdbError> {
        let header = self.headers.read(slot)?;
        let size = header.size as usize;
        if offset > size {
            return Ok(0);
        }
        let n = output.len().min(size - offset);
        if n == 0 {
            return Ok(0);
        }
        let base = self.slot_offset(slot) + offset as u64;
        io_read_at(&mut self.file, base, &mut output[..n])
            .map_err(|_| self.push_error(ErrorKind::DiskFailure, line!()))?;
        Ok(n)
    }

    /// Iteratively read through the migration buffer, appending to `out`
    /// until either `max_total` bytes have been appended or the chunk's
    /// content is exhausted. Returns the number of bytes appended.
    pub fn read_extend(
        &mut self,
        out: &mut Vec<u8>,
        max_total: usize,
        slot: u32,
        offset: usize,
    ) -> Result<usize, BdbError> {
        let mut appended = 0;
        let mut buf = vec![0u8; MIGBUF_SIZ];
        loop {
            if appended >= max_total {
                break;
            }
            let want = (max_total - appended).min(buf.len());
            let n = self.read(&mut buf[..want], slot, offset + appended)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            appended += n;
        }
        Ok(appended)
    }

    /// Insert `data` at `offset` (or at the end, for `offset == NPOS`),
    /// shifting the existing tail right. Two-phase with rollback: if the
    /// combined write partially succeeds, the buffered original tail is
    /// restored to its original position before the header (the commit
    /// point) is touched.
    pub fn insert_at(
        &mut self,
        data: &[u8],
        size: usize,
        slot: u32,
        offset: usize,
    ) -> Result<u32, BdbError> {
        if !self.ids.is_acquired(slot) {
            return Err(self.push_error(ErrorKind::NotFound, line!()));
        }
        let header = self.headers.read(slot)?;
        let old_size = header.size as usize;
        let offset = if offset == NPOS { old_size } else { offset };
        if offset > old_size {
            return Err(self.push_error(ErrorKind::WrongAddress, line!()));
        }
        if size + old_size > self.chunk_size {
            return Err(self.push_error(ErrorKind::TooLarge, line!()));
        }
        let tail_len = old_size - offset;
        if tail_len > MIGBUF_SIZ {
            // Caller must migrate instead; a single in-place write cannot
            // safely move a tail larger than the migration buffer.
            return Err(self.push_error(ErrorKind::TooLarge, line!()));
        }

        let base = self.slot_offset(slot);
        let mut tail_buf = vec![0u8; tail_len];
        if tail_len > 0 {
            io_read_at(&mut self.file, base + offset as u64, &mut tail_buf)
                .map_err(|_| self.push_error(ErrorKind::DiskFailure, line!()))?;
        }

        let mut combined = Vec::with_capacity(size + tail_len);
        combined.extend_from_slice(data);
        combined.extend_from_slice(&tail_buf);

        let (written, err) = io_write_at(&mut self.file, base + offset as u64, &combined);
        if err.is_some() || written != combined.len() {
            let (rb_written, rb_err) = io_write_at(&mut self.file, base + offset as u64, &tail_buf);
            if rb_err.is_some() || rb_written != tail_buf.len() {
                return Err(self.push_error(ErrorKind::RollbackFailure, line!()));
            }
            return Err(self.push_error(ErrorKind::SystemError, line!()));
        }

        self.headers.write(slot, ChunkHeader { size: (old_size + size) as u32 })?;
        Ok(slot)
    }

    /// Clamp `size` to `old_size - offset`, shift the remaining tail left
    /// through the migration buffer, and rewrite the header. Returns the
    /// new logical size.
    pub fn erase(&mut self, slot: u32, offset: usize, size: usize) -> Result<usize, BdbError> {
        if !self.ids.is_acquired(slot) {
            return Err(self.push_error(ErrorKind::NotFound, line!()));
        }
        let header = self.headers.read(slot)?;
        let old_size = header.size as usize;
        if offset > old_size {
            return Err(self.push_error(ErrorKind::WrongAddress, line!()));
        }
        let size = size.min(old_size - offset);
        let tail_len = old_size - offset - size;
        let base = self.slot_offset(slot);

        if tail_len > 0 {
            let mut buf = vec![0u8; tail_len];
            io_read_at(&mut self.file, base + (offset + size) as u64, &mut buf)
                .map_err(|_| self.push_error(ErrorKind::DiskFailure, line!()))?;
            let (written, err) = io_write_at(&mut self.file, base + offset as u64, &buf);
            if err.is_some() || written != buf.len() {
                return Err(self.push_error(ErrorKind::SystemError, line!()));
            }
        }
        let new_size = old_size - size;
        self.headers.write(slot, ChunkHeader { size: new_size as u32 })?;
        Ok(new_size)
    }

    /// Build `src_body[0:offset] ++ data[0:size] ++ src_body[offset:old_size]`
    /// as a new chunk in `dest`. `data == None` leaves a `size`-byte gap
    /// (used by streaming inserts that fill it later).
    pub fn merge_copy(
        &mut self,
        data: Option<&[u8]>,
        size: usize,
        src_slot: u32,
        offset: usize,
        dest: &mut ChunkPool,
    ) -> Result<u32, BdbError> {
        if !self.ids.is_acquired(src_slot) {
            return Err(self.push_error(ErrorKind::NotFound, line!()));
        }
        let header = self.headers.read(src_slot)?;
        let old_size = header.size as usize;
        let offset = if offset == NPOS { old_size } else { offset };
        if offset > old_size {
            return Err(self.push_error(ErrorKind::WrongAddress, line!()));
        }
        let src_base = self.slot_offset(src_slot);
        let middle: WriteSource = match data {
            Some(d) => WriteSource::Raw(&d[..size]),
            None => WriteSource::Gap(size),
        };
        // `write_scatter` reads each `CopyFrom` range sequentially, but the
        // borrow checker can't see that — give each range its own cloned
        // file handle instead of aliasing `self.file` twice.
        let mut prefix_file = self
            .file
            .try_clone()
            .map_err(|_| BdbError::pool(ErrorKind::DiskFailure, line!()))?;
        let mut suffix_file = self
            .file
            .try_clone()
            .map_err(|_| BdbError::pool(ErrorKind::DiskFailure, line!()))?;
        let mut sources = vec![
            WriteSource::CopyFrom { file: &mut prefix_file, offset: src_base, length: offset },
            middle,
            WriteSource::CopyFrom {
                file: &mut suffix_file,
                offset: src_base + offset as u64,
                length: old_size - offset,
            },
        ];
        dest.write_scatter(&mut sources)
    }

    /// Same as [`Self::merge_copy`] but the destination is this same pool —
    /// used by a streaming write against an existing handle, which must
    /// materialize a new slot even when the target size class hasn't
    /// changed, since the old slot may still be pinned by a live reader.
    pub fn merge_copy_same_pool(
        &mut self,
        data: Option<&[u8]>,
        size: usize,
        src_slot: u32,
        offset: usize,
    ) -> Result<u32, BdbError> {
        if !self.ids.is_acquired(src_slot) {
            return Err(self.push_error(ErrorKind::NotFound, line!()));
        }
        let header = self.headers.read(src_slot)?;
        let old_size = header.size as usize;
        let offset = if offset == NPOS { old_size } else { offset };
        if offset > old_size {
            return Err(self.push_error(ErrorKind::WrongAddress, line!()));
        }
        let src_base = self.slot_offset(src_slot);
        let middle: WriteSource = match data {
            Some(d) => WriteSource::Raw(&d[..size]),
            None => WriteSource::Gap(size),
        };
        let mut prefix_file = self
            .file
            .try_clone()
            .map_err(|_| BdbError::pool(ErrorKind::DiskFailure, line!()))?;
        let mut suffix_file = self
            .file
            .try_clone()
            .map_err(|_| BdbError::pool(ErrorKind::DiskFailure, line!()))?;
        let mut sources = vec![
            WriteSource::CopyFrom { file: &mut prefix_file, offset: src_base, length: offset },
            middle,
            WriteSource::CopyFrom {
                file: &mut suffix_file,
                offset: src_base + offset as u64,
                length: old_size - offset,
            },
        ];
        self.write_scatter(&mut sources)
    }

    /// Same as [`Self::merge_copy`], then frees `src_slot`.
    pub fn merge_move(
        &mut self,
        data: Option<&[u8]>,
        size: usize,
        src_slot: u32,
        offset: usize,
        dest: &mut ChunkPool,
    ) -> Result<u32, BdbError> {
        let new_slot = self.merge_copy(data, size, src_slot, offset, dest)?;
        self.free(src_slot)?;
        Ok(new_slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_pool(dir: &std::path::Path, chunk_size: usize, n: u32) -> ChunkPool {
        ChunkPool::open(
            dir.join("0000.pool"),
            dir.join("0000.tran"),
            dir.join("0000.header"),
            0,
            chunk_size,
            0..n,
        )
        .unwrap()
    }

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let mut pool = make_pool(dir.path(), 32, 16);
        let slot = pool.write(Some(b"yang"), 4).unwrap();
        let mut buf = [0u8; 64];
        let n = pool.read(&mut buf, slot, 0).unwrap();
        assert_eq!(&buf[..n], b"yang");
    }

    #[test]
    fn insert_within_same_dir() {
        let dir = tempdir().unwrap();
        let mut pool = make_pool(dir.path(), 32, 16);
        let slot = pool.write(Some(b"yang"), 4).unwrap();
        pool.insert_at(b"acer", 4, slot, NPOS).unwrap();
        let mut buf = [0u8; 32];
        let n = pool.read(&mut buf, slot, 0).unwrap();
        assert_eq!(&buf[..n], b"yangacer");
    }

    #[test]
    fn insert_at_offset_shifts_tail() {
        let dir = tempdir().unwrap();
        let mut pool = make_pool(dir.path(), 32, 16);
        let slot = pool.write(Some(b"helloworld"), 10).unwrap();
        pool.insert_at(b"XX", 2, slot, 5).unwrap();
        let mut buf = [0u8; 32];
        let n = pool.read(&mut buf, slot, 0).unwrap();
        assert_eq!(&buf[..n], b"helloXXworld");
    }

    #[test]
    fn erase_shifts_tail_left() {
        let dir = tempdir().unwrap();
        let mut pool = make_pool(dir.path(), 32, 16);
        let slot = pool.write(Some(b"helloworld"), 10).unwrap();
        let new_size = pool.erase(slot, 2, 3).unwrap();
        assert_eq!(new_size, 7);
        let mut buf = [0u8; 32];
        let n = pool.read(&mut buf, slot, 0).unwrap();
        assert_eq!(&buf[..n], b"heworld");
    }

    #[test]
    fn erase_clamps_size_past_end() {
        let dir = tempdir().unwrap();
        let mut pool = make_pool(dir.path(), 32, 16);
        let slot = pool.write(Some(b"hello"), 5).unwrap();
        let new_size = pool.erase(slot, 2, 1000).unwrap();
        assert_eq!(new_size, 2);
    }

    #[test]
    fn free_then_not_acquired() {
        let dir = tempdir().unwrap();
        let mut pool = make_pool(dir.path(), 32, 16);
        let slot = pool.write(Some(b"hi"), 2).unwrap();
        pool.free(slot).unwrap();
        assert!(!pool.is_acquired(slot));
    }

    #[test]
    fn pin_unpin() {
        let dir = tempdir().unwrap();
        let mut pool = make_pool(dir.path(), 32, 16);
        let slot = pool.write(Some(b"hi"), 2).unwrap();
        assert!(!pool.is_pinned(slot));
        pool.pin(slot).unwrap();
        assert!(pool.is_pinned(slot));
        pool.unpin(slot).unwrap();
        assert!(!pool.is_pinned(slot));
    }

    #[test]
    fn merge_copy_builds_prefix_insert_suffix() {
        let dir = tempdir().unwrap();
        let mut src = make_pool(dir.path(), 32, 16);
        let mut dest = ChunkPool::open(
            dir.path().join("0001.pool"),
            dir.path().join("0001.tran"),
            dir.path().join("0001.header"),
            1,
            64,
            0..16,
        )
        .unwrap();
        let slot = src.write(Some(b"helloworld"), 10).unwrap();
        let new_slot = src.merge_copy(Some(b"XX"), 2, slot, 5, &mut dest).unwrap();
        let mut buf = [0u8; 64];
        let n = dest.read(&mut buf, new_slot, 0).unwrap();
        assert_eq!(&buf[..n], b"helloXXworld");
    }

    #[test]
    fn merge_move_frees_source_slot() {
        let dir = tempdir().unwrap();
        let mut src = make_pool(dir.path(), 32, 16);
        let mut dest = ChunkPool::open(
            dir.path().join("0001.pool"),
            dir.path().join("0001.tran"),
            dir.path().join("0001.header"),
            1,
            64,
            0..16,
        )
        .unwrap();
        let slot = src.write(Some(b"hello"), 5).unwrap();
        src.merge_move(None, 0, slot, NPOS, &mut dest).unwrap();
        assert!(!src.is_acquired(slot));
    }

    #[test]
    fn merge_copy_same_pool_materializes_new_slot() {
        let dir = tempdir().unwrap();
        let mut pool = make_pool(dir.path(), 32, 16);
        let slot = pool.write(Some(b"helloworld"), 10).unwrap();
        let new_slot = pool.merge_copy_same_pool(Some(b"XX"), 2, slot, 5).unwrap();
        assert_ne!(slot, new_slot);
        assert!(pool.is_acquired(slot), "source slot untouched until caller frees it");
        let mut buf = [0u8; 32];
        let n = pool.read(&mut buf, new_slot, 0).unwrap();
        assert_eq!(&buf[..n], b"helloXXworld");
    }

    #[test]
    fn write_too_large_is_rejected() {
        let dir = tempdir().unwrap();
        let mut pool = make_pool(dir.path(), 8, 16);
        let err = pool.write(Some(&[0u8; 9]), 9).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TooLarge);
    }
}
