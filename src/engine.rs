// SPDX-License-Identifier: MIT
//
// Top-level façade: owns the pool family, the handle table, the in-reading
// refcount map, and the stream arena. Routes every public call into the
// right pool, performs cross-pool migration, and rebinds handles
// atomically.

use std::collections::HashMap;
use std::fs;

use crate::addr::AddressEvaluator;
use crate::chunk_pool::ChunkPool;
use crate::config::Config;
use crate::error::{BdbError, ErrorKind};
use crate::id_value_pool::IdValuePool;
use crate::log::{AccessLog, ErrorLog};
use crate::stream::{StreamDirection, StreamHandle, StreamState, StreamStatus, StreamTable, StreamToken};
use crate::{Addr, Handle};

pub struct Engine {
    addr: AddressEvaluator,
    pools: Vec<ChunkPool>,
    handles: IdValuePool,
    in_reading: HashMap<Addr, u32>,
    streams: StreamTable,
    access_log: AccessLog,
    error_log: ErrorLog,
}

fn split_pools_mut(pools: &mut [ChunkPool], a: u32, b: u32) -> (&mut ChunkPool, &mut ChunkPool) {
    assert_ne!(a, b, "split_pools_mut: src and dest must differ");
    if a < b {
        let (left, right) = pools.split_at_mut(b as usize);
        (&mut left[a as usize], &mut right[0])
    } else {
        let (left, right) = pools.split_at_mut(a as usize);
        (&mut right[0], &mut left[b as usize])
    }
}

impl Engine {
    pub fn open(config: Config) -> Result<Self, BdbError> {
        config.validate()?;
        for d in [&config.root_dir, &config.pool_dir, &config.trans_dir, &config.header_dir, &config.log_dir] {
            fs::create_dir_all(d).map_err(|_| BdbError::bdb(ErrorKind::DiskFailure, line!()))?;
        }
        let addr = AddressEvaluator::with_cse(config.prefix_bits, config.dir_count, {
            let cse = config.cse.clone();
            move |dir| cse(dir)
        });

        let mut pools = Vec::with_capacity(config.dir_count as usize);
        for dir in 0..config.dir_count {
            let chunk_size = addr.cse(dir);
            let pool = ChunkPool::open(
                config.pool_dir.join(format!("{dir:04x}.pool")),
                config.trans_dir.join(format!("{dir:04x}.tran")),
                config.header_dir.join(format!("{dir:04x}.header")),
                dir,
                chunk_size,
                0..u32::MAX,
            )?;
            pools.push(pool);
        }

        let handles = IdValuePool::open(config.root_dir.join("global_id.trans"), config.beg, config.end)?;
        let access_log = AccessLog::open(config.log_dir.join("access.log"))?;
        let error_log = ErrorLog::open(config.log_dir.join("error.log"))?;

        Ok(Self {
            addr,
            pools,
            handles,
            in_reading: HashMap::new(),
            streams: StreamTable::new(),
            access_log,
            error_log,
        })
    }

    fn log_access(&mut self, op: &str, fields: &[u32]) {
        let _ = self.access_log.record(op, fields);
    }

    /// Drain every pool's buffered error queue into the error log. Called
    /// after any operation so diagnostics surface even when the call
    /// itself still returns successfully (e.g. a retried pool-full error
    /// during the forward walk).
    fn drain_pool_errors(&mut self) {
        for (dir, pool) in self.pools.iter_mut().enumerate() {
            while let Some((kind, src_line)) = pool.get_error() {
                let _ = self.error_log.record(dir as u32, src_line, &kind.to_string());
            }
        }
    }

    fn resolve(&self, handle: Handle) -> Result<(u32, u32), BdbError> {
        if !self.handles.is_acquired(handle) {
            return Err(BdbError::bdb(ErrorKind::NotFound, line!()));
        }
        let internal = self.handles.find(handle);
        Ok((self.addr.addr_to_dir(internal), self.addr.local_addr(internal)))
    }

    /// Starting at `start_dir`, retry in successively larger pools while a
    /// pool reports exhaustion (`BitmapFull`); any other error, or running
    /// out of pools, is surfaced immediately.
    fn write_forward(&mut self, data: Option<&[u8]>, size: usize, start_dir: u32) -> Result<(u32, u32), BdbError> {
        let mut last_err = BdbError::bdb(ErrorKind::DataTooBig, line!());
        for dir in start_dir..self.addr.dir_count() {
            match self.pools[dir as usize].write(data, size) {
                Ok(slot) => return Ok((dir, slot)),
                Err(e) if e.kind == ErrorKind::BitmapFull => {
                    last_err = e;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    /// Allocate a fresh blob. Fails with `address_overflow` if the handle
    /// table is exhausted, `data_too_big` if no pool is large enough.
    pub fn put(&mut self, data: &[u8]) -> Result<Handle, BdbError> {
        if !self.handles.avail() {
            return Err(BdbError::bdb(ErrorKind::AddressOverflow, line!()));
        }
        let dir = self
            .addr
            .directory(data.len())
            .ok_or_else(|| BdbError::bdb(ErrorKind::DataTooBig, line!()))?;
        let (dir, slot) = self.write_forward(Some(data), data.len(), dir)?;
        let internal = self.addr.global_addr(dir, slot);
        let handle = self.handles.acquire(internal)?;
        self.handles.commit(handle)?;
        self.log_access("put", &[data.len() as u32, handle, 0]);
        self.drain_pool_errors();
        Ok(handle)
    }

    /// Insert `data` at `offset` (or append, for `offset == NPOS`) into an
    /// existing blob, migrating to a larger pool if it no longer fits.
    pub fn insert(&mut self, handle: Handle, offset: usize, data: &[u8]) -> Result<Handle, BdbError> {
        let (dir, slot) = self.resolve(handle)?;
        let old_size = self.pools[dir as usize].head(slot)?.size as usize;
        let new_addr: Addr = if self.addr.capacity_test(dir, data.len() + old_size) {
            let new_slot = self.pools[dir as usize].insert_at(data, data.len(), slot, offset)?;
            self.addr.global_addr(dir, new_slot)
        } else {
            let next_dir = self
                .addr
                .directory(data.len() + old_size)
                .ok_or_else(|| BdbError::bdb(ErrorKind::DataTooBig, line!()))?;
            let (src, dest) = split_pools_mut(&mut self.pools, dir, next_dir);
            let new_slot = src.merge_move(Some(data), data.len(), slot, offset, dest)?;
            self.addr.global_addr(next_dir, new_slot)
        };
        self.handles.update(handle, new_addr)?;
        self.handles.commit(handle)?;
        self.log_access("insert", &[data.len() as u32, handle, offset as u32]);
        self.drain_pool_errors();
        Ok(handle)
    }

    /// Replace the entire content of an existing blob.
    pub fn update(&mut self, handle: Handle, data: &[u8]) -> Result<Handle, BdbError> {
        let (dir, slot) = self.resolve(handle)?;
        if self.addr.capacity_test(dir, data.len()) {
            self.pools[dir as usize].replace(data, data.len(), slot)?;
            self.log_access("update", &[data.len() as u32, handle, 0]);
            self.drain_pool_errors();
            return Ok(handle);
        }

        let old_addr = self.addr.global_addr(dir, slot);
        let next_dir = self
            .addr
            .directory(data.len())
            .ok_or_else(|| BdbError::bdb(ErrorKind::DataTooBig, line!()))?;
        let (next_dir, new_slot) = self.write_forward(Some(data), data.len(), next_dir)?;
        let new_addr = self.addr.global_addr(next_dir, new_slot);

        match self.handles.update(handle, new_addr).and_then(|()| self.handles.commit(handle)) {
            Ok(()) => {
                let _ = self.pools[dir as usize].free(slot);
                self.log_access("update", &[data.len() as u32, handle, 0]);
                self.drain_pool_errors();
                Ok(handle)
            }
            Err(e) => {
                // Roll the handle value back and free the newly-written
                // slot so a commit failure never leaks it.
                let _ = self.handles.update(handle, old_addr);
                let _ = self.pools[next_dir as usize].free(new_slot);
                self.drain_pool_errors();
                Err(e)
            }
        }
    }

    pub fn get(&mut self, handle: Handle, offset: usize, output: &mut [u8]) -> Result<usize, BdbError> {
        let (dir, slot) = self.resolve(handle)?;
        let n = self.pools[dir as usize].read(output, slot, offset)?;
        self.log_access("get", &[output.len() as u32, handle, offset as u32]);
        Ok(n)
    }

    /// Read the whole blob from `offset` onward into `out`, growing it as
    /// needed, up to `max_total` bytes. Avoids the caller having to guess a
    /// buffer size up front the way a fixed-size `get` does.
    pub fn get_to_vec(&mut self, handle: Handle, offset: usize, max_total: usize, out: &mut Vec<u8>) -> Result<usize, BdbError> {
        let (dir, slot) = self.resolve(handle)?;
        let n = self.pools[dir as usize].read_extend(out, max_total, slot, offset)?;
        self.log_access("get", &[n as u32, handle, offset as u32]);
        Ok(n)
    }

    pub fn del(&mut self, handle: Handle) -> Result<(), BdbError> {
        let (dir, slot) = self.resolve(handle)?;
        self.pools[dir as usize].free(slot)?;
        self.handles.release(handle)?;
        self.handles.commit(handle)?;
        self.log_access("del", &[0, handle, 0]);
        self.drain_pool_errors();
        Ok(())
    }

    /// Partial erase: `[offset, offset+size)` is removed and the tail
    /// shifts left. Returns the new logical size. The handle is not
    /// rebound since its size class cannot grow from an erase.
    pub fn erase(&mut self, handle: Handle, offset: usize, size: usize) -> Result<usize, BdbError> {
        let (dir, slot) = self.resolve(handle)?;
        let new_size = self.pools[dir as usize].erase(slot, offset, size)?;
        self.log_access("erase", &[size as u32, handle, offset as u32]);
        self.drain_pool_errors();
        Ok(new_size)
    }

    /// Preallocate a fresh blob for streamed writing.
    pub fn ostream(&mut self, size: usize) -> Result<StreamHandle, BdbError> {
        let dir = self
            .addr
            .directory(size)
            .ok_or_else(|| BdbError::bdb(ErrorKind::DataTooBig, line!()))?;
        let (dir, slot) = self.write_forward(None, size, dir)?;
        let dest_addr = self.addr.global_addr(dir, slot);
        let state = StreamState {
            direction: StreamDirection::Write,
            existed: false,
            error: false,
            status: StreamStatus::WritingFresh,
            pre_pause_status: None,
            handle: None,
            src_addr: None,
            dest_addr: Some(dest_addr),
            offset: 0,
            size,
            used: 0,
        };
        Ok(self.streams.insert(state))
    }

    /// Open a streamed write against an existing handle. Locks the handle
    /// and materializes the target chunk (with a `size`-byte gap at
    /// `offset`) in whichever pool fits the combined size — a new slot
    /// even if that pool is the handle's current one, since the old slot
    /// may still be pinned by a live reader.
    pub fn ostream_existing(&mut self, size: usize, handle: Handle, offset: usize) -> Result<StreamHandle, BdbError> {
        if !self.handles.is_acquired(handle) {
            return Err(BdbError::bdb(ErrorKind::NotFound, line!()));
        }
        if self.handles.is_locked(handle) {
            return Err(BdbError::bdb(ErrorKind::PoolLocked, line!()));
        }
        self.handles.lock(handle)?;

        let src_addr = self.handles.find(handle);
        let src_dir = self.addr.addr_to_dir(src_addr);
        let src_slot = self.addr.local_addr(src_addr);
        let old_size = match self.pools[src_dir as usize].head(src_slot) {
            Ok(h) => h.size as usize,
            Err(e) => {
                let _ = self.handles.unlock(handle);
                return Err(e);
            }
        };
        let combined = old_size + size;
        let dest_dir = match self.addr.directory(combined) {
            Some(d) => d,
            None => {
                let _ = self.handles.unlock(handle);
                return Err(BdbError::bdb(ErrorKind::DataTooBig, line!()));
            }
        };

        let new_slot = if dest_dir == src_dir {
            self.pools[src_dir as usize].merge_copy_same_pool(None, size, src_slot, offset)
        } else {
            let (src, dest) = split_pools_mut(&mut self.pools, src_dir, dest_dir);
            src.merge_copy(None, size, src_slot, offset, dest)
        };
        let new_slot = match new_slot {
            Ok(s) => s,
            Err(e) => {
                let _ = self.handles.unlock(handle);
                return Err(e);
            }
        };
        let dest_addr = self.addr.global_addr(dest_dir, new_slot);

        let state = StreamState {
            direction: StreamDirection::Write,
            existed: true,
            error: false,
            status: StreamStatus::WritingOverExisting,
            pre_pause_status: None,
            handle: Some(handle),
            src_addr: Some(src_addr),
            dest_addr: Some(dest_addr),
            offset,
            size,
            used: 0,
        };
        Ok(self.streams.insert(state))
    }

    /// Open a streamed read against an existing handle, incrementing the
    /// in-reading refcount on its current internal address.
    pub fn istream(&mut self, size: usize, handle: Handle, offset: usize) -> Result<StreamHandle, BdbError> {
        if !self.handles.is_acquired(handle) {
            return Err(BdbError::bdb(ErrorKind::NotFound, line!()));
        }
        if self.handles.is_locked(handle) {
            return Err(BdbError::bdb(ErrorKind::PoolLocked, line!()));
        }
        let src_addr = self.handles.find(handle);
        *self.in_reading.entry(src_addr).or_insert(0) += 1;
        let state = StreamState {
            direction: StreamDirection::Read,
            existed: true,
            error: false,
            status: StreamStatus::Reading,
            pre_pause_status: None,
            handle: Some(handle),
            src_addr: Some(src_addr),
            dest_addr: None,
            offset,
            size,
            used: 0,
        };
        Ok(self.streams.insert(state))
    }

    pub fn stream_write(&mut self, sh: StreamHandle, data: &[u8]) -> Result<(), BdbError> {
        let state = self.streams.get(sh)?.clone();
        let dest_addr = state.dest_addr.expect("write stream carries a destination address");
        let dir = self.addr.addr_to_dir(dest_addr);
        let slot = self.addr.local_addr(dest_addr);
        let write_offset = state.offset + state.used;
        match self.pools[dir as usize].overwrite(data, data.len(), slot, write_offset) {
            Ok(()) => {
                self.streams.get_mut(sh)?.used += data.len();
                Ok(())
            }
            Err(e) => {
                if let Ok(s) = self.streams.get_mut(sh) {
                    s.error = true;
                }
                Err(e)
            }
        }
    }

    pub fn stream_read(&mut self, sh: StreamHandle, output: &mut [u8]) -> Result<usize, BdbError> {
        let state = self.streams.get(sh)?.clone();
        let src_addr = state.src_addr.expect("read stream carries a source address");
        let dir = self.addr.addr_to_dir(src_addr);
        let slot = self.addr.local_addr(src_addr);
        let read_offset = state.offset + state.used;
        match self.pools[dir as usize].read(output, slot, read_offset) {
            Ok(n) => {
                self.streams.get_mut(sh)?.used += n;
                Ok(n)
            }
            Err(e) => {
                if let Ok(s) = self.streams.get_mut(sh) {
                    s.error = true;
                }
                Err(e)
            }
        }
    }

    fn release_reader(&mut self, src_addr: Addr) -> Result<(), BdbError> {
        let Some(count) = self.in_reading.get_mut(&src_addr) else {
            return Ok(());
        };
        *count -= 1;
        if *count == 0 {
            self.in_reading.remove(&src_addr);
            let dir = self.addr.addr_to_dir(src_addr);
            let slot = self.addr.local_addr(src_addr);
            if self.pools[dir as usize].is_pinned(slot) {
                self.pools[dir as usize].unpin(slot)?;
                self.pools[dir as usize].free(slot)?;
            }
        }
        Ok(())
    }

    /// `stream_finish` for write streams returns the blob's handle
    /// (freshly acquired, or the existing handle rebound); for read
    /// streams it returns the handle that was being read.
    pub fn stream_finish(&mut self, sh: StreamHandle) -> Result<Option<Handle>, BdbError> {
        let state = self.streams.get(sh)?.clone();
        match state.direction {
            StreamDirection::Read => {
                let handle = state.handle;
                self.release_reader(state.src_addr.expect("read stream carries a source address"))?;
                self.streams.remove(sh)?;
                self.log_access("stream_rd_fin", &[state.used as u32, handle.unwrap_or(0), 0]);
                Ok(handle)
            }
            StreamDirection::Write => {
                if state.error || state.used != state.size {
                    self.stream_abort(sh)?;
                    return Err(BdbError::bdb(ErrorKind::SystemError, line!()));
                }
                let dest_addr = state.dest_addr.expect("write stream carries a destination address");
                if !state.existed {
                    let handle = self.handles.acquire(dest_addr)?;
                    match self.handles.commit(handle) {
                        Ok(()) => {
                            self.streams.remove(sh)?;
                            self.log_access("stream_fin", &[state.size as u32, handle, 0]);
                            Ok(Some(handle))
                        }
                        Err(e) => {
                            let _ = self.handles.release(handle);
                            self.streams.remove(sh)?;
                            Err(e)
                        }
                    }
                } else {
                    let handle = state.handle.expect("existed stream carries its handle");
                    let src_addr = state.src_addr.expect("existed stream carries its source address");
                    let src_dir = self.addr.addr_to_dir(src_addr);
                    let src_slot = self.addr.local_addr(src_addr);
                    let still_read = self.in_reading.get(&src_addr).copied().unwrap_or(0) > 0;
                    if still_read {
                        self.pools[src_dir as usize].pin(src_slot)?;
                    } else {
                        self.pools[src_dir as usize].free(src_slot)?;
                    }
                    match self.handles.update(handle, dest_addr).and_then(|()| self.handles.commit(handle)) {
                        Ok(()) => {
                            let _ = self.handles.unlock(handle);
                            self.streams.remove(sh)?;
                            self.log_access("stream_fin", &[state.size as u32, handle, 0]);
                            Ok(Some(handle))
                        }
                        Err(e) => {
                            let _ = self.handles.update(handle, src_addr);
                            let dest_dir = self.addr.addr_to_dir(dest_addr);
                            let dest_slot = self.addr.local_addr(dest_addr);
                            let _ = self.pools[dest_dir as usize].free(dest_slot);
                            let _ = self.handles.unlock(handle);
                            self.streams.remove(sh)?;
                            Err(e)
                        }
                    }
                }
            }
        }
    }

    pub fn stream_abort(&mut self, sh: StreamHandle) -> Result<(), BdbError> {
        let state = self.streams.remove(sh)?;
        match state.direction {
            StreamDirection::Write => {
                if let Some(dest_addr) = state.dest_addr {
                    let dir = self.addr.addr_to_dir(dest_addr);
                    let slot = self.addr.local_addr(dest_addr);
                    let _ = self.pools[dir as usize].free(slot);
                }
                if let Some(handle) = state.handle {
                    let _ = self.handles.unlock(handle);
                }
            }
            StreamDirection::Read => {
                if let Some(src_addr) = state.src_addr {
                    self.release_reader(src_addr)?;
                }
            }
        }
        Ok(())
    }

    pub fn stream_pause(&mut self, sh: StreamHandle) -> Result<StreamToken, BdbError> {
        self.streams.pause(sh)
    }

    pub fn stream_resume(&mut self, token: StreamToken) -> Result<StreamHandle, BdbError> {
        self.streams.resume(token)
    }

    pub fn stream_expire(&mut self, token: StreamToken) -> Result<(), BdbError> {
        let sh = self.streams.resume(token)?;
        self.stream_abort(sh)
    }

    pub(crate) fn addr_eval(&self) -> &AddressEvaluator {
        &self.addr
    }

    pub(crate) fn pools(&self) -> &[ChunkPool] {
        &self.pools
    }

    pub(crate) fn handle_range(&self) -> (u32, u32) {
        (self.handles.begin(), self.handles.end())
    }

    /// `true` if `handle` currently names a live blob.
    pub fn is_acquired(&self, handle: Handle) -> bool {
        self.handles.is_acquired(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NPOS;
    use tempfile::tempdir;

    fn engine(dir: &std::path::Path) -> Engine {
        Engine::open(Config::builder(dir).min_size(32).prefix_bits(20).dir_count(16).handle_range(0, 100_000).build()).unwrap()
    }

    #[test]
    fn put_get_del_round_trip() {
        let dir = tempdir().unwrap();
        let mut e = engine(dir.path());
        let h = e.put(b"yang").unwrap();
        let mut buf = [0u8; 64];
        let n = e.get(h, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"yang");
        e.del(h).unwrap();
        assert!(!e.is_acquired(h));
    }

    #[test]
    fn insert_within_same_dir_keeps_handle() {
        let dir = tempdir().unwrap();
        let mut e = engine(dir.path());
        let h = e.put(b"yang").unwrap();
        let h2 = e.insert(h, NPOS, b"acer").unwrap();
        assert_eq!(h, h2);
        let mut buf = [0u8; 64];
        let n = e.get(h, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"yangacer");
    }

    #[test]
    fn insert_past_dir_capacity_migrates_and_keeps_handle() {
        let dir = tempdir().unwrap();
        let mut e = engine(dir.path());
        let a = vec![b'A'; 30];
        let b = vec![b'B'; 10];
        let h = e.put(&a).unwrap();
        let h2 = e.insert(h, NPOS, &b).unwrap();
        assert_eq!(h, h2);
        let mut buf = [0u8; 64];
        let n = e.get(h, 0, &mut buf).unwrap();
        let mut expected = a;
        expected.extend_from_slice(&b);
        assert_eq!(&buf[..n], expected.as_slice());
    }

    #[test]
    fn ten_thousand_put_del_cycle_restores_availability() {
        let dir = tempdir().unwrap();
        let mut e = engine(dir.path());
        let mut handles = Vec::with_capacity(10_000);
        for _ in 0..10_000 {
            handles.push(e.put(b"acer").unwrap());
        }
        for h in handles {
            e.del(h).unwrap();
        }
        let h = e.put(b"acer").unwrap();
        assert!(e.is_acquired(h));
    }

    #[test]
    fn streaming_write_assembles_chunks() {
        let dir = tempdir().unwrap();
        let mut e = engine(dir.path());
        let s = e.ostream(100).unwrap();
        for k in 0..10u8 {
            e.stream_write(s, &[k; 10]).unwrap();
        }
        let h = e.stream_finish(s).unwrap().unwrap();
        let mut buf = [0u8; 100];
        let n = e.get(h, 0, &mut buf).unwrap();
        assert_eq!(n, 100);
        for k in 0..10usize {
            assert_eq!(&buf[k * 10..k * 10 + 10], &[k as u8; 10]);
        }
    }

    #[test]
    fn reader_observes_pre_write_body_until_its_own_finish() {
        let dir = tempdir().unwrap();
        let mut e = engine(dir.path());
        let h = e.put(b"original").unwrap();

        let r = e.istream(8, h, 0).unwrap();
        let mut first = [0u8; 8];
        assert_eq!(e.stream_read(r, &mut first).unwrap(), 8);

        let w = e.ostream_existing(8, h, 8).unwrap();
        e.stream_write(w, b"appended").unwrap();
        let h2 = e.stream_finish(w).unwrap().unwrap();
        assert_eq!(h2, h);

        // Reader still sees the pre-write body through its own stream.
        let mut second = [0u8; 8];
        assert_eq!(e.stream_read(r, &mut second).unwrap(), 0, "read stream only covered 8 bytes");
        assert_eq!(&first, b"original");

        e.stream_finish(r).unwrap();

        let mut buf = [0u8; 32];
        let n = e.get(h, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"originalappended");
    }

    #[test]
    fn stream_pause_resume_then_finish() {
        let dir = tempdir().unwrap();
        let mut e = engine(dir.path());
        let s = e.ostream(4).unwrap();
        let token = e.stream_pause(s).unwrap();
        let resumed = e.stream_resume(token).unwrap();
        e.stream_write(resumed, b"abcd").unwrap();
        let h = e.stream_finish(resumed).unwrap().unwrap();
        let mut buf = [0u8; 4];
        let n = e.get(h, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"abcd");
    }

    #[test]
    fn stream_expire_aborts_a_paused_stream() {
        let dir = tempdir().unwrap();
        let mut e = engine(dir.path());
        let s = e.ostream(4).unwrap();
        let token = e.stream_pause(s).unwrap();
        e.stream_expire(token).unwrap();
        assert!(e.stream_resume(token).is_err());
    }

    #[test]
    fn update_migrates_to_larger_pool_and_frees_old_slot() {
        let dir = tempdir().unwrap();
        let mut e = engine(dir.path());
        let h = e.put(b"small").unwrap();
        let big = vec![b'z'; 40];
        let h2 = e.update(h, &big).unwrap();
        assert_eq!(h, h2);
        let mut buf = [0u8; 64];
        let n = e.get(h, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], big.as_slice());
    }
}
