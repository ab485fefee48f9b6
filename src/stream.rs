// SPDX-License-Identifier: MIT
//
// Stream State Table: pooled records describing in-flight read/write
// sessions, plus the pause/resume/expire bookkeeping. The table only
// tracks state transitions and slot reuse; the actual chunk I/O driven by
// `stream_write`/`stream_read` lives in the engine, which holds the table.

use std::collections::HashSet;

use crate::error::{BdbError, ErrorKind};
use crate::{Addr, Handle};

/// XOR constant used to obfuscate a paused stream's external token. Set
/// membership, not the XOR, is the authoritative liveness check.
const PAUSE_XOR: u32 = 0xDEA3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Read,
    Write,
}

/// A stream's position in the state machine from the active states reached
/// via `ostream`/`istream` through `Paused`. `FINALIZED` and `ABORTED` are
/// not represented here: both are terminal and immediately followed by the
/// state's removal from the arena, so "absent from the table" models them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    WritingFresh,
    WritingOverExisting,
    Reading,
    Paused,
}

/// An in-flight read or write session.
#[derive(Debug, Clone)]
pub struct StreamState {
    pub direction: StreamDirection,
    pub existed: bool,
    pub error: bool,
    pub status: StreamStatus,
    /// Status the stream was in before being paused, restored on resume.
    pub(crate) pre_pause_status: Option<StreamStatus>,
    pub handle: Option<Handle>,
    pub src_addr: Option<Addr>,
    pub dest_addr: Option<Addr>,
    pub offset: usize,
    pub size: usize,
    pub used: usize,
}

/// Opaque handle into the stream arena. Not obfuscated — `stream_pause`
/// produces the obfuscated [`StreamToken`] that is safe to expose as a
/// long-lived, client-held value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub(crate) u32);

/// Obfuscated client-facing encoding of a paused stream. Carries no
/// authority by itself — the issuing [`StreamTable`]'s membership set is
/// what makes resume/expire safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamToken(pub(crate) u32);

#[derive(Default)]
pub struct StreamTable {
    arena: Vec<Option<StreamState>>,
    free_list: Vec<u32>,
    paused: HashSet<u32>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: StreamState) -> StreamHandle {
        if let Some(idx) = self.free_list.pop() {
            self.arena[idx as usize] = Some(state);
            StreamHandle(idx)
        } else {
            self.arena.push(Some(state));
            StreamHandle((self.arena.len() - 1) as u32)
        }
    }

    pub fn get(&self, h: StreamHandle) -> Result<&StreamState, BdbError> {
        self.arena
            .get(h.0 as usize)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| BdbError::bdb(ErrorKind::NotFound, line!()))
    }

    pub fn get_mut(&mut self, h: StreamHandle) -> Result<&mut StreamState, BdbError> {
        self.arena
            .get_mut(h.0 as usize)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| BdbError::bdb(ErrorKind::NotFound, line!()))
    }

    /// Remove a finished/aborted stream from the arena, returning its slot
    /// for reuse.
    pub fn remove(&mut self, h: StreamHandle) -> Result<StreamState, BdbError> {
        let slot = self
            .arena
            .get_mut(h.0 as usize)
            .ok_or_else(|| BdbError::bdb(ErrorKind::NotFound, line!()))?;
        let state = slot.take().ok_or_else(|| BdbError::bdb(ErrorKind::NotFound, line!()))?;
        self.free_list.push(h.0);
        Ok(state)
    }

    /// XOR-obfuscate `h` and record it as the authoritative live token.
    pub fn pause(&mut self, h: StreamHandle) -> Result<StreamToken, BdbError> {
        let state = self.get_mut(h)?;
        state.pre_pause_status = Some(state.status);
        state.status = StreamStatus::Paused;
        let token = h.0 ^ PAUSE_XOR;
        self.paused.insert(token);
        Ok(StreamToken(token))
    }

    /// Resume a paused stream: requires the token to be a live member,
    /// removes it from the liveness set, and restores the pre-pause status.
    pub fn resume(&mut self, token: StreamToken) -> Result<StreamHandle, BdbError> {
        if !self.paused.remove(&token.0) {
            return Err(BdbError::bdb(ErrorKind::NotFound, line!()));
        }
        let idx = token.0 ^ PAUSE_XOR;
        let handle = StreamHandle(idx);
        let state = self.get_mut(handle)?;
        state.status = state.pre_pause_status.take().unwrap_or(state.status);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StreamState {
        StreamState {
            direction: StreamDirection::Write,
            existed: false,
            error: false,
            status: StreamStatus::WritingFresh,
            pre_pause_status: None,
            handle: None,
            src_addr: None,
            dest_addr: Some(0),
            offset: 0,
            size: 10,
            used: 0,
        }
    }

    #[test]
    fn insert_then_get() {
        let mut t = StreamTable::new();
        let h = t.insert(sample());
        assert_eq!(t.get(h).unwrap().size, 10);
    }

    #[test]
    fn pause_resume_round_trip() {
        let mut t = StreamTable::new();
        let h = t.insert(sample());
        let token = t.pause(h).unwrap();
        assert_eq!(t.get(h).unwrap().status, StreamStatus::Paused);
        let resumed = t.resume(token).unwrap();
        assert_eq!(resumed, h);
        assert_eq!(t.get(h).unwrap().status, StreamStatus::WritingFresh);
    }

    #[test]
    fn resume_unknown_token_fails() {
        let mut t = StreamTable::new();
        assert!(t.resume(StreamToken(123)).is_err());
    }

    #[test]
    fn resume_is_one_shot() {
        let mut t = StreamTable::new();
        let h = t.insert(sample());
        let token = t.pause(h).unwrap();
        t.resume(token).unwrap();
        assert!(t.resume(token).is_err());
    }

    #[test]
    fn removed_slot_is_reused() {
        let mut t = StreamTable::new();
        let h1 = t.insert(sample());
        t.remove(h1).unwrap();
        let h2 = t.insert(sample());
        assert_eq!(h1, h2);
    }
}
