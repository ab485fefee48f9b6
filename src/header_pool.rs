// SPDX-License-Identifier: MIT
//
// Per-pool sidecar file holding one fixed-width header record per chunk
// slot. Currently a header is just the logical (used) byte length of that
// slot's payload, but it is kept as its own little-endian record so future
// fields (flags, checksums) can be added without relayout.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{BdbError, ErrorKind};

/// Header metadata for one chunk slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkHeader {
    pub size: u32,
}

const RECORD_LEN: u64 = 4;

pub struct HeaderPool {
    file: File,
}

impl HeaderPool {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BdbError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| BdbError::header_pool(ErrorKind::DiskFailure, line!()))?;
        Ok(Self { file })
    }

    /// Read the header for `slot`. Slots never written return a defaulted
    /// header (`size == 0`).
    pub fn read(&mut self, slot: u32) -> Result<ChunkHeader, BdbError> {
        let offset = slot as u64 * RECORD_LEN;
        let len = self
            .file
            .metadata()
            .map_err(|_| BdbError::header_pool(ErrorKind::DiskFailure, line!()))?
            .len();
        if offset >= len {
            return Ok(ChunkHeader::default());
        }
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|_| BdbError::header_pool(ErrorKind::DiskFailure, line!()))?;
        let mut buf = [0u8; RECORD_LEN as usize];
        self.file
            .read_exact(&mut buf)
            .map_err(|_| BdbError::header_pool(ErrorKind::DiskFailure, line!()))?;
        Ok(ChunkHeader {
            size: u32::from_le_bytes(buf),
        })
    }

    /// Write the header for `slot`, extending the file with zeroed records
    /// if `slot` lies past the current end.
    pub fn write(&mut self, slot: u32, header: ChunkHeader) -> Result<(), BdbError> {
        let offset = slot as u64 * RECORD_LEN;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|_| BdbError::header_pool(ErrorKind::DiskFailure, line!()))?;
        self.file
            .write_all(&header.size.to_le_bytes())
            .map_err(|_| BdbError::header_pool(ErrorKind::DiskFailure, line!()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unwritten_slot_defaults_to_zero() {
        let dir = tempdir().unwrap();
        let mut hp = HeaderPool::open(dir.path().join("x.header")).unwrap();
        assert_eq!(hp.read(7).unwrap(), ChunkHeader::default());
    }

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let mut hp = HeaderPool::open(dir.path().join("x.header")).unwrap();
        hp.write(3, ChunkHeader { size: 42 }).unwrap();
        assert_eq!(hp.read(3).unwrap().size, 42);
        // Slots before the written one remain defaulted.
        assert_eq!(hp.read(0).unwrap().size, 0);
    }

    #[test]
    fn write_extends_file_for_distant_slot() {
        let dir = tempdir().unwrap();
        let mut hp = HeaderPool::open(dir.path().join("x.header")).unwrap();
        hp.write(100, ChunkHeader { size: 7 }).unwrap();
        assert_eq!(hp.read(100).unwrap().size, 7);
        assert_eq!(hp.read(50).unwrap().size, 0);
    }
}
