// SPDX-License-Identifier: MIT
//
// Append-only access/error log sinks (spec §6). Out-of-scope as an
// external collaborator, but the core feeds them on every call, so they
// live here as the minimal writers the engine drains into.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::{BdbError, ErrorKind};

fn open_append(path: impl AsRef<Path>) -> Result<File, BdbError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)
        .map_err(|_| BdbError::basic(ErrorKind::DiskFailure, line!()))
}

/// One line per call: operation name left-padded to 12 chars, then up to
/// three hex quantities (size/handle/offset) depending on the operation.
pub struct AccessLog {
    file: File,
}

impl AccessLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BdbError> {
        Ok(Self { file: open_append(path)? })
    }

    pub fn record(&mut self, op: &str, fields: &[u32]) -> Result<(), BdbError> {
        let mut line = format!("{:>12}", op);
        for f in fields {
            line.push(' ');
            line.push_str(&format!("{:x}", f));
        }
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(|_| BdbError::basic(ErrorKind::DiskFailure, line!()))
    }
}

/// Column header on first write (`Pool_ID  Line Message`), then one row
/// per drained pool error.
pub struct ErrorLog {
    file: File,
    wrote_header: bool,
}

impl ErrorLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BdbError> {
        let file = open_append(path)?;
        let wrote_header = file
            .metadata()
            .map_err(|_| BdbError::basic(ErrorKind::DiskFailure, line!()))?
            .len()
            > 0;
        Ok(Self { file, wrote_header })
    }

    pub fn record(&mut self, pool_id: u32, line: u32, message: &str) -> Result<(), BdbError> {
        if !self.wrote_header {
            self.file
                .write_all(b"Pool_ID  Line Message\n")
                .map_err(|_| BdbError::basic(ErrorKind::DiskFailure, line!()))?;
            self.wrote_header = true;
        }
        self.file
            .write_all(format!("{:<8} {:<4} {}\n", pool_id, line, message).as_bytes())
            .map_err(|_| BdbError::basic(ErrorKind::DiskFailure, line!()))
    }
}
