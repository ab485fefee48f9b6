// SPDX-License-Identifier: MIT
//
// A single categorized error type collapsing the several parallel error
// namespaces the original engine kept separate (id pool, header pool, pool,
// engine-level). Each `BdbError` carries the subcategory it was raised from
// plus a client-facing `ErrorKind` that all subcategories can be compared
// against, per the "ambient mixing of generic error codes" redesign note.

use std::fmt;

/// Which subsystem raised the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Conditions shared by every subsystem (I/O, exhaustion).
    Basic,
    /// The durable bitmap allocator.
    IdPool,
    /// The per-slot header sidecar file.
    HeaderPool,
    /// A chunk pool (one size class).
    Pool,
    /// The top-level engine façade.
    Bdb,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Basic => "basic",
            Category::IdPool => "id_pool",
            Category::HeaderPool => "header_pool",
            Category::Pool => "pool",
            Category::Bdb => "bdb",
        };
        f.write_str(s)
    }
}

/// Client-facing error condition. Every subcategory's errors map onto this
/// set, so callers can match on `kind()` without caring which subsystem
/// raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The underlying device reported no space left.
    DiskFull,
    /// A read, write, or flush syscall failed.
    DiskFailure,
    /// The bitmap could not be extended (allocation failure).
    MemoryFull,
    /// An internal address referred to a dir/slot that does not exist.
    WrongAddress,
    /// A handle or slot was not acquired.
    NotFound,
    /// A payload exceeds the largest configured size class.
    TooLarge,
    /// The handle table's `[beg, end)` range is exhausted.
    AddressOverflow,
    /// A lower-level I/O failure surfaced at the engine boundary.
    SystemError,
    /// `size` plus existing content exceeds every pool's chunk size.
    DataTooBig,
    /// The target slot is locked by an in-progress stream.
    PoolLocked,
    /// Operation referenced an id that was never allocated.
    NonExist,
    /// A transaction-log flush failed after the in-memory effect applied.
    CommitFailure,
    /// An in-place rewrite partially succeeded and the buffered restore
    /// also failed; the affected chunk is unrecoverable.
    RollbackFailure,
    /// The id pool has no free ids in `[beg, end)`.
    BitmapFull,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::DiskFull => "disk_full",
            ErrorKind::DiskFailure => "disk_failure",
            ErrorKind::MemoryFull => "memory_full",
            ErrorKind::WrongAddress => "wrong_address",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::AddressOverflow => "address_overflow",
            ErrorKind::SystemError => "system_error",
            ErrorKind::DataTooBig => "data_too_big",
            ErrorKind::PoolLocked => "pool_locked",
            ErrorKind::NonExist => "non_exist",
            ErrorKind::CommitFailure => "commit_failure",
            ErrorKind::RollbackFailure => "rollback_failure",
            ErrorKind::BitmapFull => "bitmap_full",
        };
        f.write_str(s)
    }
}

/// A categorized engine error: which subsystem raised it, what condition it
/// maps to, and (for diagnostics feeding the error log) the source line.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("{category}: {kind} (line {line})")]
pub struct BdbError {
    pub category: Category,
    pub kind: ErrorKind,
    pub line: u32,
}

impl BdbError {
    pub fn new(category: Category, kind: ErrorKind, line: u32) -> Self {
        Self { category, kind, line }
    }

    pub fn basic(kind: ErrorKind, line: u32) -> Self {
        Self::new(Category::Basic, kind, line)
    }

    pub fn id_pool(kind: ErrorKind, line: u32) -> Self {
        Self::new(Category::IdPool, kind, line)
    }

    pub fn header_pool(kind: ErrorKind, line: u32) -> Self {
        Self::new(Category::HeaderPool, kind, line)
    }

    pub fn pool(kind: ErrorKind, line: u32) -> Self {
        Self::new(Category::Pool, kind, line)
    }

    pub fn bdb(kind: ErrorKind, line: u32) -> Self {
        Self::new(Category::Bdb, kind, line)
    }
}

impl From<std::io::Error> for BdbError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            // ENOSPC on Linux/macOS/*BSD.
            _ if e.raw_os_error() == Some(28) => ErrorKind::DiskFull,
            _ => ErrorKind::DiskFailure,
        };
        BdbError::basic(kind, 0)
    }
}

/// Shorthand for raising a `BdbError` with the current source line.
#[macro_export]
macro_rules! bdb_err {
    ($cat:ident, $kind:expr) => {
        $crate::BdbError::new($crate::Category::$cat, $kind, line!())
    };
}
