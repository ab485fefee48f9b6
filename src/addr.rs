// SPDX-License-Identifier: MIT
//
// Address Evaluator: maps a payload size to the smallest size-class pool
// that fits it, and packs/unpacks internal addresses.

use crate::Addr;

/// Pure, total mapping between payload sizes and size-class pools, and
/// between internal addresses and `(dir, slot)` pairs.
///
/// `cse(dir)` is the byte size of a chunk in pool `dir`; it must be
/// monotonically non-decreasing in `dir`. `dir_count()` is the number of
/// pools. Both are supplied as closures so callers can plug in a custom
/// size-class ladder instead of the default doubling series.
#[derive(Clone)]
pub struct AddressEvaluator {
    prefix_bits: u32,
    cse: std::sync::Arc<dyn Fn(u32) -> usize + Send + Sync>,
    dir_count: u32,
}

impl AddressEvaluator {
    /// `min_size` is `cse(0)`; the default ladder doubles the chunk size for
    /// every subsequent dir (`cse(dir) = min_size << dir`).
    pub fn new(min_size: usize, prefix_bits: u32, dir_count: u32) -> Self {
        Self::with_cse(prefix_bits, dir_count, move |dir| min_size << dir)
    }

    /// Build an evaluator with a caller-supplied size-class function.
    pub fn with_cse<F>(prefix_bits: u32, dir_count: u32, cse: F) -> Self
    where
        F: Fn(u32) -> usize + Send + Sync + 'static,
    {
        Self {
            prefix_bits,
            cse: std::sync::Arc::new(cse),
            dir_count,
        }
    }

    pub fn prefix_bits(&self) -> u32 {
        self.prefix_bits
    }

    pub fn dir_count(&self) -> u32 {
        self.dir_count
    }

    /// Byte size of a chunk in pool `dir`.
    pub fn cse(&self, dir: u32) -> usize {
        (self.cse)(dir)
    }

    /// `true` if a chunk in pool `dir` can hold `size` bytes.
    pub fn capacity_test(&self, dir: u32, size: usize) -> bool {
        self.cse(dir) >= size
    }

    /// Least `dir` whose chunk size fits `size`, or `None` if `size` exceeds
    /// the largest configured size class.
    pub fn directory(&self, size: usize) -> Option<u32> {
        (0..self.dir_count).find(|&dir| self.capacity_test(dir, size))
    }

    /// The `dir` component of a packed internal address.
    pub fn addr_to_dir(&self, addr: Addr) -> u32 {
        addr >> self.prefix_bits
    }

    /// The `slot` component of a packed internal address.
    pub fn local_addr(&self, addr: Addr) -> u32 {
        addr & ((1u32 << self.prefix_bits) - 1)
    }

    /// Pack a `(dir, slot)` pair into an internal address.
    pub fn global_addr(&self, dir: u32, slot: u32) -> Addr {
        (dir << self.prefix_bits) | slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval() -> AddressEvaluator {
        // matches spec.md's worked scenarios: min_size=32, dir_count=16
        AddressEvaluator::new(32, 20, 16)
    }

    #[test]
    fn directory_picks_smallest_fit() {
        let e = eval();
        assert_eq!(e.directory(4), Some(0));
        assert_eq!(e.directory(32), Some(0));
        assert_eq!(e.directory(33), Some(1));
        assert_eq!(e.directory(64), Some(1));
    }

    #[test]
    fn directory_none_past_largest_class() {
        let e = eval();
        let largest = e.cse(15);
        assert_eq!(e.directory(largest + 1), None);
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let e = eval();
        for dir in 0..16u32 {
            for slot in [0u32, 1, 12345] {
                let addr = e.global_addr(dir, slot);
                assert_eq!(e.addr_to_dir(addr), dir);
                assert_eq!(e.local_addr(addr), slot);
            }
        }
    }

    #[test]
    fn cse_is_monotonic() {
        let e = eval();
        let mut prev = e.cse(0);
        for dir in 1..16u32 {
            let cur = e.cse(dir);
            assert!(cur >= prev);
            prev = cur;
        }
    }
}
