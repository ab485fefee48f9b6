// SPDX-License-Identifier: MIT
//
// Engine configuration: where files live, the size-class ladder, and the
// handle range. A plain builder, not a file format — nothing here reads
// from disk.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{BdbError, ErrorKind};

/// Engine-open configuration.
#[derive(Clone)]
pub struct Config {
    pub root_dir: PathBuf,
    pub pool_dir: PathBuf,
    pub trans_dir: PathBuf,
    pub header_dir: PathBuf,
    pub log_dir: PathBuf,
    pub min_size: usize,
    pub prefix_bits: u32,
    pub dir_count: u32,
    pub cse: Arc<dyn Fn(u32) -> usize + Send + Sync>,
    pub beg: u32,
    pub end: u32,
}

impl Config {
    pub fn builder(root_dir: impl Into<PathBuf>) -> ConfigBuilder {
        ConfigBuilder::new(root_dir)
    }

    /// Rejects zero `min_size`, zero `dir_count`, and inverted or
    /// overlapping handle ranges.
    pub fn validate(&self) -> Result<(), BdbError> {
        if self.min_size == 0 {
            return Err(BdbError::bdb(ErrorKind::WrongAddress, line!()));
        }
        if self.dir_count == 0 {
            return Err(BdbError::bdb(ErrorKind::WrongAddress, line!()));
        }
        if self.beg >= self.end {
            return Err(BdbError::bdb(ErrorKind::WrongAddress, line!()));
        }
        Ok(())
    }
}

/// Builder for [`Config`]; directory overrides default to `root_dir` when
/// left unset, and the size-class ladder defaults to doubling chunk sizes.
pub struct ConfigBuilder {
    root_dir: PathBuf,
    pool_dir: Option<PathBuf>,
    trans_dir: Option<PathBuf>,
    header_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    min_size: usize,
    prefix_bits: u32,
    dir_count: u32,
    cse: Option<Arc<dyn Fn(u32) -> usize + Send + Sync>>,
    beg: u32,
    end: u32,
}

impl ConfigBuilder {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            pool_dir: None,
            trans_dir: None,
            header_dir: None,
            log_dir: None,
            min_size: 32,
            prefix_bits: 20,
            dir_count: 16,
            cse: None,
            beg: 0,
            end: 100_000,
        }
    }

    pub fn pool_dir(mut self, p: impl Into<PathBuf>) -> Self {
        self.pool_dir = Some(p.into());
        self
    }

    pub fn trans_dir(mut self, p: impl Into<PathBuf>) -> Self {
        self.trans_dir = Some(p.into());
        self
    }

    pub fn header_dir(mut self, p: impl Into<PathBuf>) -> Self {
        self.header_dir = Some(p.into());
        self
    }

    pub fn log_dir(mut self, p: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(p.into());
        self
    }

    pub fn min_size(mut self, n: usize) -> Self {
        self.min_size = n;
        self
    }

    pub fn prefix_bits(mut self, n: u32) -> Self {
        self.prefix_bits = n;
        self
    }

    pub fn dir_count(mut self, n: u32) -> Self {
        self.dir_count = n;
        self
    }

    /// Override the default doubling size-class ladder.
    pub fn cse_func<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) -> usize + Send + Sync + 'static,
    {
        self.cse = Some(Arc::new(f));
        self
    }

    pub fn handle_range(mut self, beg: u32, end: u32) -> Self {
        self.beg = beg;
        self.end = end;
        self
    }

    pub fn build(self) -> Config {
        let min_size = self.min_size;
        let cse = self.cse.unwrap_or_else(|| Arc::new(move |dir| min_size << dir));
        Config {
            pool_dir: self.pool_dir.unwrap_or_else(|| self.root_dir.clone()),
            trans_dir: self.trans_dir.unwrap_or_else(|| self.root_dir.clone()),
            header_dir: self.header_dir.unwrap_or_else(|| self.root_dir.clone()),
            log_dir: self.log_dir.unwrap_or_else(|| self.root_dir.clone()),
            root_dir: self.root_dir,
            min_size: self.min_size,
            prefix_bits: self.prefix_bits,
            dir_count: self.dir_count,
            cse,
            beg: self.beg,
            end: self.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::builder("/tmp/bdb-test").build();
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_min_size_rejected() {
        let cfg = Config::builder("/tmp/bdb-test").min_size(0).build();
        assert_eq!(cfg.validate().unwrap_err().kind, ErrorKind::WrongAddress);
    }

    #[test]
    fn zero_dir_count_rejected() {
        let cfg = Config::builder("/tmp/bdb-test").dir_count(0).build();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_handle_range_rejected() {
        let cfg = Config::builder("/tmp/bdb-test").handle_range(100, 10).build();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn directory_overrides_fall_back_to_root() {
        let cfg = Config::builder("/root").pool_dir("/pools").build();
        assert_eq!(cfg.pool_dir, PathBuf::from("/pools"));
        assert_eq!(cfg.trans_dir, PathBuf::from("/root"));
    }
}
