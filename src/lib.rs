// SPDX-License-Identifier: MIT
//
// BehaviorDB: an embeddable variable-length blob storage engine.
//
// Clients submit opaque byte payloads and receive stable integer handles;
// they may later read, replace, partially erase, append, insert, or delete
// by handle. Internally the store segregates chunks into a fixed family of
// fixed-size pools chosen by payload size, migrating chunks between pools
// when mutation makes them outgrow their current tier.

mod addr;
mod chunk_pool;
mod config;
mod engine;
mod error;
mod header_pool;
mod id_pool;
mod id_value_pool;
mod iter;
mod log;
mod stats;
mod stream;

pub use addr::AddressEvaluator;
pub use config::{Config, ConfigBuilder};
pub use engine::Engine;
pub use error::{BdbError, Category, ErrorKind};
pub use iter::AddressIter;
pub use log::{AccessLog, ErrorLog};
pub use stats::{EngineStats, PoolStats};
pub use stream::{StreamDirection, StreamHandle, StreamToken};

/// Internal `(dir, slot)`-packed address, also the handle table's value type.
pub type Addr = u32;
/// Externally visible, stable blob identifier.
pub type Handle = u32;

/// Sentinel offset meaning "append at the end of the current content".
pub const NPOS: usize = usize::MAX;
