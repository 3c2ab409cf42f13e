//! Ordered key-value storage seam.
//!
//! ```text
//! ┌──────────────┐   get / put / delete / list   ┌──────────────┐
//! │ UpdateLog    │ ────────────────────────────► │ dyn KvStore  │
//! │ SV cache     │                               ├──────────────┤
//! └──────────────┘                               │ MemoryKv     │  BTreeMap
//!                                                │ RocksKv      │  RocksDB
//!                                                └──────────────┘
//! ```
//!
//! Keys are strings compared lexicographically; ranges are start-inclusive,
//! end-exclusive.

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use memory::MemoryKv;
#[cfg(feature = "rocksdb")]
pub use rocks::{RocksConfig, RocksKv};

/// A key + value pair returned by [`KvStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    /// Empty when the listing was requested with `keys_only`
    pub value: Vec<u8>,
}

/// Range listing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Inclusive lower bound
    pub start: String,
    /// Exclusive upper bound
    pub end: String,
    /// Return entries in descending key order
    pub reverse: bool,
    /// Maximum number of entries to return
    pub limit: Option<usize>,
    /// Skip reading values
    pub keys_only: bool,
}

impl ListOptions {
    pub fn range(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            reverse: false,
            limit: None,
            keys_only: false,
        }
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }
}

/// Ordered key-value store supplied by the host.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete every key in `keys`. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    /// Entries with `start <= key < end`, ordered by key.
    async fn list(&self, options: ListOptions) -> StoreResult<Vec<KvEntry>>;
}
