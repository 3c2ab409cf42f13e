//! # logos-store: Persistent update store for CRDT documents
//!
//! Keeps each document as an append-only log of binary CRDT updates in an
//! ordered key-value store, with a cached state vector per document and
//! log compaction that folds the log into a single update.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   submit    ┌──────────────────┐
//! │ DocumentStore │ ──────────► │ TransactionQueue │  one op at a time
//! └───────┬───────┘             └────────┬─────────┘
//!         │                              │ cleanup (detached)
//!         ▼                              ▼
//! ┌───────────────┐  flush   ┌───────────────┐
//! │  MergeEngine  │ ◄─────── │   Compactor   │
//! │ (yrs by dflt) │          └───┬───────┬───┘
//! └───────────────┘              │       │
//!                     ┌──────────┘       └──────────┐
//!                     ▼                             ▼
//!              ┌─────────────┐            ┌──────────────────┐
//!              │  UpdateLog  │            │ StateVectorCache │
//!              │ v1#name#clk │            │   v1_sv#name     │
//!              └──────┬──────┘            └────────┬─────────┘
//!                     └─────────────┬──────────────┘
//!                                   ▼
//!                          ┌─────────────────┐
//!                          │ dyn KvStore     │
//!                          │ Memory | RocksDB│
//!                          └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`keys`]: Order-preserving composite key encoding
//! - [`kv`]: Ordered key-value backends
//! - [`engine`]: CRDT merge seam and the yrs engine
//! - [`update_log`]: Per-document clocked update log
//! - [`state_vector`]: Cached state vector per document
//! - [`compactor`]: Log compaction and batched cleanup
//! - [`queue`]: Single-writer transaction queue
//! - [`store`]: Public facade

pub mod compactor;
pub mod engine;
pub mod error;
pub mod keys;
pub mod kv;
pub mod queue;
pub mod state_vector;
pub mod store;
pub mod update_log;

#[cfg(test)]
mod test_utils;

// Re-exports for convenience
pub use engine::{MergeEngine, MergeError, Merged, YrsEngine};
pub use error::{StoreError, StoreResult};
pub use keys::{Clock, Segment};
pub use kv::{KvEntry, KvStore, ListOptions, MemoryKv};
#[cfg(feature = "rocksdb")]
pub use kv::{RocksConfig, RocksKv};
pub use state_vector::StateVectorRecord;
pub use store::{DocumentStats, DocumentStore, StoreConfig, StoreStats};
