//! Public document store.
//!
//! ```text
//! DocumentStore ──► TransactionQueue ──► StoreInner ──┬── UpdateLog ───────┐
//!                   (one op at a time)                ├── StateVectorCache ├──► dyn KvStore
//!                                                     └── Compactor ───────┘
//!                                                            │
//!                                                            └──► MergeEngine
//! ```
//!
//! Every public operation is queued when it is called and runs alone. The
//! returned future only reports the result; dropping it does not cancel the
//! operation.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::compactor::Compactor;
use crate::engine::{MergeEngine, YrsEngine};
use crate::error::StoreResult;
use crate::keys::{Clock, CLOCK_CEILING};
use crate::kv::{KvStore, MemoryKv};
use crate::queue::TransactionQueue;
use crate::state_vector::StateVectorCache;
use crate::update_log::{UpdateLog, DEFAULT_DELETE_BATCH_CAP};

#[cfg(feature = "rocksdb")]
use crate::kv::{RocksConfig, RocksKv};

/// Default number of folded entries above which a read compacts the log.
pub const DEFAULT_TRIM_THRESHOLD: usize = 300;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Compact after a document read that folded more entries than this (default: 300)
    pub trim_threshold: usize,
    /// Maximum keys removed by one range delete (default: 128)
    pub delete_batch_cap: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            trim_threshold: DEFAULT_TRIM_THRESHOLD,
            delete_batch_cap: DEFAULT_DELETE_BATCH_CAP,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (compacts as soon as more than two updates are read).
    pub fn for_testing() -> Self {
        Self {
            trim_threshold: 2,
            delete_batch_cap: DEFAULT_DELETE_BATCH_CAP,
        }
    }
}

/// Store-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub updates_stored: u64,
    pub compactions: u64,
    /// Superseded updates removed by cleanup
    pub entries_removed: u64,
    pub cleanup_failures: u64,
    pub transactions_submitted: u64,
    /// Queued operations (including background cleanup) that returned an error
    pub failed_transactions: u64,
}

/// Shape of one document's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStats {
    /// Update records currently stored
    pub update_count: usize,
    pub first_clock: Option<Clock>,
    pub last_clock: Option<Clock>,
    /// Clock the cached state vector is tagged with
    pub summary_clock: Option<Clock>,
}

struct StoreInner<E> {
    log: UpdateLog,
    cache: StateVectorCache,
    compactor: Compactor,
    engine: E,
    config: StoreConfig,
    updates_stored: AtomicU64,
}

impl<E: MergeEngine> StoreInner<E> {
    async fn store_update(&self, name: &str, update: &[u8]) -> StoreResult<Clock> {
        // A payload the engine cannot apply would poison every later replay.
        let state_vector = {
            let doc = self.engine.fold([update])?;
            self.engine.encode_state_vector(&doc)
        };

        let current = self.log.current_clock(name).await?;
        if current.is_none() {
            // Every stored document gets a summary record. It is tagged 0 while
            // the update lands at 1, so the next summary read recomputes it.
            self.cache.write(name, &state_vector, 0).await?;
            log::info!("Created document '{name}'");
        }

        let clock = self.log.append_after(name, current, update).await?;
        self.updates_stored.fetch_add(1, Ordering::Relaxed);
        Ok(clock)
    }

    async fn get_document(&self, name: &str) -> StoreResult<E::Doc> {
        let updates = self.log.read_all(name).await?;
        let doc = self
            .engine
            .fold(updates.iter().map(|(_, payload)| payload.as_slice()))?;

        if updates.len() > self.config.trim_threshold {
            log::debug!(
                "'{name}' folded {} updates (threshold {}), compacting",
                updates.len(),
                self.config.trim_threshold
            );
            let merged = self.engine.consolidate(&doc);
            self.compactor.flush(name, &merged).await?;
        }
        Ok(doc)
    }

    async fn get_state_vector(&self, name: &str) -> StoreResult<Vec<u8>> {
        if let Some(record) = self.cache.read(name).await? {
            let current = self.log.current_clock(name).await?;
            if record.is_fresh(current) {
                return Ok(record.state_vector);
            }
            log::debug!(
                "State vector of '{name}' is stale (covers {}, log at {current:?})",
                record.covered_clock
            );
        }

        let (merged, folded) = self.compactor.merge_all(&self.engine, name).await?;
        if folded == 0 {
            // Nothing stored: answer with the empty document's vector, write nothing.
            return Ok(merged.state_vector);
        }
        self.compactor.flush(name, &merged).await?;
        Ok(merged.state_vector)
    }

    async fn flush_document(&self, name: &str) -> StoreResult<Option<Clock>> {
        let (merged, folded) = self.compactor.merge_all(&self.engine, name).await?;
        if folded == 0 {
            return Ok(None);
        }
        self.compactor.flush(name, &merged).await.map(Some)
    }

    async fn delete_document(&self, name: &str) -> StoreResult<usize> {
        let removed = self.log.delete_range_batched(name, 0, CLOCK_CEILING).await?;
        self.cache.remove(name).await?;
        log::info!("Deleted document '{name}' ({removed} updates)");
        Ok(removed)
    }

    async fn document_stats(&self, name: &str) -> StoreResult<DocumentStats> {
        let clocks = self.log.clocks(name, 0, CLOCK_CEILING).await?;
        let summary = self.cache.read(name).await?;
        Ok(DocumentStats {
            update_count: clocks.len(),
            first_clock: clocks.first().copied(),
            last_clock: clocks.last().copied(),
            summary_clock: summary.map(|record| record.covered_clock),
        })
    }
}

/// Persistent, compacting update store for CRDT documents.
///
/// Cheap to share behind an `Arc`; all methods take `&self`. Construction
/// spawns the queue worker, so it must happen inside a tokio runtime.
pub struct DocumentStore<E: MergeEngine = YrsEngine> {
    inner: Arc<StoreInner<E>>,
    queue: TransactionQueue,
}

impl DocumentStore<YrsEngine> {
    /// Store over a fresh in-memory map, using the yrs engine.
    pub fn in_memory(config: StoreConfig) -> StoreResult<Self> {
        Self::new(Arc::new(MemoryKv::new()), YrsEngine, config)
    }

    /// Store over a RocksDB database, using the yrs engine.
    #[cfg(feature = "rocksdb")]
    pub fn open(rocks: RocksConfig, config: StoreConfig) -> StoreResult<Self> {
        let kv = RocksKv::open(rocks)?;
        Self::new(Arc::new(kv), YrsEngine, config)
    }
}

impl<E: MergeEngine> DocumentStore<E> {
    pub fn new(kv: Arc<dyn KvStore>, engine: E, config: StoreConfig) -> StoreResult<Self> {
        let queue = TransactionQueue::new()?;
        let log = UpdateLog::new(kv.clone(), config.delete_batch_cap.max(1));
        let cache = StateVectorCache::new(kv);
        let compactor = Compactor::new(log.clone(), cache.clone(), queue.clone());

        Ok(Self {
            inner: Arc::new(StoreInner {
                log,
                cache,
                compactor,
                engine,
                config,
                updates_stored: AtomicU64::new(0),
            }),
            queue,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// Append an update to `name` and return its clock (1 for a new document).
    pub fn store_update(
        &self,
        name: &str,
        update: &[u8],
    ) -> impl Future<Output = StoreResult<Clock>> + Send + 'static {
        let inner = self.inner.clone();
        let name = name.to_string();
        let update = update.to_vec();
        self.queue.submit("store_update", async move {
            inner.store_update(&name, &update).await
        })
    }

    /// Rebuild `name` from its log. Compacts when the log is longer than
    /// the trim threshold.
    pub fn get_document(
        &self,
        name: &str,
    ) -> impl Future<Output = StoreResult<E::Doc>> + Send + 'static {
        let inner = self.inner.clone();
        let name = name.to_string();
        self.queue
            .submit("get_document", async move { inner.get_document(&name).await })
    }

    /// State vector of `name`, recomputed and compacted if the cached one is stale.
    pub fn get_state_vector(
        &self,
        name: &str,
    ) -> impl Future<Output = StoreResult<Vec<u8>>> + Send + 'static {
        let inner = self.inner.clone();
        let name = name.to_string();
        self.queue.submit("get_state_vector", async move {
            inner.get_state_vector(&name).await
        })
    }

    /// Compact `name` now. Returns the clock of the merged entry, or `None`
    /// when the document has no updates.
    pub fn flush_document(
        &self,
        name: &str,
    ) -> impl Future<Output = StoreResult<Option<Clock>>> + Send + 'static {
        let inner = self.inner.clone();
        let name = name.to_string();
        self.queue.submit("flush_document", async move {
            inner.flush_document(&name).await
        })
    }

    /// Names of all stored documents.
    pub fn list_documents(&self) -> impl Future<Output = StoreResult<Vec<String>>> + Send + 'static {
        let inner = self.inner.clone();
        self.queue
            .submit("list_documents", async move { inner.cache.documents().await })
    }

    /// Remove every record of `name`. Returns the number of removed updates.
    pub fn delete_document(
        &self,
        name: &str,
    ) -> impl Future<Output = StoreResult<usize>> + Send + 'static {
        let inner = self.inner.clone();
        let name = name.to_string();
        self.queue.submit("delete_document", async move {
            inner.delete_document(&name).await
        })
    }

    pub fn document_stats(
        &self,
        name: &str,
    ) -> impl Future<Output = StoreResult<DocumentStats>> + Send + 'static {
        let inner = self.inner.clone();
        let name = name.to_string();
        self.queue.submit("document_stats", async move {
            inner.document_stats(&name).await
        })
    }

    /// Lock-free snapshot of the store counters.
    pub fn stats(&self) -> StoreStats {
        let compaction = self.inner.compactor.counters();
        StoreStats {
            updates_stored: self.inner.updates_stored.load(Ordering::Relaxed),
            compactions: compaction.compactions.load(Ordering::Relaxed),
            entries_removed: compaction.entries_removed.load(Ordering::Relaxed),
            cleanup_failures: compaction.cleanup_failures.load(Ordering::Relaxed),
            transactions_submitted: self.queue.submitted(),
            failed_transactions: self.queue.failed(),
        }
    }
}
