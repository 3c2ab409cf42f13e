//! Update-log compaction.
//!
//! ```text
//! before:  [1: δ] [2: δ] [3: δ]                 sv@3
//! flush:   [1: δ] [2: δ] [3: δ] [4: merge(1..3)] sv@4
//! cleanup:                      [4: merge(1..3)] sv@4
//! ```
//!
//! The merged update is appended (never written over an old clock) and the
//! summary is retagged before anything is deleted, so a reader that runs
//! between flush and cleanup folds the superseded deltas plus their merge,
//! which the engine treats as a no-op. Cleanup runs as a detached job on the
//! transaction queue; if it fails, the leftovers are picked up by the next
//! compaction.
//!
//! Reference: Kleppmann, DDIA, Chapter 3 (Compaction)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::{MergeEngine, Merged};
use crate::error::StoreResult;
use crate::keys::Clock;
use crate::queue::TransactionQueue;
use crate::state_vector::StateVectorCache;
use crate::update_log::UpdateLog;

/// Compaction counters.
#[derive(Debug, Default)]
pub(crate) struct CompactionCounters {
    pub compactions: AtomicU64,
    pub entries_removed: AtomicU64,
    pub cleanup_failures: AtomicU64,
}

/// Folds a document's log into one update and retires the old entries.
#[derive(Clone)]
pub struct Compactor {
    log: UpdateLog,
    cache: StateVectorCache,
    queue: TransactionQueue,
    counters: Arc<CompactionCounters>,
}

impl Compactor {
    pub fn new(log: UpdateLog, cache: StateVectorCache, queue: TransactionQueue) -> Self {
        Self {
            log,
            cache,
            queue,
            counters: Arc::new(CompactionCounters::default()),
        }
    }

    pub(crate) fn counters(&self) -> &CompactionCounters {
        &self.counters
    }

    /// Read and merge every update of `name`.
    ///
    /// Returns the merged form together with the number of folded entries.
    pub async fn merge_all<E: MergeEngine>(
        &self,
        engine: &E,
        name: &str,
    ) -> StoreResult<(Merged, usize)> {
        let updates = self.log.read_all(name).await?;
        let merged = engine.merge(updates.iter().map(|(_, payload)| payload.as_slice()))?;
        Ok((merged, updates.len()))
    }

    /// Persist `merged` as the newest entry of `name` and schedule removal
    /// of everything before it. Returns the clock of the merged entry.
    pub async fn flush(&self, name: &str, merged: &Merged) -> StoreResult<Clock> {
        let clock = self.log.append(name, &merged.update).await?;
        self.cache.write(name, &merged.state_vector, clock).await?;
        self.counters.compactions.fetch_add(1, Ordering::Relaxed);
        log::info!("Compacted '{name}' into update {clock}");

        self.schedule_cleanup(name, clock);
        Ok(clock)
    }

    /// Merge and flush `name` in one step.
    pub async fn compact<E: MergeEngine>(&self, engine: &E, name: &str) -> StoreResult<Clock> {
        let (merged, _) = self.merge_all(engine, name).await?;
        self.flush(name, &merged).await
    }

    /// Queue deletion of the entries of `name` below `clock`.
    fn schedule_cleanup(&self, name: &str, clock: Clock) {
        let updates = self.log.clone();
        let counters = self.counters.clone();
        let name = name.to_string();
        self.queue.submit_detached("cleanup", async move {
            match updates.delete_range_batched(&name, 0, clock).await {
                Ok(removed) => {
                    counters
                        .entries_removed
                        .fetch_add(removed as u64, Ordering::Relaxed);
                    log::debug!("Removed {removed} superseded updates of '{name}'");
                    Ok(())
                }
                Err(e) => {
                    counters.cleanup_failures.fetch_add(1, Ordering::Relaxed);
                    Err(e)
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MergeError;
    use crate::kv::{KvStore, MemoryKv};
    use crate::update_log::DEFAULT_DELETE_BATCH_CAP;

    /// Engine over sets of bytes: each payload is a list of members.
    struct SetEngine;

    impl MergeEngine for SetEngine {
        type Doc = std::collections::BTreeSet<u8>;

        fn empty(&self) -> Self::Doc {
            Default::default()
        }

        fn apply_update(&self, doc: &mut Self::Doc, update: &[u8]) -> Result<(), MergeError> {
            doc.extend(update.iter().copied());
            Ok(())
        }

        fn encode_state_as_update(&self, doc: &Self::Doc) -> Vec<u8> {
            doc.iter().copied().collect()
        }

        fn encode_state_vector(&self, doc: &Self::Doc) -> Vec<u8> {
            vec![doc.len() as u8]
        }
    }

    fn compactor(kv: Arc<MemoryKv>) -> (Compactor, UpdateLog, StateVectorCache, TransactionQueue) {
        let log = UpdateLog::new(kv.clone(), DEFAULT_DELETE_BATCH_CAP);
        let cache = StateVectorCache::new(kv);
        let queue = TransactionQueue::new().unwrap();
        let compactor = Compactor::new(log.clone(), cache.clone(), queue.clone());
        (compactor, log, cache, queue)
    }

    async fn drain(queue: &TransactionQueue) {
        queue.submit("drain", async { Ok(()) }).await.unwrap();
    }

    #[tokio::test]
    async fn test_compact_leaves_single_entry() {
        let kv = Arc::new(MemoryKv::new());
        let (compactor, log, cache, queue) = compactor(kv);
        log.append("doc", &[1, 2]).await.unwrap();
        log.append("doc", &[2, 3]).await.unwrap();
        log.append("doc", &[5]).await.unwrap();

        // Cleanup cannot start while this operation holds the queue
        let (c, l) = (compactor.clone(), log.clone());
        let (clock, visible) = queue
            .submit("flush", async move {
                let clock = c.compact(&SetEngine, "doc").await?;
                Ok((clock, l.read_all("doc").await?.len()))
            })
            .await
            .unwrap();
        assert_eq!(clock, 4);
        assert_eq!(visible, 4);
        drain(&queue).await;

        assert_eq!(log.read_all("doc").await.unwrap(), vec![(4, vec![1, 2, 3, 5])]);
        let record = cache.read("doc").await.unwrap().unwrap();
        assert_eq!(record.covered_clock, 4);
        assert_eq!(record.state_vector, vec![4]);
        assert_eq!(compactor.counters().entries_removed.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_cleanup_handles_backlog_over_cap() {
        let kv = Arc::new(MemoryKv::new());
        let (compactor, log, _cache, queue) = compactor(kv);
        for i in 0..300u32 {
            log.append("doc", &[(i % 256) as u8]).await.unwrap();
        }

        let clock = compactor.compact(&SetEngine, "doc").await.unwrap();
        drain(&queue).await;

        let left = log.read_all("doc").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].0, clock);
        assert_eq!(compactor.counters().cleanup_failures.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_replay_between_flush_and_cleanup_is_unchanged() {
        let kv = Arc::new(MemoryKv::new());
        let (compactor, log, _cache, queue) = compactor(kv.clone());
        log.append("doc", &[9]).await.unwrap();
        log.append("doc", &[7]).await.unwrap();

        let (before, _) = compactor.merge_all(&SetEngine, "doc").await.unwrap();
        let c = compactor.clone();
        let (during, folded) = queue
            .submit("flush", async move {
                c.compact(&SetEngine, "doc").await?;
                c.merge_all(&SetEngine, "doc").await
            })
            .await
            .unwrap();
        assert_eq!(folded, 3);
        assert_eq!(before, during);

        drain(&queue).await;
        let (after, folded) = compactor.merge_all(&SetEngine, "doc").await.unwrap();
        assert_eq!(folded, 1);
        assert_eq!(before, after);
        assert!(kv.get(&crate::keys::update_key("doc", 1)).await.unwrap().is_none());
    }
}
