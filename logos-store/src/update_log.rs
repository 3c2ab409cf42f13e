//! Append-only per-document update log.
//!
//! ```text
//! "v1"#"notes"#"update"#0000000001  →  delta
//! "v1"#"notes"#"update"#0000000002  →  delta
//! "v1"#"notes"#"update"#0000000003  →  delta   ◄── current clock
//! ```
//!
//! Clocks are allocated as `current + 1`, so callers must run appends through
//! the transaction queue; two concurrent appends would read the same current
//! clock.

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::keys::{self, Clock, CLOCK_CEILING};
use crate::kv::{KvStore, ListOptions};

/// Default cap on keys removed by one range delete.
pub const DEFAULT_DELETE_BATCH_CAP: usize = 128;

/// Update-log view over a [`KvStore`].
#[derive(Clone)]
pub struct UpdateLog {
    kv: Arc<dyn KvStore>,
    delete_batch_cap: usize,
}

impl UpdateLog {
    pub fn new(kv: Arc<dyn KvStore>, delete_batch_cap: usize) -> Self {
        Self {
            kv,
            delete_batch_cap,
        }
    }

    pub fn delete_batch_cap(&self) -> usize {
        self.delete_batch_cap
    }

    /// Highest clock stored for `name`, if any.
    pub async fn current_clock(&self, name: &str) -> StoreResult<Option<Clock>> {
        let (start, end) = keys::update_range(name, 0, CLOCK_CEILING);
        let last = self
            .kv
            .list(ListOptions::range(start, end).reverse().limit(1).keys_only())
            .await?;
        last.first()
            .map(|entry| keys::parse_update_clock(&entry.key))
            .transpose()
    }

    /// Append `update` after the current clock and return its clock.
    pub async fn append(&self, name: &str, update: &[u8]) -> StoreResult<Clock> {
        let current = self.current_clock(name).await?;
        self.append_after(name, current, update).await
    }

    /// Append `update` given an already-read current clock.
    pub(crate) async fn append_after(
        &self,
        name: &str,
        current: Option<Clock>,
        update: &[u8],
    ) -> StoreResult<Clock> {
        let clock = next_clock(current)
            .ok_or_else(|| StoreError::ClockExhausted(name.to_string()))?;
        self.kv.put(&keys::update_key(name, clock), update).await?;
        log::debug!("Appended update {clock} to '{name}' ({} bytes)", update.len());
        Ok(clock)
    }

    /// Updates with `from <= clock < to`, ascending.
    pub async fn read_range(
        &self,
        name: &str,
        from: Clock,
        to: Clock,
    ) -> StoreResult<Vec<(Clock, Vec<u8>)>> {
        let (start, end) = keys::update_range(name, from, to);
        self.kv
            .list(ListOptions::range(start, end))
            .await?
            .into_iter()
            .map(|entry| Ok((keys::parse_update_clock(&entry.key)?, entry.value)))
            .collect()
    }

    /// Every stored update for `name`, ascending.
    pub async fn read_all(&self, name: &str) -> StoreResult<Vec<(Clock, Vec<u8>)>> {
        self.read_range(name, 0, CLOCK_CEILING).await
    }

    /// Clocks with `from <= clock < to`, ascending, without reading payloads.
    pub async fn clocks(&self, name: &str, from: Clock, to: Clock) -> StoreResult<Vec<Clock>> {
        let (start, end) = keys::update_range(name, from, to);
        self.kv
            .list(ListOptions::range(start, end).keys_only())
            .await?
            .iter()
            .map(|entry| keys::parse_update_clock(&entry.key))
            .collect()
    }

    /// Delete updates with `from <= clock < to`.
    ///
    /// All or nothing: if the range holds more keys than the batch cap the
    /// call fails with [`StoreError::RangeTooLarge`] and deletes nothing.
    /// Returns the number of deleted updates.
    pub async fn delete_range(&self, name: &str, from: Clock, to: Clock) -> StoreResult<usize> {
        let (start, end) = keys::update_range(name, from, to);
        let keys: Vec<String> = self
            .kv
            .list(ListOptions::range(start, end).keys_only())
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect();

        if keys.len() > self.delete_batch_cap {
            return Err(StoreError::RangeTooLarge {
                count: keys.len(),
                cap: self.delete_batch_cap,
            });
        }
        if !keys.is_empty() {
            self.kv.delete(&keys).await?;
        }
        Ok(keys.len())
    }

    /// Delete updates with `from <= clock < to` in cap-sized windows.
    ///
    /// Each window goes through [`delete_range`](Self::delete_range), so no
    /// single delete exceeds the cap. Returns the number of deleted updates.
    pub async fn delete_range_batched(
        &self,
        name: &str,
        from: Clock,
        to: Clock,
    ) -> StoreResult<usize> {
        let clocks = self.clocks(name, from, to).await?;
        let mut deleted = 0;
        for window in clocks.chunks(self.delete_batch_cap.max(1)) {
            if let (Some(first), Some(last)) = (window.first(), window.last()) {
                deleted += self.delete_range(name, *first, last + 1).await?;
            }
        }
        Ok(deleted)
    }
}

/// Clock following `current`, or `None` once the ceiling is reached.
fn next_clock(current: Option<Clock>) -> Option<Clock> {
    match current {
        None => Some(1),
        Some(clock) => clock.checked_add(1).filter(|next| *next < CLOCK_CEILING),
    }
}
