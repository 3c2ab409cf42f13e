//! Cached state vector per document.
//!
//! One record per document under `("v1_sv", name)`, tagged with the update
//! clock it accounts for. The record is trusted only while that clock equals
//! the log's current clock; anything else means a newer update landed and
//! the summary must be recomputed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::keys::{self, Clock};
use crate::kv::{KvStore, ListOptions};

/// Persisted summary of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVectorRecord {
    /// Highest update clock the summary covers
    pub covered_clock: Clock,
    /// Engine-encoded state vector
    pub state_vector: Vec<u8>,
}

impl StateVectorRecord {
    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (record, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(record)
    }

    /// Whether the record still describes a log whose head is `current`.
    pub fn is_fresh(&self, current: Option<Clock>) -> bool {
        current == Some(self.covered_clock)
    }
}

/// State-vector cache over a [`KvStore`].
#[derive(Clone)]
pub struct StateVectorCache {
    kv: Arc<dyn KvStore>,
}

impl StateVectorCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Read the cached record for `name`.
    pub async fn read(&self, name: &str) -> StoreResult<Option<StateVectorRecord>> {
        match self.kv.get(&keys::state_vector_key(name)).await? {
            Some(bytes) => Ok(Some(StateVectorRecord::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the cached record for `name`.
    pub async fn write(
        &self,
        name: &str,
        state_vector: &[u8],
        covered_clock: Clock,
    ) -> StoreResult<()> {
        let record = StateVectorRecord {
            covered_clock,
            state_vector: state_vector.to_vec(),
        };
        self.kv
            .put(&keys::state_vector_key(name), &record.encode()?)
            .await?;
        log::debug!("Cached state vector for '{name}' at clock {covered_clock}");
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> StoreResult<()> {
        self.kv.delete(&[keys::state_vector_key(name)]).await
    }

    /// Names of every document that has a cached record.
    pub async fn documents(&self) -> StoreResult<Vec<String>> {
        let (start, end) = keys::state_vector_range();
        self.kv
            .list(ListOptions::range(start, end).keys_only())
            .await?
            .iter()
            .map(|entry| keys::parse_state_vector_name(&entry.key))
            .collect()
    }
}
