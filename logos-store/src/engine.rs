//! Merge engine seam.
//!
//! The store never looks inside a CRDT document. Everything it needs from
//! the CRDT library goes through [`MergeEngine`]: create an empty document,
//! fold an update into it, and encode the result as a full update or as a
//! state vector. [`YrsEngine`] plugs in the Yjs-compatible `yrs` crate.

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

/// Error raised by a merge engine when it rejects a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeError(String);

impl MergeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MergeError {}

/// Consolidated form of a document: one update plus its state vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// Full document state encoded as a single update
    pub update: Vec<u8>,
    /// State vector of the merged document
    pub state_vector: Vec<u8>,
}

/// The CRDT operations the store depends on.
///
/// `apply_update` must tolerate duplicate and overlapping payloads: replay
/// after a partially cleaned compaction folds the consolidated update and
/// the superseded ones it already contains.
pub trait MergeEngine: Send + Sync + 'static {
    /// In-memory document type.
    type Doc: Send + 'static;

    fn empty(&self) -> Self::Doc;

    fn apply_update(&self, doc: &mut Self::Doc, update: &[u8]) -> Result<(), MergeError>;

    fn encode_state_as_update(&self, doc: &Self::Doc) -> Vec<u8>;

    fn encode_state_vector(&self, doc: &Self::Doc) -> Vec<u8>;

    /// Fold `updates` in order into a fresh document.
    fn fold<'a, I>(&self, updates: I) -> Result<Self::Doc, MergeError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut doc = self.empty();
        for update in updates {
            self.apply_update(&mut doc, update)?;
        }
        Ok(doc)
    }

    /// Encode a document in its consolidated form.
    fn consolidate(&self, doc: &Self::Doc) -> Merged {
        Merged {
            update: self.encode_state_as_update(doc),
            state_vector: self.encode_state_vector(doc),
        }
    }

    /// Merge `updates` into one update plus state vector.
    fn merge<'a, I>(&self, updates: I) -> Result<Merged, MergeError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let doc = self.fold(updates)?;
        Ok(self.consolidate(&doc))
    }
}

/// [`MergeEngine`] backed by `yrs` v1 update encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct YrsEngine;

impl MergeEngine for YrsEngine {
    type Doc = Doc;

    fn empty(&self) -> Doc {
        Doc::new()
    }

    fn apply_update(&self, doc: &mut Doc, update: &[u8]) -> Result<(), MergeError> {
        let update = Update::decode_v1(update).map_err(|e| MergeError::new(e.to_string()))?;
        let mut txn = doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| MergeError::new(e.to_string()))
    }

    fn encode_state_as_update(&self, doc: &Doc) -> Vec<u8> {
        let txn = doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    fn encode_state_vector(&self, doc: &Doc) -> Vec<u8> {
        let txn = doc.transact();
        txn.state_vector().encode_v1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{edit, text_of};

    #[test]
    fn test_fold_reproduces_source_document() {
        let source = Doc::new();
        let a = edit(&source, "Hello");
        let b = edit(&source, ", world");

        let engine = YrsEngine;
        let doc = engine.fold([a.as_slice(), b.as_slice()]).unwrap();
        assert_eq!(text_of(&doc), "Hello, world");
    }

    #[test]
    fn test_apply_is_idempotent() {
        let source = Doc::new();
        let a = edit(&source, "abc");

        let engine = YrsEngine;
        let once = engine.fold([a.as_slice()]).unwrap();
        let twice = engine.fold([a.as_slice(), a.as_slice()]).unwrap();
        assert_eq!(text_of(&once), text_of(&twice));
        assert_eq!(engine.encode_state_vector(&once), engine.encode_state_vector(&twice));
    }

    #[test]
    fn test_merge_matches_consolidated_doc() {
        let source = Doc::new();
        let updates: Vec<Vec<u8>> = (0..5).map(|i| edit(&source, &format!("[{i}]"))).collect();

        let engine = YrsEngine;
        let merged = engine.merge(updates.iter().map(Vec::as_slice)).unwrap();
        let replayed = engine.fold([merged.update.as_slice()]).unwrap();

        assert_eq!(text_of(&replayed), "[0][1][2][3][4]");
        assert_eq!(engine.encode_state_vector(&replayed), merged.state_vector);
    }

    #[test]
    fn test_corrupt_update_is_rejected() {
        let engine = YrsEngine;
        let mut doc = engine.empty();
        let result = engine.apply_update(&mut doc, &[0xff, 0xff, 0xff]);
        assert!(result.is_err());
    }
}
