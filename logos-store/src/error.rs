//! Error type shared by every layer of the store.

use crate::engine::MergeError;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A persisted key does not follow the tuple encoding (corrupted storage)
    CorruptKey(String),
    /// A range delete would exceed the batch cap; nothing was deleted
    RangeTooLarge { count: usize, cap: usize },
    /// The key-value backend failed
    Backend(String),
    /// The merge engine rejected a payload
    Merge(String),
    /// Serialization failed
    Serialization(String),
    /// Deserialization failed
    Deserialization(String),
    /// No clock values left below the range ceiling for this document
    ClockExhausted(String),
    /// The queued operation panicked or the queue shut down before it ran
    Aborted(String),
    /// The store was constructed outside a tokio runtime
    NoRuntime,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::CorruptKey(key) => write!(f, "Corrupt storage key: {key}"),
            StoreError::RangeTooLarge { count, cap } => {
                write!(f, "Range too large: {count} keys exceeds the delete cap of {cap}")
            }
            StoreError::Backend(e) => write!(f, "Backend error: {e}"),
            StoreError::Merge(e) => write!(f, "Merge error: {e}"),
            StoreError::Serialization(e) => write!(f, "Serialization error: {e}"),
            StoreError::Deserialization(e) => write!(f, "Deserialization error: {e}"),
            StoreError::ClockExhausted(name) => write!(f, "Clock exhausted for document '{name}'"),
            StoreError::Aborted(e) => write!(f, "Transaction aborted: {e}"),
            StoreError::NoRuntime => write!(f, "No tokio runtime available"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<MergeError> for StoreError {
    fn from(e: MergeError) -> Self {
        StoreError::Merge(e.to_string())
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Result alias used across the crate.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::RangeTooLarge { count: 200, cap: 128 };
        assert!(err.to_string().contains("200"));
        assert!(err.to_string().contains("128"));

        let err = StoreError::Backend("disk gone".into());
        assert!(err.to_string().contains("Backend error"));

        let err = StoreError::ClockExhausted("notes".into());
        assert!(err.to_string().contains("notes"));
    }

    #[test]
    fn test_merge_error_converts() {
        let err: StoreError = MergeError::new("bad update").into();
        assert_eq!(err, StoreError::Merge("bad update".into()));
    }
}
