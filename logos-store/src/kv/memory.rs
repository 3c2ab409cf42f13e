//! In-memory ordered store for tests and ephemeral rooms.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KvEntry, KvStore, ListOptions};
use crate::error::StoreResult;

/// `BTreeMap`-backed [`KvStore`]. Data is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// All keys in order (for inspection in tests).
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> StoreResult<Vec<KvEntry>> {
        // BTreeMap::range panics on an inverted range
        if options.start >= options.end {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let range = entries.range::<str, _>((
            Bound::Included(options.start.as_str()),
            Bound::Excluded(options.end.as_str()),
        ));
        let limit = options.limit.unwrap_or(usize::MAX);
        let to_entry = |(key, value): (&String, &Vec<u8>)| KvEntry {
            key: key.clone(),
            value: if options.keys_only { Vec::new() } else { value.clone() },
        };

        let listed = if options.reverse {
            range.rev().take(limit).map(to_entry).collect()
        } else {
            range.take(limit).map(to_entry).collect()
        };
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryKv {
        let kv = MemoryKv::new();
        for key in ["a", "b", "c", "d"] {
            kv.put(key, key.as_bytes()).await.unwrap();
        }
        kv
    }

    #[tokio::test]
    async fn test_list_is_half_open() {
        let kv = seeded().await;
        let listed = kv.list(ListOptions::range("b", "d")).await.unwrap();
        let keys: Vec<_> = listed.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["b", "c"]);
        assert_eq!(listed[0].value, b"b");
    }

    #[tokio::test]
    async fn test_list_reverse_with_limit() {
        let kv = seeded().await;
        let listed = kv
            .list(ListOptions::range("a", "z").reverse().limit(1))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "d");
    }

    #[tokio::test]
    async fn test_list_keys_only_and_inverted_range() {
        let kv = seeded().await;
        let listed = kv.list(ListOptions::range("a", "c").keys_only()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|e| e.value.is_empty()));

        assert!(kv.list(ListOptions::range("d", "a")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_ignores_missing_keys() {
        let kv = seeded().await;
        kv.delete(&["a".to_string(), "zz".to_string()]).await.unwrap();
        assert_eq!(kv.keys().await, ["b", "c", "d"]);
        assert_eq!(kv.get("a").await.unwrap(), None);
    }
}
