//! RocksDB-backed ordered key-value store.
//!
//! All records live in one column family, `records`, keyed by the encoded
//! tuple string. Update keys of one document are contiguous, so replay and
//! cleanup are sequential range scans over that column family.
//!
//! Reference: Kleppmann, DDIA, Chapter 3 (LSM Trees, SSTables)

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};

use super::{KvEntry, KvStore, ListOptions};
use crate::error::{StoreError, StoreResult};

/// Column family holding update and state-vector records.
const CF_RECORDS: &str = "records";

/// RocksDB configuration.
#[derive(Debug, Clone)]
pub struct RocksConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 256MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size (default: 64MB)
    pub write_buffer_size: usize,
}

impl Default for RocksConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logos_data"),
            block_cache_size: 256 * 1024 * 1024, // 256MB
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl RocksConfig {
    /// Create config for testing (small caches).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024, // 8MB
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024, // 4MB
        }
    }
}

/// [`KvStore`] over a RocksDB database.
///
/// RocksDB calls run inline on the calling task and block its tokio worker
/// for the duration of the I/O. The store's transaction queue keeps at most
/// one such call in flight.
pub struct RocksKv {
    /// RocksDB instance (single-threaded mode; writes are serialized by the queue)
    db: DBWithThreadMode<SingleThreaded>,
    config: RocksConfig,
}

impl RocksKv {
    /// Open (or create) the database at the configured path.
    pub fn open(config: RocksConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let descriptor = ColumnFamilyDescriptor::new(CF_RECORDS, Self::cf_options(&config));
        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            vec![descriptor],
        )?;

        log::info!("Opened RocksDB store at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(config: &RocksConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024); // 16KB blocks
        opts.set_block_based_table_factory(&block_opts);

        // Payloads are small CRDT deltas with lots of structure
        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(4);
        opts
    }

    /// Force buffered writes to disk.
    pub fn sync(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self) -> StoreResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_RECORDS)
            .ok_or_else(|| StoreError::Backend(format!("Column family '{CF_RECORDS}' not found")))
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

#[async_trait]
impl KvStore for RocksKv {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let cf = self.cf()?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    async fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let cf = self.cf()?;
        self.db
            .put_cf_opt(cf, key.as_bytes(), value, &self.write_options())?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let cf = self.cf()?;
        let mut batch = WriteBatch::default();
        for key in keys {
            batch.delete_cf(cf, key.as_bytes());
        }
        self.db.write_opt(batch, &self.write_options())?;
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> StoreResult<Vec<KvEntry>> {
        if options.start >= options.end {
            return Ok(Vec::new());
        }

        let cf = self.cf()?;
        let start = options.start.as_bytes();
        let end = options.end.as_bytes();
        let limit = options.limit.unwrap_or(usize::MAX);

        // Reverse iteration seeks to the last key <= end; `end` itself is skipped below.
        let mode = if options.reverse {
            IteratorMode::From(end, Direction::Reverse)
        } else {
            IteratorMode::From(start, Direction::Forward)
        };

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item?;
            let key = key.as_ref();
            if options.reverse {
                if key >= end {
                    continue;
                }
                if key < start {
                    break;
                }
            } else if key >= end {
                break;
            }

            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::CorruptKey(e.to_string()))?;
            let value = if options.keys_only { Vec::new() } else { value.to_vec() };
            entries.push(KvEntry { key, value });
        }

        Ok(entries)
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
