//! RocksDB key/value layer used by the durable ledger store

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

use crate::config::{CompressionType, StorageConfig};
use crate::errors::StorageError;

#[derive(Clone)]
pub struct OptimizedStorage {
    db: Arc<DB>,
}

impl OptimizedStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::with_config(path, &StorageConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self, StorageError> {
        if config.clear_on_start && path.as_ref().exists() {
            tracing::warn!(path = %path.as_ref().display(), "clearing ledger database on start");
            DB::destroy(&Options::default(), path.as_ref())
                .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(config.max_write_buffer_number as i32);
        opts.set_compression_type(match config.compression_type {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        });

        let db = DB::open(&opts, path).map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db.get(key).map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    /// All pairs whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut out = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Apply every put and delete in `batch` atomically.
    pub fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.db.write(batch).map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    pub fn batch_write<K, V>(&self, items: &[(K, V)]) -> Result<(), StorageError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        self.write(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_prefix_stops_at_prefix_boundary() {
        let dir = TempDir::new().unwrap();
        let storage = OptimizedStorage::new(dir.path()).unwrap();

        storage
            .batch_write(&[
                (b"a:1".to_vec(), b"one".to_vec()),
                (b"a:2".to_vec(), b"two".to_vec()),
                (b"b:1".to_vec(), b"other".to_vec()),
            ])
            .unwrap();

        let rows = storage.scan_prefix(b"a:").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].1, b"two".to_vec());
        assert_eq!(storage.get(b"b:1").unwrap(), Some(b"other".to_vec()));
    }
}
