//! redb-backed local durable store
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `products` | product id | `LocalProduct` | Catalog mirror |
//! | `orders` | offline order id | `LocalOrder` | Locally captured sales |
//! | `customers` | customer id | `LocalCustomer` | Customer mirror |
//! | `settings` | setting key | `SettingRecord` | Store settings, device identity, counters |
//! | `conflicts` | order id | `ConflictRecord` | Detected local/server divergences |
//! | `sync_logs` | order id | `OrderTimeline` | Per-order sync event timeline |
//! | `secondary_index` | `(index, key)` | `()` | Named predicates (unsynced orders, unresolved conflicts) |
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`: once a write method returns,
//! the record survives power loss. A record and its index entries are written
//! in the same transaction, so a single record is never half-written.
//! Batches (`upsert_many`) commit record by record and are NOT atomic as a
//! whole; a crash mid-batch leaves a prefix of the batch applied.

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, WriteTransaction,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::partition::{INDEX_TABLE, Index, Partition, Record};

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a non-transactional batch write
#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: usize,
    /// Keys that failed, with the error; earlier writes stay committed
    pub failed: Vec<(String, StoreError)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Local durable store backed by redb
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Database>,
}

impl LocalStore {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StoreResult<Self> {
        // Create all tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            for partition in Partition::ALL {
                let _ = write_txn.open_table(partition.table())?;
            }
            let _ = write_txn.open_table(INDEX_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Writes ==========

    /// Insert or overwrite one record
    pub fn upsert_one<T: Record>(&self, record: &T) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        Self::put(&txn, record)?;
        txn.commit()?;
        Ok(())
    }

    /// Insert or overwrite records one commit at a time
    ///
    /// A failing record is reported and skipped; the rest of the batch is
    /// still attempted.
    pub fn upsert_many<T: Record>(&self, records: &[T]) -> BatchReport {
        let mut report = BatchReport::default();
        for record in records {
            match self.upsert_one(record) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    let key = record.key();
                    tracing::warn!(
                        partition = T::PARTITION.name(),
                        key = %key,
                        error = %e,
                        "Batch write failed for record"
                    );
                    report.failed.push((key, e));
                }
            }
        }
        report
    }

    /// Replace the whole partition with `records` in a single commit
    pub fn replace_all<T: Record>(&self, records: &[T]) -> StoreResult<usize> {
        let txn = self.db.begin_write()?;
        Self::clear_in_txn(&txn, T::PARTITION)?;
        for record in records {
            Self::put(&txn, record)?;
        }
        txn.commit()?;
        Ok(records.len())
    }

    /// Read-modify-write one record inside a single write transaction
    ///
    /// `apply` returns `false` to leave the record as it is. Returns the
    /// written record, or `None` when the key is absent or nothing changed.
    pub fn update<T: Record>(
        &self,
        key: &str,
        apply: impl FnOnce(&mut T) -> bool,
    ) -> StoreResult<Option<T>> {
        let txn = self.db.begin_write()?;
        let current: Option<T> = {
            let table = txn.open_table(T::PARTITION.table())?;
            let current = match table.get(key)? {
                Some(guard) => Some(serde_json::from_slice(guard.value())?),
                None => None,
            };
            current
        };

        let mut record = match current {
            Some(record) => record,
            None => {
                txn.abort()?;
                return Ok(None);
            }
        };
        if !apply(&mut record) {
            txn.abort()?;
            return Ok(None);
        }
        Self::put(&txn, &record)?;
        txn.commit()?;
        Ok(Some(record))
    }

    /// Delete one record; returns whether it existed
    pub fn delete(&self, partition: Partition, key: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write()?;
        let existed = {
            let mut table = txn.open_table(partition.table())?;
            let existed = table.remove(key)?.is_some();
            let mut idx = txn.open_table(INDEX_TABLE)?;
            for index in partition.indexes() {
                idx.remove((index.name(), key))?;
            }
            existed
        };
        txn.commit()?;
        Ok(existed)
    }

    /// Remove every record of a partition
    pub fn clear(&self, partition: Partition) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        Self::clear_in_txn(&txn, partition)?;
        txn.commit()?;
        Ok(())
    }

    fn put<T: Record>(txn: &WriteTransaction, record: &T) -> StoreResult<()> {
        let key = record.key();
        let value = serde_json::to_vec(record)?;

        let mut table = txn.open_table(T::PARTITION.table())?;
        table.insert(key.as_str(), value.as_slice())?;

        // Re-derive index membership from the new value
        let mut idx = txn.open_table(INDEX_TABLE)?;
        for index in T::PARTITION.indexes() {
            idx.remove((index.name(), key.as_str()))?;
        }
        for index in record.index_memberships() {
            idx.insert((index.name(), key.as_str()), ())?;
        }
        Ok(())
    }

    fn clear_in_txn(txn: &WriteTransaction, partition: Partition) -> StoreResult<()> {
        let mut table = txn.open_table(partition.table())?;
        let mut keys: Vec<String> = Vec::new();
        for result in table.iter()? {
            let (key, _) = result?;
            keys.push(key.value().to_string());
        }
        for key in &keys {
            table.remove(key.as_str())?;
        }

        let mut idx = txn.open_table(INDEX_TABLE)?;
        for index in partition.indexes() {
            for key in &keys {
                idx.remove((index.name(), key.as_str()))?;
            }
        }
        Ok(())
    }

    // ========== Reads ==========

    /// Get a record by key
    pub fn get<T: Record>(&self, key: &str) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::PARTITION.table())?;

        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get every record of the partition, in key order
    pub fn get_all<T: Record>(&self) -> StoreResult<Vec<T>> {
        self.get_all_matching(|_: &T| true)
    }

    /// Get every record satisfying `predicate`, in key order
    pub fn get_all_matching<T: Record>(
        &self,
        predicate: impl Fn(&T) -> bool,
    ) -> StoreResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::PARTITION.table())?;

        let mut records = Vec::new();
        for result in table.iter()? {
            let (_, guard) = result?;
            let record: T = serde_json::from_slice(guard.value())?;
            if predicate(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Get the records listed in a secondary index, in key order
    pub fn get_by_index<T: Record>(&self, index: Index) -> StoreResult<Vec<T>> {
        debug_assert_eq!(index.partition(), T::PARTITION);

        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(INDEX_TABLE)?;
        let data_table = read_txn.open_table(T::PARTITION.table())?;

        let mut records = Vec::new();
        let range_start: (&str, &str) = (index.name(), "");
        let range_end: (&str, &str) = (index.name(), "\u{ffff}");

        for result in idx_table.range(range_start..=range_end)? {
            let (key, _) = result?;
            let (_, record_key) = key.value();
            if let Some(guard) = data_table.get(record_key)? {
                records.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(records)
    }

    /// Number of entries in a secondary index
    pub fn count_index(&self, index: Index) -> StoreResult<usize> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(INDEX_TABLE)?;

        let range_start: (&str, &str) = (index.name(), "");
        let range_end: (&str, &str) = (index.name(), "\u{ffff}");
        let mut count = 0;
        for result in idx_table.range(range_start..=range_end)? {
            result?;
            count += 1;
        }
        Ok(count)
    }

    /// Whether a key is present, without decoding the value
    pub fn contains(&self, partition: Partition, key: &str) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(partition.table())?;
        Ok(table.get(key)?.is_some())
    }

    /// Number of records in a partition
    pub fn count(&self, partition: Partition) -> StoreResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(partition.table())?;
        Ok(table.len()? as usize)
    }

    /// Raw `(key, bytes)` pairs of a partition, for diagnostics
    pub fn dump_raw(&self, partition: Partition) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(partition.table())?;

        let mut entries = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            entries.push((key.value().to_string(), value.value().to_vec()));
        }
        Ok(entries)
    }
}
