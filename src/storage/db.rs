use redb::backends::InMemoryBackend;
use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

/// Statistics from a purge operation
#[derive(Debug, Default)]
pub struct PurgeStats {
    pub posts: u64,
    pub jobs: u64,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("fmtc.redb");
        let db = RedbDatabase::create(db_path)?;
        Self::init(db)
    }

    /// A database that lives only as long as the process (stub backend, tests).
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let db = redb::Builder::new().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: RedbDatabase) -> Result<Self, DatabaseError> {
        let db = Arc::new(db);

        // Initialize application tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(POSTS)?;
            let _ = write_txn.open_table(JOBS)?;
            let _ = write_txn.open_table(JOB_NUMBERS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    /// Allocate the next id for `sequence` inside `write_txn`. Ids start at 1.
    pub(crate) fn next_id(
        write_txn: &WriteTransaction,
        sequence: &str,
    ) -> Result<u64, DatabaseError> {
        let mut table = write_txn.open_table(SEQUENCES)?;
        let next = table.get(sequence)?.map(|v| v.value()).unwrap_or(0) + 1;
        table.insert(sequence, next)?;
        Ok(next)
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Purge all posts and local jobs - for testing only
    pub fn purge_all(&self) -> Result<PurgeStats, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut stats = PurgeStats::default();

        // Clear posts
        {
            let table = write_txn.open_table(POSTS)?;
            let keys: Vec<u64> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(POSTS)?;
            for key in keys {
                table.remove(key)?;
                stats.posts += 1;
            }
        }

        // Clear jobs
        {
            let table = write_txn.open_table(JOBS)?;
            let keys: Vec<i64> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(JOBS)?;
            for key in keys {
                table.remove(key)?;
                stats.jobs += 1;
            }
        }

        // Clear job number index
        {
            let table = write_txn.open_table(JOB_NUMBERS)?;
            let keys: Vec<i64> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(JOB_NUMBERS)?;
            for key in keys {
                table.remove(key)?;
            }
        }

        write_txn.commit()?;
        Ok(stats)
    }
}
