//! redb-based storage for live checks
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `checks` | `serial` | `Check` (JSON) | 当前营业日的账单 |
//! | `meta` | `"format_version"` / `"serial"` | `u64` | 格式版本与流水号计数器 |
//!
//! # Recovery
//!
//! A database file that redb refuses as corrupted is renamed to
//! `<file>.bak` and a fresh database is created in its place. A newer
//! format version is refused without touching the file.

use crate::persist::versioned::backup_path;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use shared::error::{AppError, ErrorCode};
use shared::order::Check;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Table for live checks: key = serial, value = JSON-serialized Check
const CHECKS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("checks");

/// Table for counters: key = "format_version" or "serial", value = u64
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const FORMAT_VERSION_KEY: &str = "format_version";
const SERIAL_KEY: &str = "serial";

/// Current on-disk format of the check store
pub const FORMAT_VERSION: u64 = 1;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
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

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Check store format version {found} is newer than supported {max}")]
    UnsupportedVersion { found: u64, max: u64 },

    #[error("Check not found: {0}")]
    CheckNotFound(u64),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnsupportedVersion { .. } => {
                AppError::with_message(ErrorCode::UnsupportedVersion, err.to_string())
            }
            StorageError::CheckNotFound(serial) => AppError::with_message(
                ErrorCode::CheckNotFound,
                format!("check {} not found", serial),
            ),
            other => AppError::database(other.to_string()),
        }
    }
}

fn is_corruption(err: &redb::DatabaseError) -> bool {
    match err {
        redb::DatabaseError::Storage(redb::StorageError::Corrupted(_)) => true,
        redb::DatabaseError::Storage(redb::StorageError::Io(e)) => matches!(
            e.kind(),
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

/// Live check store
pub struct CheckStorage {
    db: Database,
    path: PathBuf,
}

impl CheckStorage {
    /// Open or create the store at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;
        Self::init(db, path)
    }

    /// Open the store, replacing a corrupted file with a fresh one
    ///
    /// Returns the store and whether recovery happened.
    pub fn open_or_recover(path: impl AsRef<Path>) -> StorageResult<(Self, bool)> {
        let path = path.as_ref().to_path_buf();
        match Database::create(&path) {
            Ok(db) => Ok((Self::init(db, path)?, false)),
            Err(e) if is_corruption(&e) => {
                let bak = backup_path(&path);
                tracing::warn!(
                    path = %path.display(),
                    backup = %bak.display(),
                    error = %e,
                    "Check store corrupted, moving aside"
                );
                std::fs::rename(&path, &bak).map_err(|source| StorageError::Io {
                    path: path.clone(),
                    source,
                })?;
                let db = Database::create(&path)?;
                Ok((Self::init(db, path)?, true))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn init(db: Database, path: PathBuf) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CHECKS_TABLE)?;
            let mut meta = write_txn.open_table(META_TABLE)?;
            let found = meta.get(FORMAT_VERSION_KEY)?.map(|g| g.value());
            match found {
                Some(v) if v > FORMAT_VERSION => {
                    return Err(StorageError::UnsupportedVersion {
                        found: v,
                        max: FORMAT_VERSION,
                    });
                }
                Some(_) => {}
                None => {
                    meta.insert(FORMAT_VERSION_KEY, FORMAT_VERSION)?;
                }
            }
            if meta.get(SERIAL_KEY)?.is_none() {
                meta.insert(SERIAL_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========== Serial ==========

    /// Last assigned serial
    pub fn current_serial(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(META_TABLE)?;
        Ok(table.get(SERIAL_KEY)?.map(|g| g.value()).unwrap_or(0))
    }

    // ========== Checks ==========

    /// Assign the next serial and store the check in one transaction
    pub fn persist_check(&self, check: &mut Check) -> StorageResult<u64> {
        let txn = self.db.begin_write()?;
        let serial = {
            let mut meta = txn.open_table(META_TABLE)?;
            let next = meta.get(SERIAL_KEY)?.map(|g| g.value()).unwrap_or(0) + 1;
            meta.insert(SERIAL_KEY, next)?;
            next
        };
        check.serial = serial;
        {
            let mut table = txn.open_table(CHECKS_TABLE)?;
            let value = serde_json::to_vec(&*check)?;
            table.insert(serial, value.as_slice())?;
        }
        txn.commit()?;
        tracing::debug!(serial = serial, orders = check.order_count(), "Check persisted");
        Ok(serial)
    }

    /// Overwrite an already persisted check
    pub fn update_check(&self, check: &Check) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CHECKS_TABLE)?;
            if table.get(check.serial)?.is_none() {
                return Err(StorageError::CheckNotFound(check.serial));
            }
            let value = serde_json::to_vec(check)?;
            table.insert(check.serial, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_check(&self, serial: u64) -> StorageResult<Option<Check>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHECKS_TABLE)?;
        match table.get(serial)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All live checks in serial order; undecodable entries are skipped
    pub fn list_checks(&self) -> StorageResult<Vec<Check>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHECKS_TABLE)?;
        let mut checks = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            match serde_json::from_slice::<Check>(value.value()) {
                Ok(check) => checks.push(check),
                Err(e) => {
                    tracing::warn!(serial = key.value(), error = %e, "Skipping undecodable check");
                }
            }
        }
        Ok(checks)
    }

    pub fn serials(&self) -> StorageResult<Vec<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHECKS_TABLE)?;
        let mut serials = Vec::new();
        for result in table.iter()? {
            let (key, _) = result?;
            serials.push(key.value());
        }
        Ok(serials)
    }

    pub fn check_count(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHECKS_TABLE)?;
        Ok(table.len()?)
    }

    /// Remove checks (after they were archived)
    pub fn remove_checks(&self, serials: &[u64]) -> StorageResult<usize> {
        let txn = self.db.begin_write()?;
        let mut removed = 0;
        {
            let mut table = txn.open_table(CHECKS_TABLE)?;
            for serial in serials {
                if table.remove(*serial)?.is_some() {
                    removed += 1;
                }
            }
        }
        txn.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::order::Order;

    fn sample_check() -> Check {
        let mut check = Check::new(1_700_000_000_000);
        check.sub_checks[0].orders.push(Order {
            item_code: "PZ1".into(),
            name: "Pizza".into(),
            family: "Pizza".into(),
            quantity: 1,
            unit_price: Decimal::new(1200, 2),
            details: Vec::new(),
        });
        check
    }

    #[test]
    fn test_serials_increase() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CheckStorage::open(dir.path().join("checks.redb")).unwrap();

        let mut a = sample_check();
        let mut b = sample_check();
        assert_eq!(storage.persist_check(&mut a).unwrap(), 1);
        assert_eq!(storage.persist_check(&mut b).unwrap(), 2);
        assert_eq!(b.serial, 2);
        assert_eq!(storage.check_count().unwrap(), 2);
        assert_eq!(storage.get_check(1).unwrap().unwrap(), a);
    }

    #[test]
    fn test_serial_survives_reopen_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checks.redb");
        {
            let storage = CheckStorage::open(&path).unwrap();
            let mut c = sample_check();
            storage.persist_check(&mut c).unwrap();
            assert_eq!(storage.remove_checks(&[1, 99]).unwrap(), 1);
        }
        let storage = CheckStorage::open(&path).unwrap();
        assert_eq!(storage.check_count().unwrap(), 0);
        let mut c = sample_check();
        assert_eq!(storage.persist_check(&mut c).unwrap(), 2);
    }

    #[test]
    fn test_update_requires_existing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CheckStorage::open(dir.path().join("checks.redb")).unwrap();
        let mut c = sample_check();
        storage.persist_check(&mut c).unwrap();
        c.status = shared::order::CheckStatus::Closed;
        storage.update_check(&c).unwrap();
        assert!(storage.get_check(1).unwrap().unwrap().is_closed());

        c.serial = 42;
        assert!(matches!(
            storage.update_check(&c),
            Err(StorageError::CheckNotFound(42))
        ));
    }

    #[test]
    fn test_corrupted_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checks.redb");
        std::fs::write(&path, vec![0xABu8; 8192]).unwrap();

        let (storage, recovered) = CheckStorage::open_or_recover(&path).unwrap();
        assert!(recovered);
        assert!(backup_path(&path).exists());
        assert_eq!(storage.check_count().unwrap(), 0);
    }
}
