//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options,
};
use velo_core::{AccountLogin, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{Account, Rental, TerminationStep};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes read-modify-write sequences (create, step advance).
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn write_rental(&self, rental: &Rental) -> Result<()> {
        let cf = self.cf(cf::RENTALS)?;
        let key = keys::rental_key(&rental.user_id);
        let value = Self::serialize(rental)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Rental Operations
    // =========================================================================

    fn put_rental(&self, rental: &Rental) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_rental(rental)
    }

    fn create_rental(&self, rental: &Rental) -> Result<()> {
        let _guard = self.write_lock.lock();

        if self.get_rental(&rental.user_id)?.is_some() {
            return Err(StoreError::AlreadyExists);
        }
        self.write_rental(rental)
    }

    fn get_rental(&self, user_id: &UserId) -> Result<Option<Rental>> {
        let cf = self.cf(cf::RENTALS)?;
        let key = keys::rental_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn delete_rental(&self, user_id: &UserId) -> Result<()> {
        let _guard = self.write_lock.lock();

        if self.get_rental(user_id)?.is_none() {
            return Err(StoreError::NotFound);
        }

        let cf = self.cf(cf::RENTALS)?;
        self.db
            .delete_cf(&cf, keys::rental_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn advance_termination_step(
        &self,
        user_id: &UserId,
        from: TerminationStep,
        to: TerminationStep,
    ) -> Result<Rental> {
        if !TerminationStep::is_valid_advance(from, to) {
            return Err(StoreError::InvalidStepTransition { from, to });
        }

        let _guard = self.write_lock.lock();

        let mut rental = self.get_rental(user_id)?.ok_or(StoreError::NotFound)?;
        if rental.termination_step != from {
            return Err(StoreError::StepConflict {
                expected: from,
                found: rental.termination_step,
            });
        }

        rental.termination_step = to;
        rental.updated_at = chrono::Utc::now();
        self.write_rental(&rental)?;

        Ok(rental)
    }

    fn list_rentals(&self) -> Result<Vec<Rental>> {
        let cf = self.cf(cf::RENTALS)?;

        let mut rentals = Vec::new();
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let user_id = keys::user_id_from_rental_key(&key)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let rental: Rental = Self::deserialize(&value)?;

            if rental.user_id != user_id {
                return Err(StoreError::Serialization(format!(
                    "rental keyed by user {user_id} belongs to user {}",
                    rental.user_id
                )));
            }
            rentals.push(rental);
        }

        Ok(rentals)
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.login);
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_account(&self, login: &AccountLogin) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(login);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }
}
