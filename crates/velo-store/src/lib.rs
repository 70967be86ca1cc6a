//! `RocksDB` storage layer for velo.
//!
//! This crate provides durable storage for active rentals and service account
//! credentials using `RocksDB` column families with CBOR-encoded values.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `rentals`: One active rental per user, keyed by `user_id`
//! - `accounts`: Service account credentials, keyed by `login`
//!
//! A rental's termination cursor is only ever moved through
//! [`Store::advance_termination_step`], a compare-and-set that refuses to move
//! the cursor anywhere but one step forward from the value the caller read.
//!
//! # Example
//!
//! ```no_run
//! use velo_store::{RocksStore, Store};
//! use velo_core::UserId;
//!
//! let store = RocksStore::open("/tmp/velo-db").unwrap();
//!
//! let rental = store.get_rental(&UserId::new(42)).unwrap();
//! println!("active rental: {rental:?}");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{Account, Rental, TerminationStep};

use velo_core::{AccountLogin, UserId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Rental Operations
    // =========================================================================

    /// Insert or replace the rental record of its user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_rental(&self, rental: &Rental) -> Result<()>;

    /// Insert a rental, refusing to replace an existing one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already has a rental.
    fn create_rental(&self, rental: &Rental) -> Result<()>;

    /// Get the rental of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_rental(&self, user_id: &UserId) -> Result<Option<Rental>>;

    /// Delete the rental of a user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user has no rental.
    fn delete_rental(&self, user_id: &UserId) -> Result<()>;

    /// Move a rental's termination cursor from `from` to `to`.
    ///
    /// The write only happens if the stored step still equals `from` and `to`
    /// is its direct successor. Returns the updated rental.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user has no rental,
    /// `StoreError::StepConflict` if the stored step is not `from`, and
    /// `StoreError::InvalidStepTransition` if `to` does not follow `from`.
    fn advance_termination_step(
        &self,
        user_id: &UserId,
        from: TerminationStep,
        to: TerminationStep,
    ) -> Result<Rental>;

    /// List every stored rental.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_rentals(&self) -> Result<Vec<Rental>>;

    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or update an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Get an account by login.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, login: &AccountLogin) -> Result<Option<Account>>;
}
