//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Active rental records, keyed by `user_id`.
    pub const RENTALS: &str = "rentals";

    /// Service account credentials, keyed by `login`.
    pub const ACCOUNTS: &str = "accounts";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::RENTALS, cf::ACCOUNTS]
}
