//! Key encoding utilities for `RocksDB`.
//!
//! Rentals are keyed by the fixed-width big-endian user id; accounts by the
//! raw login bytes.

use velo_core::{AccountLogin, IdError, UserId};

/// Encode a rental key (the user id bytes).
#[must_use]
pub fn rental_key(user_id: &UserId) -> Vec<u8> {
    user_id.to_be_bytes().to_vec()
}

/// Decode the user id from a rental key.
///
/// # Errors
///
/// Returns an error if the key is not 8 bytes long.
pub fn user_id_from_rental_key(key: &[u8]) -> Result<UserId, IdError> {
    UserId::from_be_slice(key)
}

/// Encode an account key (the login bytes).
#[must_use]
pub fn account_key(login: &AccountLogin) -> Vec<u8> {
    login.as_str().as_bytes().to_vec()
}
