//! Core identifier types for velo.
//!
//! This module provides strongly-typed identifiers for users, rentals, devices
//! and service accounts. Remote identifiers are opaque strings handed out by the
//! bike-share service; they are never parsed, only compared and echoed back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An external user identity (the chat id of the bot user).
///
/// This is the unique key of an active rental: a user holds at most one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Create a new `UserId` from its numeric value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Return the numeric value.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Return the big-endian byte encoding, used as a storage key.
    #[must_use]
    pub const fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode a `UserId` from its big-endian byte encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 8 bytes.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let arr: [u8; 8] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: 8,
            got: bytes.len(),
        })?;
        Ok(Self(i64::from_be_bytes(arr)))
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| IdError::InvalidUserId(s.to_string()))
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A rental identifier issued by the bike-share service (`rentId`).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RentalId(String);

impl RentalId {
    /// Create a `RentalId`, rejecting empty input.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if the value is empty or whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        non_empty(value.into(), "rental id").map(Self)
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RentalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RentalId({})", self.0)
    }
}

impl fmt::Display for RentalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RentalId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RentalId> for String {
    fn from(id: RentalId) -> Self {
        id.0
    }
}

impl AsRef<str> for RentalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The IoT device identifier of a bike (`deviceId`).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a `DeviceId`, rejecting empty input.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if the value is empty or whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        non_empty(value.into(), "device id").map(Self)
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// The login of a bike-share service account used to rent on behalf of users.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountLogin(String);

impl AccountLogin {
    /// Create an `AccountLogin`, rejecting empty input.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if the value is empty or whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        non_empty(value.into(), "account login").map(Self)
    }

    /// Return the login as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountLogin({})", self.0)
    }
}

impl fmt::Display for AccountLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccountLogin {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountLogin> for String {
    fn from(login: AccountLogin) -> Self {
        login.0
    }
}

fn non_empty(value: String, kind: &'static str) -> Result<String, IdError> {
    if value.trim().is_empty() {
        Err(IdError::Empty(kind))
    } else {
        Ok(value)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// The user id is not a valid integer.
    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },
}
