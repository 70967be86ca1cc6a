//! Domain types stored in the database.
//!
//! These types represent the persisted state of active rentals and of the
//! service accounts rentals are made with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use velo_core::{AccountLogin, DeviceId, RentalId, UserId};

/// An active rental record, one per user.
///
/// Only `termination_step` (and `updated_at`) change after creation; the
/// remote identifiers and the account login are fixed for the rental's life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    /// The user holding the rental. Unique key.
    pub user_id: UserId,
    /// Service account the rental was started with.
    pub account_login: AccountLogin,
    /// Remote rental id (`rentId`).
    pub rental_id: RentalId,
    /// Remote device id of the bike.
    pub device_id: DeviceId,
    /// Frame number printed on the bike.
    pub frame_number: String,
    /// Termination progress cursor.
    pub termination_step: TerminationStep,
    /// When the rental was started.
    pub started_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Rental {
    /// Build a freshly started rental that has not begun terminating.
    #[must_use]
    pub fn new(
        user_id: UserId,
        account_login: AccountLogin,
        rental_id: RentalId,
        device_id: DeviceId,
        frame_number: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            account_login,
            rental_id,
            device_id,
            frame_number: frame_number.into(),
            termination_step: TerminationStep::NotStarted,
            started_at: now,
            updated_at: now,
        }
    }

    /// Returns true once the first termination call has been attempted.
    #[must_use]
    pub const fn is_terminating(&self) -> bool {
        self.termination_step.is_terminating()
    }
}

/// Position of a rental in the four-call termination sequence.
///
/// The value names the *next* remote call to issue. Completing
/// `FinishAfterUpload` has no successor: the rental record is deleted instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TerminationStep {
    /// Termination has not been requested yet.
    #[default]
    NotStarted = 0,
    /// Finish the rental.
    Finish = 1,
    /// Park the bike at a parking.
    Park = 2,
    /// Upload the proof-of-parking photo.
    UploadPhoto = 3,
    /// Finish the rental after the photo upload.
    FinishAfterUpload = 4,
}

impl TerminationStep {
    /// Convert the step to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `TerminationStep`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotStarted),
            1 => Some(Self::Finish),
            2 => Some(Self::Park),
            3 => Some(Self::UploadPhoto),
            4 => Some(Self::FinishAfterUpload),
            _ => None,
        }
    }

    /// The step that follows this one, or `None` after the last remote call.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::Finish),
            Self::Finish => Some(Self::Park),
            Self::Park => Some(Self::UploadPhoto),
            Self::UploadPhoto => Some(Self::FinishAfterUpload),
            Self::FinishAfterUpload => None,
        }
    }

    /// Returns true for every step past `NotStarted`.
    #[must_use]
    pub const fn is_terminating(self) -> bool {
        !matches!(self, Self::NotStarted)
    }

    /// Check that `to` is exactly the successor of `from`.
    #[must_use]
    pub const fn is_valid_advance(from: Self, to: Self) -> bool {
        match from.next() {
            Some(next) => next.as_u8() == to.as_u8(),
            None => false,
        }
    }
}

impl TryFrom<u8> for TerminationStep {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or_else(|| format!("invalid termination step: {value}"))
    }
}

impl From<TerminationStep> for u8 {
    fn from(step: TerminationStep) -> Self {
        step.as_u8()
    }
}

/// Stored credentials of a bike-share service account.
///
/// Written by the external credential refresher; read when issuing requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account login.
    pub login: AccountLogin,
    /// Bearer token sent in the `Authorization` header.
    pub token: String,
    /// Anti-bot session cookie value (`qrator_jsid`).
    pub cookie: String,
    /// When the credentials were last refreshed.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_advance_one_at_a_time() {
        use TerminationStep::*;

        assert_eq!(NotStarted.next(), Some(Finish));
        assert_eq!(Finish.next(), Some(Park));
        assert_eq!(Park.next(), Some(UploadPhoto));
        assert_eq!(UploadPhoto.next(), Some(FinishAfterUpload));
        assert_eq!(FinishAfterUpload.next(), None);
    }

    #[test]
    fn advance_validation() {
        use TerminationStep::*;

        assert!(TerminationStep::is_valid_advance(Finish, Park));
        assert!(!TerminationStep::is_valid_advance(Finish, UploadPhoto));
        assert!(!TerminationStep::is_valid_advance(Park, Finish));
        assert!(!TerminationStep::is_valid_advance(Park, Park));
        assert!(!TerminationStep::is_valid_advance(FinishAfterUpload, NotStarted));
    }

    #[test]
    fn numeric_roundtrip() {
        for value in 0..=4u8 {
            let step = TerminationStep::from_u8(value).unwrap();
            assert_eq!(step.as_u8(), value);
        }
        assert!(TerminationStep::from_u8(5).is_none());
    }

    #[test]
    fn persisted_as_integer() {
        let json = serde_json::to_string(&TerminationStep::Park).unwrap();
        assert_eq!(json, "2");
        assert!(serde_json::from_str::<TerminationStep>("7").is_err());
    }

    #[test]
    fn new_rental_not_terminating() {
        let rental = Rental::new(
            UserId::new(42),
            AccountLogin::new("u1").unwrap(),
            RentalId::new("R1").unwrap(),
            DeviceId::new("D1").unwrap(),
            "12345",
        );
        assert_eq!(rental.termination_step, TerminationStep::NotStarted);
        assert!(!rental.is_terminating());
        assert_eq!(rental.started_at, rental.updated_at);
    }
}
