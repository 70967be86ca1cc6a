//! Error types for rental coordination.

use thiserror::Error;
use velo_client::ClientError;
use velo_core::{IdError, RentalId, UserId};

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in rental operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The user already has an active rental.
    #[error("user {0} already has an active rental")]
    AlreadyActive(UserId),

    /// The user has no active rental.
    #[error("user {0} has no active rental")]
    NoActiveRental(UserId),

    /// The caller named a different rental than the stored one.
    #[error("rental mismatch for user {user_id}: expected {expected}, found {actual}")]
    RentalMismatch {
        /// The user whose rental was addressed.
        user_id: UserId,
        /// The rental id supplied by the caller.
        expected: RentalId,
        /// The rental id actually stored.
        actual: RentalId,
    },

    /// The bike-share service refused the request.
    #[error("rejected by the bike-share service: {reason}")]
    RemoteRejected {
        /// Rejection reason reported by the service.
        reason: String,
    },

    /// The bike-share service answered with an unexpected status.
    #[error("bike-share service error {status}: {body}")]
    ServiceError {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The exchange with the bike-share service failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// No credentials are available for the rental's account.
    #[error("credentials unavailable: {0}")]
    Credentials(String),

    /// Termination failed on every allowed attempt.
    #[error(
        "could not finish rental {rental_id} after {attempts} attempts, \
         stop the rental manually: {last_error}"
    )]
    RetriesExhausted {
        /// The remote rental id.
        rental_id: RentalId,
        /// Number of failed attempts.
        attempts: u32,
        /// The last failure.
        last_error: String,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] velo_store::StoreError),

    /// An identifier failed validation.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidId(_) => 400,
            Self::NoActiveRental(_) => 404,
            Self::AlreadyActive(_) | Self::RentalMismatch { .. } => 409,
            Self::RemoteRejected { .. } => 422,
            Self::ServiceError { .. } | Self::Transport(_) | Self::RetriesExhausted { .. } => 502,
            Self::Credentials(_) => 503,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ServiceError { .. }
                | Self::Transport(_)
                | Self::Credentials(_)
                | Self::Store(_)
                | Self::Internal(_)
        )
    }
}

impl From<ClientError> for ControlError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Transport(msg) | ClientError::InvalidResponse(msg) => Self::Transport(msg),
            ClientError::Credentials { login, reason } => {
                Self::Credentials(format!("account {login}: {reason}"))
            }
            ClientError::Config(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        let user_id = UserId::new(42);
        let rental_id = RentalId::new("R1").unwrap();

        assert_eq!(ControlError::AlreadyActive(user_id).http_status_code(), 409);
        assert_eq!(ControlError::NoActiveRental(user_id).http_status_code(), 404);
        assert_eq!(
            ControlError::RentalMismatch {
                user_id,
                expected: RentalId::new("R2").unwrap(),
                actual: rental_id.clone(),
            }
            .http_status_code(),
            409
        );
        assert_eq!(
            ControlError::RemoteRejected {
                reason: "ACCOUNT_BLOCKED".to_string()
            }
            .http_status_code(),
            422
        );
        assert_eq!(
            ControlError::RetriesExhausted {
                rental_id,
                attempts: 5,
                last_error: "boom".to_string()
            }
            .http_status_code(),
            502
        );
    }

    #[test]
    fn retriable_errors() {
        assert!(ControlError::Transport("reset".to_string()).is_retriable());
        assert!(ControlError::ServiceError {
            status: 500,
            body: String::new()
        }
        .is_retriable());
        assert!(!ControlError::AlreadyActive(UserId::new(1)).is_retriable());
        assert!(!ControlError::RemoteRejected {
            reason: "x".to_string()
        }
        .is_retriable());
    }

    #[test]
    fn client_errors_convert() {
        let err: ControlError = ClientError::InvalidResponse("bad json".to_string()).into();
        assert!(matches!(err, ControlError::Transport(_)));

        let err: ControlError = ClientError::Credentials {
            login: "u1".to_string(),
            reason: "unknown account".to_string(),
        }
        .into();
        assert!(matches!(err, ControlError::Credentials(_)));
    }
}
