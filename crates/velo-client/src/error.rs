//! Remote client error types.

use thiserror::Error;

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that prevent a remote operation from producing an outcome.
///
/// Ordinary non-200 responses are not errors; they are reported as
/// [`RemoteOutcome::ServiceError`](crate::RemoteOutcome::ServiceError).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or the response could not be read.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A successful response carried a body that could not be parsed.
    #[error("unparseable response: {0}")]
    InvalidResponse(String),

    /// No usable credentials are known for the account.
    #[error("credentials unavailable for account {login}: {reason}")]
    Credentials {
        /// The account login.
        login: String,
        /// Why the credentials could not be resolved.
        reason: String,
    },

    /// The client was configured with an invalid value.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns true for failures of the exchange itself (network or parsing).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::InvalidResponse(_))
    }
}
