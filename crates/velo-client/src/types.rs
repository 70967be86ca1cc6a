//! Request and response types for the bike-share service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use velo_core::GeoPosition;

/// Outcome of a remote operation that reached the service.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome<T> {
    /// The service accepted the request (HTTP 200).
    Completed(T),
    /// The service does not know the target (HTTP 404).
    NotFound,
    /// The service answered with another status.
    ServiceError {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
}

impl<T> RemoteOutcome<T> {
    /// Returns true for `Completed`.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Map the completed payload.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RemoteOutcome<U> {
        match self {
            Self::Completed(value) => RemoteOutcome::Completed(f(value)),
            Self::NotFound => RemoteOutcome::NotFound,
            Self::ServiceError { status, body } => RemoteOutcome::ServiceError { status, body },
        }
    }
}

/// Which lock of the bike to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    /// Rear-wheel lock of IoT bikes.
    Omni,
    /// Front chain/cable lock.
    Chain,
}

impl LockType {
    /// The service command path segment for this lock.
    #[must_use]
    pub const fn command(self) -> &'static str {
        match self {
            Self::Omni => "openOmniLock",
            Self::Chain => "openChainLock",
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Omni => f.write_str("omni"),
            Self::Chain => f.write_str("chain"),
        }
    }
}

impl FromStr for LockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "omni" => Ok(Self::Omni),
            "chain" => Ok(Self::Chain),
            other => Err(format!("invalid lock type: {other}")),
        }
    }
}

/// Status value the service reports when a rental could not start.
pub const ERROR_START: &str = "ERROR_START";

/// Body of the start-rental response.
///
/// Every field is optional: a rejected start carries only `status` and
/// `failedReason`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    /// Rental status, `ERROR_START` on rejection.
    #[serde(default)]
    pub status: Option<String>,
    /// Rejection reason, e.g. `ACCOUNT_BLOCKED`.
    #[serde(default)]
    pub failed_reason: Option<String>,
    /// Remote rental id.
    #[serde(default, deserialize_with = "string_or_number")]
    pub rent_id: Option<String>,
    /// Remote device id.
    #[serde(default, deserialize_with = "string_or_number")]
    pub device_id: Option<String>,
    /// Frame number of the rented bike.
    #[serde(default, deserialize_with = "string_or_number")]
    pub frame_number: Option<String>,
}

impl StartResponse {
    /// Returns true if the service refused to start the rental.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.status.as_deref() == Some(ERROR_START)
    }
}

/// Accept identifiers the service sends either as strings or as numbers.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Request body for starting a rental.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartRequest<'a> {
    pub frame_number: &'a str,
    pub is_used_qr: bool,
    pub client_geo_position: GeoPosition,
}

/// Request body for finishing a rental.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FinishRequest {
    pub client_geo_position: GeoPosition,
}

/// Request body for commands addressed to the bike's device.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeviceCommand<'a> {
    pub device_id: &'a str,
}

/// Request body for parking the bike.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ParkRequest<'a> {
    pub device_id: &'a str,
    pub external_parking_id: &'a str,
}

/// Request body for finishing after the photo upload.
#[derive(Debug, Serialize)]
pub(crate) struct FinishAfterUploadRequest<'a> {
    pub login: &'a str,
}
