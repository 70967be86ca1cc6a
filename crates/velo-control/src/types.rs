//! Request types and configuration for rental operations.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use velo_core::{AccountLogin, GeoPosition};

/// Request to start a rental.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRentalRequest {
    /// Service account the rental is made with.
    pub account_login: AccountLogin,
    /// Serial (frame number) of the bike to rent.
    pub frame_number: String,
    /// Client position sent to the service.
    #[serde(default)]
    pub geo: GeoPosition,
}

impl StartRentalRequest {
    /// Create a request reporting the origin position.
    #[must_use]
    pub fn new(account_login: AccountLogin, frame_number: impl Into<String>) -> Self {
        Self {
            account_login,
            frame_number: frame_number.into(),
            geo: GeoPosition::origin(),
        }
    }
}

/// Configuration for rental termination and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalConfig {
    /// Failed termination attempts allowed across all four steps.
    #[serde(default = "RentalConfig::default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between failed attempts, in seconds.
    #[serde(default = "RentalConfig::default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    /// Time after start at which an untouched rental is terminated, in seconds.
    #[serde(default = "RentalConfig::default_expiry_grace_seconds")]
    pub expiry_grace_seconds: u64,
    /// Interval between countdown refreshes, in seconds.
    #[serde(default = "RentalConfig::default_countdown_interval_seconds")]
    pub countdown_interval_seconds: u64,
    /// How long the countdown runs after start, in seconds.
    #[serde(default = "RentalConfig::default_countdown_window_seconds")]
    pub countdown_window_seconds: u64,
    /// External parking id sent when parking; `None` sends `"undefined"`.
    #[serde(default)]
    pub parking_id: Option<String>,
}

impl Default for RentalConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            retry_delay_seconds: Self::default_retry_delay_seconds(),
            expiry_grace_seconds: Self::default_expiry_grace_seconds(),
            countdown_interval_seconds: Self::default_countdown_interval_seconds(),
            countdown_window_seconds: Self::default_countdown_window_seconds(),
            parking_id: None,
        }
    }
}

impl RentalConfig {
    const fn default_max_attempts() -> u32 {
        5
    }

    const fn default_retry_delay_seconds() -> u64 {
        10
    }

    const fn default_expiry_grace_seconds() -> u64 {
        60
    }

    const fn default_countdown_interval_seconds() -> u64 {
        30
    }

    const fn default_countdown_window_seconds() -> u64 {
        29 * 60
    }

    /// Get the retry delay as a Duration.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    /// Get the expiry grace period as a Duration.
    #[must_use]
    pub const fn expiry_grace(&self) -> Duration {
        Duration::from_secs(self.expiry_grace_seconds)
    }

    /// Get the countdown interval as a Duration.
    ///
    /// Never zero, so the countdown cannot spin.
    #[must_use]
    pub const fn countdown_interval(&self) -> Duration {
        if self.countdown_interval_seconds == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.countdown_interval_seconds)
        }
    }

    /// Get the countdown window as a Duration.
    #[must_use]
    pub const fn countdown_window(&self) -> Duration {
        Duration::from_secs(self.countdown_window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rental_config_defaults() {
        let config = RentalConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_delay(), Duration::from_secs(10));
        assert_eq!(config.expiry_grace(), Duration::from_secs(60));
        assert_eq!(config.countdown_interval(), Duration::from_secs(30));
        assert_eq!(config.countdown_window(), Duration::from_secs(1740));
        assert!(config.parking_id.is_none());
    }

    #[test]
    fn rental_config_partial_json() {
        let config: RentalConfig =
            serde_json::from_str(r#"{"max_attempts": 3, "parking_id": "P7"}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay_seconds, 10);
        assert_eq!(config.parking_id.as_deref(), Some("P7"));
    }

    #[test]
    fn zero_countdown_interval_is_clamped() {
        let config = RentalConfig {
            countdown_interval_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.countdown_interval(), Duration::from_secs(1));
    }

    #[test]
    fn start_request_defaults_geo() {
        let req: StartRentalRequest =
            serde_json::from_str(r#"{"account_login": "u1", "frame_number": "12345"}"#).unwrap();
        assert_eq!(req.geo, GeoPosition::origin());
        assert_eq!(req.account_login.as_str(), "u1");
    }
}
