//! Client for the bike-share service's rental API.
//!
//! Every operation is performed on behalf of a service account whose
//! credentials are resolved through a [`CredentialProvider`]. Responses are
//! classified into a [`RemoteOutcome`]:
//!
//! - `200` parses the body and yields `Completed`
//! - `404` yields `NotFound`
//! - anything else yields `ServiceError` with the raw body
//!
//! Network failures and unparseable successful bodies are reported as
//! [`ClientError`]s instead.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use velo_client::{AccountCredentials, ClientConfig, HttpRentalClient, RentalClient, StaticCredentials};
//! use velo_core::{AccountLogin, GeoPosition};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let login = AccountLogin::new("79990000000")?;
//! let credentials = StaticCredentials::new()
//!     .with_account(login.clone(), AccountCredentials::new("token", "cookie"));
//!
//! let client = HttpRentalClient::new(ClientConfig::default(), Arc::new(credentials))?;
//! let outcome = client.start_rental(&login, "12345", GeoPosition::origin()).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod credentials;
pub mod error;
pub mod http;
pub mod types;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use velo_core::{AccountLogin, DeviceId, GeoPosition, RentalId};

pub use credentials::{AccountCredentials, CredentialProvider, StaticCredentials};
pub use error::{ClientError, Result};
pub use http::HttpRentalClient;
pub use types::{LockType, RemoteOutcome, StartResponse, ERROR_START};

/// Parking id sent when the caller has none.
pub const UNDEFINED_PARKING_ID: &str = "undefined";

/// Remote operations on the bike-share service.
#[async_trait]
pub trait RentalClient: Send + Sync {
    /// Start a rental of the bike with the given frame number.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or missing credentials.
    async fn start_rental(
        &self,
        login: &AccountLogin,
        frame_number: &str,
        geo: GeoPosition,
    ) -> Result<RemoteOutcome<StartResponse>>;

    /// Open one of the bike's locks.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or missing credentials.
    async fn open_lock(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
        device_id: &DeviceId,
        lock: LockType,
    ) -> Result<RemoteOutcome<Value>>;

    /// Request the end of a rental.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or missing credentials.
    async fn finish_rental(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
        geo: GeoPosition,
    ) -> Result<RemoteOutcome<Value>>;

    /// Register the bike as parked. `None` sends the undefined parking id.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or missing credentials.
    async fn park_bike(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
        device_id: &DeviceId,
        parking_id: Option<&str>,
    ) -> Result<RemoteOutcome<Value>>;

    /// Upload the end-of-ride photo as a JPEG.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or missing credentials.
    async fn upload_photo(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
        device_id: &DeviceId,
        photo: &[u8],
    ) -> Result<RemoteOutcome<Value>>;

    /// Complete the rental after the photo was accepted.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or missing credentials.
    async fn finish_after_upload(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
    ) -> Result<RemoteOutcome<Value>>;
}

/// Configuration for the bike-share service client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the rental API.
    pub base_url: String,
    /// Value of the `app-version` header.
    pub app_version: String,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// Value of the `Referer` header.
    pub referer: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_seconds: u64,
}

impl ClientConfig {
    /// Create a configuration pointing at a different base URL.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Get the start-rental endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the base URL is invalid.
    pub fn start_url(&self) -> Result<Url> {
        self.endpoint(["rent", "rents"])
    }

    /// Get the lock command endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the base URL is invalid.
    pub fn lock_url(&self, rental_id: &RentalId, lock: LockType) -> Result<Url> {
        self.endpoint(["rent", "rents", rental_id.as_str(), "commands", lock.command()])
    }

    /// Get the finish endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the base URL is invalid.
    pub fn finish_url(&self, rental_id: &RentalId) -> Result<Url> {
        self.endpoint(["rent", "rents", rental_id.as_str(), "finishRent"])
    }

    /// Get the park endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the base URL is invalid.
    pub fn park_url(&self, rental_id: &RentalId) -> Result<Url> {
        self.endpoint(["rent", "rents", rental_id.as_str(), "commands", "parkBikeToParking"])
    }

    /// Get the photo upload endpoint URL. The device id travels as the
    /// `deviceId` query parameter.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the base URL is invalid.
    pub fn upload_photo_url(&self, rental_id: &RentalId) -> Result<Url> {
        self.endpoint(["rent", "files", rental_id.as_str(), "uploadPhoto"])
    }

    /// Get the finish-after-upload endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the base URL is invalid.
    pub fn finish_after_upload_url(&self, rental_id: &RentalId) -> Result<Url> {
        self.endpoint(["rent", "rents", rental_id.as_str(), "finishRentAfterUploadPhoto"])
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::Config(format!("base url cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pwa.velobike.ru/api".to_string(),
            app_version: "1.55.108".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36"
                .to_string(),
            referer: "https://pwa.velobike.ru/".to_string(),
            timeout_seconds: 30,
            connect_timeout_seconds: 5,
        }
    }
}
