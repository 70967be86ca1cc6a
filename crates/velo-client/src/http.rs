//! HTTP implementation of [`RentalClient`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use velo_core::{AccountLogin, DeviceId, GeoPosition, RentalId};

use crate::credentials::CredentialProvider;
use crate::error::{ClientError, Result};
use crate::types::{
    DeviceCommand, FinishAfterUploadRequest, FinishRequest, LockType, ParkRequest, RemoteOutcome,
    StartRequest, StartResponse,
};
use crate::{ClientConfig, RentalClient, UNDEFINED_PARKING_ID};

/// HTTP client for the bike-share rental API.
#[derive(Clone)]
pub struct HttpRentalClient {
    client: reqwest::Client,
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpRentalClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if a configured header value is invalid
    /// or the HTTP client cannot be built.
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(default_headers(&config)?)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, config, credentials))
    }

    /// Create a client around a preconfigured reqwest client.
    ///
    /// The fixed client headers are expected to be set on `client` already.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        config: ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client,
            config,
            credentials,
        }
    }

    /// Attach the account's bearer token and cookie.
    async fn authorized(&self, login: &AccountLogin, request: RequestBuilder) -> Result<RequestBuilder> {
        let credentials = self.credentials.credentials(login).await?;
        Ok(request
            .bearer_auth(&credentials.token)
            .header(header::COOKIE, credentials.cookie_header()))
    }

    /// Send a request and classify the response.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        login: &AccountLogin,
        request: RequestBuilder,
    ) -> Result<RemoteOutcome<T>> {
        let response = self
            .authorized(login, request)
            .await?
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("{operation} request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("{operation} response unreadable: {e}")))?;

        if status == StatusCode::OK {
            tracing::debug!(operation, login = %login, "Remote operation completed");
            return parse_body(&body).map(RemoteOutcome::Completed).map_err(|e| {
                ClientError::InvalidResponse(format!("{operation} returned unparseable body: {e}"))
            });
        }

        if status == StatusCode::NOT_FOUND {
            tracing::debug!(operation, login = %login, "Remote target not found");
            return Ok(RemoteOutcome::NotFound);
        }

        tracing::warn!(
            operation,
            login = %login,
            status = %status,
            body = %body,
            "Remote operation rejected"
        );

        Ok(RemoteOutcome::ServiceError {
            status: status.as_u16(),
            body,
        })
    }
}

impl std::fmt::Debug for HttpRentalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRentalClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

/// Fixed headers sent with every request.
fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let value = |v: &str| {
        HeaderValue::from_str(v).map_err(|e| ClientError::Config(format!("invalid header value {v:?}: {e}")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert("app-version", value(&config.app_version)?);
    headers.insert("initiator", HeaderValue::from_static("pwa_app"));
    headers.insert("source", HeaderValue::from_static("pwa-client"));
    headers.insert(header::REFERER, value(&config.referer)?);
    headers.insert(header::USER_AGENT, value(&config.user_agent)?);
    Ok(headers)
}

/// Parse a successful body. An empty body is read as JSON `null`.
fn parse_body<T: DeserializeOwned>(body: &str) -> serde_json::Result<T> {
    if body.trim().is_empty() {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_str(body)
    }
}

#[async_trait]
impl RentalClient for HttpRentalClient {
    async fn start_rental(
        &self,
        login: &AccountLogin,
        frame_number: &str,
        geo: GeoPosition,
    ) -> Result<RemoteOutcome<StartResponse>> {
        let body = StartRequest {
            frame_number,
            is_used_qr: true,
            client_geo_position: geo,
        };
        let request = self.client.post(self.config.start_url()?).json(&body);
        self.send("start_rental", login, request).await
    }

    async fn open_lock(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
        device_id: &DeviceId,
        lock: LockType,
    ) -> Result<RemoteOutcome<Value>> {
        let body = DeviceCommand {
            device_id: device_id.as_str(),
        };
        let request = self
            .client
            .post(self.config.lock_url(rental_id, lock)?)
            .json(&body);
        self.send("open_lock", login, request).await
    }

    async fn finish_rental(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
        geo: GeoPosition,
    ) -> Result<RemoteOutcome<Value>> {
        let body = FinishRequest {
            client_geo_position: geo,
        };
        let request = self.client.post(self.config.finish_url(rental_id)?).json(&body);
        self.send("finish_rental", login, request).await
    }

    async fn park_bike(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
        device_id: &DeviceId,
        parking_id: Option<&str>,
    ) -> Result<RemoteOutcome<Value>> {
        let body = ParkRequest {
            device_id: device_id.as_str(),
            external_parking_id: parking_id.unwrap_or(UNDEFINED_PARKING_ID),
        };
        let request = self.client.post(self.config.park_url(rental_id)?).json(&body);
        self.send("park_bike", login, request).await
    }

    async fn upload_photo(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
        device_id: &DeviceId,
        photo: &[u8],
    ) -> Result<RemoteOutcome<Value>> {
        let part = reqwest::multipart::Part::bytes(photo.to_vec())
            .file_name(format!("{rental_id}.jpg"))
            .mime_str("image/jpeg")
            .map_err(|e| ClientError::Transport(format!("invalid photo part: {e}")))?;
        let form = reqwest::multipart::Form::new().part("photo", part);

        let request = self
            .client
            .post(self.config.upload_photo_url(rental_id)?)
            .query(&[("deviceId", device_id.as_str())])
            .multipart(form);
        self.send("upload_photo", login, request).await
    }

    async fn finish_after_upload(
        &self,
        login: &AccountLogin,
        rental_id: &RentalId,
    ) -> Result<RemoteOutcome<Value>> {
        let body = FinishAfterUploadRequest {
            login: login.as_str(),
        };
        let request = self
            .client
            .post(self.config.finish_after_upload_url(rental_id)?)
            .json(&body);
        self.send("finish_after_upload", login, request).await
    }
}
