//! Velo Control - Rental Mediation Service
//!
//! This is the main entry point for the rental service.
//! It provides internal APIs for rental lifecycle and account management.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use velo_client::{ClientConfig, CredentialProvider, HttpRentalClient, RentalClient};
use velo_control::{
    AccountLogin, ControlError, LockType, Rental, RentalConfig, RentalControl, RentalId,
    RentalService, StartRentalRequest, StoreCredentials, TracingNotifier, UserId,
};
use velo_core::IdError;
use velo_store::{RocksStore, Store, StoreError};

/// Application state shared across handlers.
struct AppState<S: Store> {
    control: Arc<RentalService<S>>,
    credentials: Arc<StoreCredentials<S>>,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            control: Arc::clone(&self.control),
            credentials: Arc::clone(&self.credentials),
        }
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(Debug, Deserialize)]
struct StopBody {
    #[serde(default)]
    rental_id: Option<RentalId>,
}

#[derive(Debug, Deserialize)]
struct StopQuery {
    #[serde(default)]
    rental_id: Option<RentalId>,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    rental_id: RentalId,
}

#[derive(Debug, Deserialize)]
struct LockBody {
    lock_type: LockType,
}

#[derive(Debug, Deserialize)]
struct AccountBody {
    token: String,
    cookie: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// Error returned by handlers.
struct ApiError(ControlError);

impl ApiError {
    const fn code(&self) -> &'static str {
        match &self.0 {
            ControlError::AlreadyActive(_) => "ALREADY_ACTIVE",
            ControlError::NoActiveRental(_) => "NO_ACTIVE_RENTAL",
            ControlError::RentalMismatch { .. } => "RENTAL_MISMATCH",
            ControlError::RemoteRejected { .. } => "REMOTE_REJECTED",
            ControlError::ServiceError { .. } => "SERVICE_ERROR",
            ControlError::Transport(_) => "TRANSPORT_ERROR",
            ControlError::Credentials(_) => "CREDENTIALS_UNAVAILABLE",
            ControlError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            ControlError::InvalidId(_) => "INVALID_ID",
            ControlError::Store(_) | ControlError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        Self(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err.into())
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.0.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "velo-control",
    })
}

async fn ready_handler<S: Store + 'static>(
    State(state): State<AppState<S>>,
) -> ApiResult<&'static str> {
    state.control.store().list_rentals()?;
    Ok("ready")
}

async fn status_handler<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Rental>> {
    let user_id = UserId::new(user_id);
    state
        .control
        .status(&user_id)
        .await?
        .map(Json)
        .ok_or(ApiError(ControlError::NoActiveRental(user_id)))
}

async fn start_handler<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<i64>,
    Json(request): Json<StartRentalRequest>,
) -> ApiResult<(StatusCode, Json<Rental>)> {
    let rental = state.control.start(&UserId::new(user_id), request).await?;
    Ok((StatusCode::CREATED, Json(rental)))
}

async fn stop_handler<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<i64>,
    body: Option<Json<StopBody>>,
) -> ApiResult<Json<StopResponse>> {
    let expected = body.and_then(|Json(body)| body.rental_id);
    let rental_id = state
        .control
        .stop(&UserId::new(user_id), expected.as_ref())
        .await?;
    Ok(Json(StopResponse { rental_id }))
}

async fn stop_with_photo_handler<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<i64>,
    Query(query): Query<StopQuery>,
    photo: Bytes,
) -> ApiResult<Json<StopResponse>> {
    let rental_id = state
        .control
        .stop_with_photo(&UserId::new(user_id), query.rental_id.as_ref(), &photo)
        .await?;
    Ok(Json(StopResponse { rental_id }))
}

async fn lock_handler<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<i64>,
    Json(body): Json<LockBody>,
) -> ApiResult<StatusCode> {
    state
        .control
        .open_lock(&UserId::new(user_id), body.lock_type)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_handler<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Rental>> {
    let rental = state.control.remove(&UserId::new(user_id)).await?;
    Ok(Json(rental))
}

async fn account_handler<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(login): Path<String>,
    Json(body): Json<AccountBody>,
) -> ApiResult<StatusCode> {
    let login = AccountLogin::new(login)?;
    state.credentials.upsert(login, body.token, body.cookie)?;
    Ok(StatusCode::NO_CONTENT)
}

fn create_router<S: Store + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler::<S>))
        .route(
            "/v1/rentals/:user_id",
            get(status_handler::<S>)
                .post(start_handler::<S>)
                .delete(remove_handler::<S>),
        )
        .route("/v1/rentals/:user_id/stop", post(stop_handler::<S>))
        .route(
            "/v1/rentals/:user_id/stop-with-photo",
            post(stop_with_photo_handler::<S>),
        )
        .route("/v1/rentals/:user_id/lock", post(lock_handler::<S>))
        .route("/v1/accounts/:login", put(account_handler::<S>))
        .with_state(state)
}

/// Read an environment variable, falling back to `default` when unset.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| format!("invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,velo=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Velo rental service");

    // Load configuration from environment
    let listen_addr = env_or("LISTEN_ADDR", "0.0.0.0:8080".to_string())?;
    let data_dir = env_or("DATA_DIR", "/data".to_string())?;
    let defaults = RentalConfig::default();
    let config = RentalConfig {
        max_attempts: env_or("RENTAL_MAX_ATTEMPTS", defaults.max_attempts)?,
        retry_delay_seconds: env_or("RENTAL_RETRY_DELAY_SECONDS", defaults.retry_delay_seconds)?,
        expiry_grace_seconds: env_or("RENTAL_EXPIRY_GRACE_SECONDS", defaults.expiry_grace_seconds)?,
        parking_id: std::env::var("VELOBIKE_PARKING_ID").ok(),
        ..defaults
    };
    let client_config = match std::env::var("VELOBIKE_API_URL") {
        Ok(url) => ClientConfig::with_base_url(url),
        Err(_) => ClientConfig::default(),
    };

    // Initialize store
    let store = Arc::new(RocksStore::open(&data_dir)?);
    tracing::info!(data_dir = %data_dir, "Initialized RocksDB store");

    // Initialize rental client
    let credentials = Arc::new(StoreCredentials::new(Arc::clone(&store)));
    tracing::info!(base_url = %client_config.base_url, "Initialized rental client");
    let client: Arc<dyn RentalClient> = Arc::new(HttpRentalClient::new(
        client_config,
        Arc::clone(&credentials) as Arc<dyn CredentialProvider>,
    )?);

    // Initialize rental service and re-arm stored rentals
    let control = Arc::new(RentalService::new(
        store,
        client,
        Arc::new(TracingNotifier),
        config,
    ));
    control.resume()?;

    // Create app state
    let state = AppState {
        control,
        credentials,
    };

    // Create router
    let app = create_router(state);

    // Start server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
