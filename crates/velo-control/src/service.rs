//! Rental lifecycle service implementation.
//!
//! This module provides the `RentalControl` trait and the `RentalService`
//! implementation that coordinates starting, stopping and expiring rentals.

use std::sync::Arc;

use async_trait::async_trait;
use velo_client::{LockType, RemoteOutcome, RentalClient, ERROR_START};
use velo_core::{DeviceId, RentalId, UserId};
use velo_store::{Rental, Store, StoreError};

use crate::error::{ControlError, Result};
use crate::expiry::ExpiryScheduler;
use crate::locks::UserLocks;
use crate::notifier::Notifier;
use crate::retry::RetrySupervisor;
use crate::termination::TerminationMachine;
use crate::types::{RentalConfig, StartRentalRequest};

/// Trait defining the rental operations offered to callers.
#[async_trait]
pub trait RentalControl: Send + Sync {
    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    /// Start a rental for the user and schedule its expiry.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::AlreadyActive` if the user already has a rental.
    /// Returns `ControlError::RemoteRejected` if the service refuses to start.
    async fn start(&self, user_id: &UserId, request: StartRentalRequest) -> Result<Rental>;

    /// Terminate the user's rental, returning the remote rental id.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoActiveRental` if the user has no rental.
    /// Returns `ControlError::RentalMismatch` if `expected` names another rental.
    /// Returns `ControlError::RetriesExhausted` if termination keeps failing.
    async fn stop(&self, user_id: &UserId, expected: Option<&RentalId>) -> Result<RentalId>;

    /// Terminate the user's rental, uploading `photo` as the parking proof.
    ///
    /// # Errors
    ///
    /// Same as [`RentalControl::stop`].
    async fn stop_with_photo(
        &self,
        user_id: &UserId,
        expected: Option<&RentalId>,
        photo: &[u8],
    ) -> Result<RentalId>;

    /// Get the user's rental, if any.
    async fn status(&self, user_id: &UserId) -> Result<Option<Rental>>;

    // =========================================================================
    // Bike Operations
    // =========================================================================

    /// Open a lock of the rented bike.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoActiveRental` if the user has no rental.
    /// Returns `ControlError::RemoteRejected` if the service does not know it.
    async fn open_lock(&self, user_id: &UserId, lock: LockType) -> Result<()>;

    // =========================================================================
    // Administrative
    // =========================================================================

    /// Delete the user's rental without contacting the service.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoActiveRental` if the user has no rental.
    async fn remove(&self, user_id: &UserId) -> Result<Rental>;
}

/// The main rental service implementation.
pub struct RentalService<S: Store> {
    store: Arc<S>,
    client: Arc<dyn RentalClient>,
    config: RentalConfig,
    locks: Arc<UserLocks>,
    supervisor: Arc<RetrySupervisor<S>>,
    expiry: ExpiryScheduler<S>,
}

impl<S: Store + 'static> RentalService<S> {
    /// Create a new rental service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        client: Arc<dyn RentalClient>,
        notifier: Arc<dyn Notifier>,
        config: RentalConfig,
    ) -> Self {
        let locks = Arc::new(UserLocks::new());
        let machine = TerminationMachine::new(
            Arc::clone(&store),
            Arc::clone(&client),
            config.parking_id.clone(),
        );
        let supervisor = Arc::new(RetrySupervisor::new(
            Arc::clone(&store),
            machine,
            Arc::clone(&locks),
            config.max_attempts,
            config.retry_delay(),
        ));
        let expiry = ExpiryScheduler::new(
            Arc::clone(&store),
            Arc::clone(&supervisor),
            notifier,
            config.clone(),
        );

        Self {
            store,
            client,
            config,
            locks,
            supervisor,
            expiry,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(
        store: Arc<S>,
        client: Arc<dyn RentalClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::new(store, client, notifier, RentalConfig::default())
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &RentalConfig {
        &self.config
    }

    /// Re-schedule expiry for every stored rental after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored rentals cannot be listed.
    pub fn resume(&self) -> Result<usize> {
        let count = self.expiry.resume()?;
        tracing::info!(rentals = count, "Resumed stored rentals");
        Ok(count)
    }

    /// Get the user's rental or fail with `NoActiveRental`.
    fn active_rental(&self, user_id: &UserId) -> Result<Rental> {
        self.store
            .get_rental(user_id)?
            .ok_or(ControlError::NoActiveRental(*user_id))
    }

    async fn stop_inner(
        &self,
        user_id: &UserId,
        expected: Option<&RentalId>,
        photo: Option<&[u8]>,
    ) -> Result<RentalId> {
        let rental = self.active_rental(user_id)?;
        if let Some(expected) = expected {
            if *expected != rental.rental_id {
                return Err(ControlError::RentalMismatch {
                    user_id: *user_id,
                    expected: expected.clone(),
                    actual: rental.rental_id,
                });
            }
        }

        // The countdown stays up until the rental is actually gone.
        self.expiry.cancel_expiry(user_id, &rental.rental_id);

        tracing::info!(
            user_id = %user_id,
            rental_id = %rental.rental_id,
            step = ?rental.termination_step,
            "Stopping rental"
        );

        let finished = self
            .supervisor
            .terminate(user_id, Some(&rental.rental_id), photo)
            .await?;
        self.expiry.release(user_id, &finished);
        Ok(finished)
    }
}

/// Build an identifier from an optional field of the start response.
fn required_id<T>(
    value: Option<String>,
    field: &str,
    build: impl FnOnce(String) -> std::result::Result<T, velo_core::IdError>,
) -> Result<T> {
    value
        .ok_or_else(|| ControlError::Transport(format!("start response carried no {field}")))
        .and_then(|v| {
            build(v).map_err(|_| ControlError::Transport(format!("start response carried empty {field}")))
        })
}

#[async_trait]
impl<S: Store + 'static> RentalControl for RentalService<S> {
    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    async fn start(&self, user_id: &UserId, request: StartRentalRequest) -> Result<Rental> {
        let _guard = self.locks.acquire(*user_id).await;

        if self.store.get_rental(user_id)?.is_some() {
            return Err(ControlError::AlreadyActive(*user_id));
        }

        let outcome = self
            .client
            .start_rental(&request.account_login, &request.frame_number, request.geo)
            .await?;

        let response = match outcome {
            RemoteOutcome::Completed(response) => response,
            RemoteOutcome::NotFound => {
                return Err(ControlError::RemoteRejected {
                    reason: format!("bike {} not found", request.frame_number),
                });
            }
            RemoteOutcome::ServiceError { status, body } => {
                return Err(ControlError::ServiceError { status, body });
            }
        };

        if response.is_rejected() {
            let reason = response
                .failed_reason
                .unwrap_or_else(|| ERROR_START.to_string());
            tracing::warn!(
                user_id = %user_id,
                login = %request.account_login,
                reason = %reason,
                "Rental start rejected"
            );
            return Err(ControlError::RemoteRejected { reason });
        }

        let rental_id = required_id(response.rent_id, "rentId", RentalId::new)?;
        let device_id = required_id(response.device_id, "deviceId", DeviceId::new)?;
        let frame_number = response
            .frame_number
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(request.frame_number);

        let rental = Rental::new(
            *user_id,
            request.account_login,
            rental_id,
            device_id,
            frame_number,
        );

        match self.store.create_rental(&rental) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists) => return Err(ControlError::AlreadyActive(*user_id)),
            Err(err) => return Err(err.into()),
        }

        self.expiry.schedule(&rental);

        tracing::info!(
            user_id = %user_id,
            rental_id = %rental.rental_id,
            frame_number = %rental.frame_number,
            "Started rental"
        );

        Ok(rental)
    }

    async fn stop(&self, user_id: &UserId, expected: Option<&RentalId>) -> Result<RentalId> {
        self.stop_inner(user_id, expected, None).await
    }

    async fn stop_with_photo(
        &self,
        user_id: &UserId,
        expected: Option<&RentalId>,
        photo: &[u8],
    ) -> Result<RentalId> {
        self.stop_inner(user_id, expected, Some(photo)).await
    }

    async fn status(&self, user_id: &UserId) -> Result<Option<Rental>> {
        Ok(self.store.get_rental(user_id)?)
    }

    // =========================================================================
    // Bike Operations
    // =========================================================================

    async fn open_lock(&self, user_id: &UserId, lock: LockType) -> Result<()> {
        let rental = self.active_rental(user_id)?;

        let outcome = self
            .client
            .open_lock(
                &rental.account_login,
                &rental.rental_id,
                &rental.device_id,
                lock,
            )
            .await?;

        match outcome {
            RemoteOutcome::Completed(_) => {
                tracing::info!(
                    user_id = %user_id,
                    rental_id = %rental.rental_id,
                    lock = %lock,
                    "Opened lock"
                );
                Ok(())
            }
            RemoteOutcome::NotFound => Err(ControlError::RemoteRejected {
                reason: format!("rental {} not found by the service", rental.rental_id),
            }),
            RemoteOutcome::ServiceError { status, body } => {
                Err(ControlError::ServiceError { status, body })
            }
        }
    }

    // =========================================================================
    // Administrative
    // =========================================================================

    async fn remove(&self, user_id: &UserId) -> Result<Rental> {
        let rental = self.active_rental(user_id)?;

        self.expiry.cancel(user_id);
        match self.store.delete_rental(user_id) {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(ControlError::NoActiveRental(*user_id)),
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            user_id = %user_id,
            rental_id = %rental.rental_id,
            "Removed rental"
        );

        Ok(rental)
    }
}
