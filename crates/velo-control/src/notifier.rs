//! User-facing notifications emitted by background rental tasks.
//!
//! Delivery (chat messages, push) lives outside this crate. The
//! [`TracingNotifier`] only logs, for deployments without a delivery channel.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use velo_core::{RentalId, UserId};

use crate::error::ControlError;

/// A notification could not be delivered.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receiver of rental notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Refresh the remaining-time display of a rental.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    async fn countdown(
        &self,
        user_id: &UserId,
        rental_id: &RentalId,
        remaining: Duration,
    ) -> Result<(), NotifyError>;

    /// Report that an expired rental was finished automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    async fn auto_finished(&self, user_id: &UserId, rental_id: &RentalId) -> Result<(), NotifyError>;

    /// Report that automatic termination gave up and a manual stop is needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    async fn termination_failed(
        &self,
        user_id: &UserId,
        rental_id: &RentalId,
        error: &ControlError,
    ) -> Result<(), NotifyError>;
}

/// Notifier that writes every notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn countdown(
        &self,
        user_id: &UserId,
        rental_id: &RentalId,
        remaining: Duration,
    ) -> Result<(), NotifyError> {
        tracing::debug!(
            user_id = %user_id,
            rental_id = %rental_id,
            remaining_seconds = remaining.as_secs(),
            "Rental countdown"
        );
        Ok(())
    }

    async fn auto_finished(&self, user_id: &UserId, rental_id: &RentalId) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %user_id,
            rental_id = %rental_id,
            "Rental finished automatically"
        );
        Ok(())
    }

    async fn termination_failed(
        &self,
        user_id: &UserId,
        rental_id: &RentalId,
        error: &ControlError,
    ) -> Result<(), NotifyError> {
        tracing::warn!(
            user_id = %user_id,
            rental_id = %rental_id,
            error = %error,
            "Automatic termination failed; manual stop required"
        );
        Ok(())
    }
}
