//! Bounded retry of rental termination.

use std::sync::Arc;
use std::time::Duration;

use velo_core::{RentalId, UserId};
use velo_store::{Store, StoreError};

use crate::error::{ControlError, Result};
use crate::locks::UserLocks;
use crate::termination::{AdvanceOutcome, TerminationMachine};

/// Runs the termination machine to completion under a shared failure budget.
///
/// The budget counts failed remote calls across the whole four-step
/// sequence; completed steps are free. Failed attempts are spaced by a fixed
/// delay.
pub struct RetrySupervisor<S: Store> {
    store: Arc<S>,
    machine: TerminationMachine<S>,
    locks: Arc<UserLocks>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<S: Store> RetrySupervisor<S> {
    /// Create a new supervisor. A zero `max_attempts` is treated as one.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        machine: TerminationMachine<S>,
        locks: Arc<UserLocks>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            machine,
            locks,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Terminate the user's rental, retrying failed steps.
    ///
    /// Holds the user's lock for the whole run. When `expected` is given, the
    /// stored rental must carry that id. Returns the remote rental id once the
    /// rental is deleted.
    ///
    /// # Errors
    ///
    /// - `NoActiveRental` if the user has no rental (including one that
    ///   disappeared during the run)
    /// - `RentalMismatch` if the stored rental is not `expected`
    /// - `RetriesExhausted` once the failure budget is spent; the rental stays
    ///   stored at its last completed step
    /// - `Store` on local storage failures
    pub async fn terminate(
        &self,
        user_id: &UserId,
        expected: Option<&RentalId>,
        photo: Option<&[u8]>,
    ) -> Result<RentalId> {
        let _guard = self.locks.acquire(*user_id).await;

        let mut bound = expected.cloned();
        let mut failures = 0u32;

        loop {
            let rental = self
                .store
                .get_rental(user_id)?
                .ok_or(ControlError::NoActiveRental(*user_id))?;

            let expected = bound.get_or_insert_with(|| rental.rental_id.clone());
            if *expected != rental.rental_id {
                return Err(ControlError::RentalMismatch {
                    user_id: *user_id,
                    expected: expected.clone(),
                    actual: rental.rental_id,
                });
            }

            match self.machine.advance(&rental, photo).await {
                Ok(AdvanceOutcome::Advanced(_)) => {}
                Ok(AdvanceOutcome::Done(rental_id)) => return Ok(rental_id),
                Ok(AdvanceOutcome::Failed(err)) => {
                    failures += 1;
                    if failures >= self.max_attempts {
                        tracing::error!(
                            user_id = %user_id,
                            rental_id = %rental.rental_id,
                            attempts = failures,
                            error = %err,
                            "Rental termination retries exhausted"
                        );
                        return Err(ControlError::RetriesExhausted {
                            rental_id: rental.rental_id,
                            attempts: failures,
                            last_error: err.to_string(),
                        });
                    }

                    tracing::warn!(
                        user_id = %user_id,
                        rental_id = %rental.rental_id,
                        attempt = failures,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Rental termination attempt failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                // Another writer moved or removed the rental; re-read it.
                Err(ControlError::Store(StoreError::StepConflict { .. } | StoreError::NotFound)) => {
                    tracing::debug!(user_id = %user_id, "Rental changed during termination");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
