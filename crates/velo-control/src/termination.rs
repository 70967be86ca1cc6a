//! Rental termination state machine.
//!
//! Ending a rental takes four remote calls that must be issued in order, and
//! a crash may interrupt the sequence anywhere. The rental's persisted
//! [`TerminationStep`] names the next call; each [`TerminationMachine::advance`]
//! issues exactly that one call and moves the cursor forward on success.
//!
//! # State Machine
//!
//! ```text
//!   ┌────────────┐  first advance   ┌──────────┐
//!   │ NotStarted │─────────────────▶│  Finish  │
//!   └────────────┘                  └────┬─────┘
//!                                        │ finishRent
//!                                        ▼
//!                                   ┌──────────┐
//!                                   │   Park   │
//!                                   └────┬─────┘
//!                                        │ parkBikeToParking
//!                                        ▼
//!                                 ┌─────────────┐
//!                                 │ UploadPhoto │
//!                                 └──────┬──────┘
//!                                        │ uploadPhoto
//!                                        ▼
//!                              ┌───────────────────┐
//!                              │ FinishAfterUpload │
//!                              └─────────┬─────────┘
//!                                        │ finishRentAfterUploadPhoto
//!                                        ▼
//!                                 (rental deleted)
//! ```
//!
//! A `404` from the service counts as completion of the step. Any other
//! failure leaves the cursor where it was, so the next advance repeats the
//! same call.

use std::sync::Arc;

use serde_json::Value;
use velo_client::{RemoteOutcome, RentalClient, Result as ClientResult};
use velo_core::{GeoPosition, RentalId};
use velo_store::{Rental, Store, StoreError, TerminationStep};

use crate::error::{ControlError, Result};

/// Photo uploaded when the caller has none.
///
/// An empty JPEG (start and end markers only). Whether the service inspects
/// the image content is unknown.
pub const PLACEHOLDER_PHOTO: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

/// Result of a single [`TerminationMachine::advance`] call.
#[derive(Debug)]
pub enum AdvanceOutcome {
    /// The step completed; the cursor now points at the given step.
    Advanced(TerminationStep),
    /// The last step completed and the rental was deleted.
    Done(RentalId),
    /// The remote call failed; nothing was persisted.
    Failed(ControlError),
}

/// Drives a rental through the termination steps, one call at a time.
pub struct TerminationMachine<S: Store> {
    store: Arc<S>,
    client: Arc<dyn RentalClient>,
    parking_id: Option<String>,
}

impl<S: Store> TerminationMachine<S> {
    /// Create a new machine.
    #[must_use]
    pub fn new(store: Arc<S>, client: Arc<dyn RentalClient>, parking_id: Option<String>) -> Self {
        Self {
            store,
            client,
            parking_id,
        }
    }

    /// Issue the remote call for the rental's current step.
    ///
    /// `photo` replaces the placeholder photo in the upload step.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures, including
    /// `StoreError::StepConflict` when the stored cursor no longer matches
    /// `rental`. Remote failures are reported as [`AdvanceOutcome::Failed`].
    ///
    /// The stored step is checked before the remote call, which keeps a stale
    /// snapshot from reaching the service. Two writers that pass the check at
    /// the same time can still both issue the call; callers serialize per
    /// user to rule that out.
    pub async fn advance(&self, rental: &Rental, photo: Option<&[u8]>) -> Result<AdvanceOutcome> {
        let mut step = rental.termination_step;
        if step.is_terminating() {
            let found = self
                .store
                .get_rental(&rental.user_id)?
                .ok_or(StoreError::NotFound)?
                .termination_step;
            if found != step {
                return Err(StoreError::StepConflict {
                    expected: step,
                    found,
                }
                .into());
            }
        } else {
            self.store.advance_termination_step(
                &rental.user_id,
                TerminationStep::NotStarted,
                TerminationStep::Finish,
            )?;
            step = TerminationStep::Finish;

            tracing::info!(
                user_id = %rental.user_id,
                rental_id = %rental.rental_id,
                "Rental termination started"
            );
        }

        let outcome = match self.dispatch(rental, step, photo).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    user_id = %rental.user_id,
                    rental_id = %rental.rental_id,
                    step = ?step,
                    error = %err,
                    "Termination step failed"
                );
                return Ok(AdvanceOutcome::Failed(err.into()));
            }
        };

        match outcome {
            RemoteOutcome::Completed(_) => {
                tracing::debug!(rental_id = %rental.rental_id, step = ?step, "Termination step completed");
            }
            RemoteOutcome::NotFound => {
                tracing::debug!(
                    rental_id = %rental.rental_id,
                    step = ?step,
                    "Service no longer knows the rental; treating step as completed"
                );
            }
            RemoteOutcome::ServiceError { status, body } => {
                tracing::warn!(
                    user_id = %rental.user_id,
                    rental_id = %rental.rental_id,
                    step = ?step,
                    status,
                    "Termination step rejected"
                );
                return Ok(AdvanceOutcome::Failed(ControlError::ServiceError { status, body }));
            }
        }

        match step.next() {
            Some(next) => {
                self.store
                    .advance_termination_step(&rental.user_id, step, next)?;
                Ok(AdvanceOutcome::Advanced(next))
            }
            None => {
                self.store.delete_rental(&rental.user_id)?;
                tracing::info!(
                    user_id = %rental.user_id,
                    rental_id = %rental.rental_id,
                    "Rental terminated"
                );
                Ok(AdvanceOutcome::Done(rental.rental_id.clone()))
            }
        }
    }

    async fn dispatch(
        &self,
        rental: &Rental,
        step: TerminationStep,
        photo: Option<&[u8]>,
    ) -> ClientResult<RemoteOutcome<Value>> {
        let login = &rental.account_login;
        match step {
            // NotStarted is promoted to Finish before dispatch.
            TerminationStep::NotStarted | TerminationStep::Finish => {
                self.client
                    .finish_rental(login, &rental.rental_id, GeoPosition::origin())
                    .await
            }
            TerminationStep::Park => {
                self.client
                    .park_bike(
                        login,
                        &rental.rental_id,
                        &rental.device_id,
                        self.parking_id.as_deref(),
                    )
                    .await
            }
            TerminationStep::UploadPhoto => {
                self.client
                    .upload_photo(
                        login,
                        &rental.rental_id,
                        &rental.device_id,
                        photo.unwrap_or(PLACEHOLDER_PHOTO),
                    )
                    .await
            }
            TerminationStep::FinishAfterUpload => {
                self.client
                    .finish_after_upload(login, &rental.rental_id)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rental, temp_store, Op, Scripted, ScriptedClient};
    use velo_core::UserId;
    use velo_store::RocksStore;

    fn machine(store: &Arc<RocksStore>, client: &Arc<ScriptedClient>) -> TerminationMachine<RocksStore> {
        TerminationMachine::new(Arc::clone(store), Arc::clone(client) as Arc<dyn RentalClient>, None)
    }

    fn stored(store: &RocksStore, user: i64) -> Option<Rental> {
        store.get_rental(&UserId::new(user)).unwrap()
    }

    #[tokio::test]
    async fn first_advance_finishes_and_moves_to_park() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        store.create_rental(&rental(42, "R1")).unwrap();

        let outcome = machine(&store, &client)
            .advance(&stored(&store, 42).unwrap(), None)
            .await
            .unwrap();

        assert!(matches!(outcome, AdvanceOutcome::Advanced(TerminationStep::Park)));
        assert_eq!(client.calls(), vec![Op::Finish]);
        assert_eq!(stored(&store, 42).unwrap().termination_step, TerminationStep::Park);
    }

    #[tokio::test]
    async fn full_sequence_deletes_rental() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        let machine = machine(&store, &client);
        store.create_rental(&rental(42, "R1")).unwrap();

        let mut last_step = TerminationStep::NotStarted;
        let done = loop {
            let current = stored(&store, 42).unwrap();
            assert!(current.termination_step >= last_step);
            last_step = current.termination_step;

            match machine.advance(&current, None).await.unwrap() {
                AdvanceOutcome::Advanced(step) => {
                    // One remote call per advance; NotStarted is promoted to Finish first.
                    let from = current.termination_step.max(TerminationStep::Finish);
                    assert_eq!(step.as_u8(), from.as_u8() + 1);
                }
                AdvanceOutcome::Done(id) => break id,
                AdvanceOutcome::Failed(err) => panic!("unexpected failure: {err}"),
            }
        };

        assert_eq!(done.as_str(), "R1");
        assert!(stored(&store, 42).is_none());
        assert_eq!(
            client.calls(),
            vec![Op::Finish, Op::Park, Op::UploadPhoto, Op::FinishAfterUpload]
        );
        assert_eq!(client.photos(), vec![PLACEHOLDER_PHOTO.to_vec()]);
        assert_eq!(client.parking_ids(), vec![None]);
    }

    #[tokio::test]
    async fn not_found_counts_as_completed() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        client.script(Op::Finish, [Scripted::NotFound]);
        store.create_rental(&rental(42, "R1")).unwrap();

        let outcome = machine(&store, &client)
            .advance(&stored(&store, 42).unwrap(), None)
            .await
            .unwrap();

        assert!(matches!(outcome, AdvanceOutcome::Advanced(TerminationStep::Park)));
        assert_eq!(stored(&store, 42).unwrap().termination_step, TerminationStep::Park);
    }

    #[tokio::test]
    async fn not_found_on_last_step_deletes_rental() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        client.script(Op::FinishAfterUpload, [Scripted::NotFound]);

        let mut uploaded = rental(42, "R1");
        uploaded.termination_step = TerminationStep::FinishAfterUpload;
        store.create_rental(&uploaded).unwrap();

        let outcome = machine(&store, &client)
            .advance(&stored(&store, 42).unwrap(), None)
            .await
            .unwrap();

        match outcome {
            AdvanceOutcome::Done(id) => assert_eq!(id.as_str(), "R1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(stored(&store, 42).is_none());
        assert_eq!(client.calls(), vec![Op::FinishAfterUpload]);
    }

    #[tokio::test]
    async fn service_error_leaves_cursor() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        client.script(Op::Park, [Scripted::ServiceError(500)]);

        let mut parked = rental(42, "R1");
        parked.termination_step = TerminationStep::Park;
        store.create_rental(&parked).unwrap();

        let outcome = machine(&store, &client)
            .advance(&stored(&store, 42).unwrap(), None)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            AdvanceOutcome::Failed(ControlError::ServiceError { status: 500, .. })
        ));
        assert_eq!(stored(&store, 42).unwrap().termination_step, TerminationStep::Park);
    }

    #[tokio::test]
    async fn transport_failure_on_first_call_keeps_terminating_flag() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        client.script(Op::Finish, [Scripted::Transport]);
        store.create_rental(&rental(42, "R1")).unwrap();

        let outcome = machine(&store, &client)
            .advance(&stored(&store, 42).unwrap(), None)
            .await
            .unwrap();

        assert!(matches!(outcome, AdvanceOutcome::Failed(ControlError::Transport(_))));
        // Termination has started even though finish has not gone through.
        assert_eq!(stored(&store, 42).unwrap().termination_step, TerminationStep::Finish);
    }

    #[tokio::test]
    async fn caller_photo_and_parking_id_are_used() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        let machine = TerminationMachine::new(
            Arc::clone(&store),
            Arc::clone(&client) as Arc<dyn RentalClient>,
            Some("P7".to_string()),
        );

        let mut parked = rental(42, "R1");
        parked.termination_step = TerminationStep::Park;
        store.create_rental(&parked).unwrap();

        machine.advance(&stored(&store, 42).unwrap(), Some(&b"jpeg"[..])).await.unwrap();
        machine.advance(&stored(&store, 42).unwrap(), Some(&b"jpeg"[..])).await.unwrap();

        assert_eq!(client.parking_ids(), vec![Some("P7".to_string())]);
        assert_eq!(client.photos(), vec![b"jpeg".to_vec()]);
    }

    #[tokio::test]
    async fn stale_snapshot_is_a_step_conflict() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        let machine = machine(&store, &client);
        store.create_rental(&rental(42, "R1")).unwrap();

        let snapshot = stored(&store, 42).unwrap();
        machine.advance(&snapshot, None).await.unwrap();

        let err = machine.advance(&snapshot, None).await.unwrap_err();
        assert!(matches!(err, ControlError::Store(StoreError::StepConflict { .. })));
        // The stale snapshot never reached the service.
        assert_eq!(client.calls(), vec![Op::Finish]);
    }

    #[tokio::test]
    async fn stale_snapshot_past_first_step_never_reaches_service() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        let machine = machine(&store, &client);

        let mut parked = rental(42, "R1");
        parked.termination_step = TerminationStep::Park;
        store.create_rental(&parked).unwrap();

        let snapshot = stored(&store, 42).unwrap();
        machine.advance(&snapshot, None).await.unwrap();

        let err = machine.advance(&snapshot, None).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Store(StoreError::StepConflict {
                expected: TerminationStep::Park,
                found: TerminationStep::UploadPhoto,
            })
        ));
        assert_eq!(client.calls(), vec![Op::Park]);
    }

    #[tokio::test]
    async fn snapshot_of_deleted_rental_is_not_found() {
        let (store, _dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());

        let mut parked = rental(42, "R1");
        parked.termination_step = TerminationStep::Park;
        store.create_rental(&parked).unwrap();
        store.delete_rental(&UserId::new(42)).unwrap();

        let err = machine(&store, &client).advance(&parked, None).await.unwrap_err();
        assert!(matches!(err, ControlError::Store(StoreError::NotFound)));
        assert!(client.calls().is_empty());
    }
}
