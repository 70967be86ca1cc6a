//! Scheduled auto-termination and countdown of rentals.
//!
//! Every started rental gets two background tasks:
//!
//! - an **expiry** task that waits out the grace period and then terminates
//!   the rental through the [`RetrySupervisor`]
//! - a **countdown** task that refreshes the user's remaining-time display
//!   until the window closes or the rental is gone
//!
//! Both are bound to the rental id they were scheduled for and stop quietly
//! when the stored rental changes. A manual stop only disarms the expiry
//! through [`ExpiryScheduler::cancel_expiry`], so the countdown keeps running
//! while the rental exists; [`ExpiryScheduler::cancel`] drops both. An expiry
//! that has already begun terminating is never aborted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use velo_core::{RentalId, UserId};
use velo_store::{Rental, Store};

use crate::error::{ControlError, Result};
use crate::notifier::Notifier;
use crate::retry::RetrySupervisor;
use crate::types::RentalConfig;

/// Handles of the tasks scheduled for one rental.
#[derive(Debug)]
struct ScheduledTasks {
    rental_id: RentalId,
    /// `None` once the expiry has fired.
    expiry: Option<AbortHandle>,
    countdown: AbortHandle,
}

impl ScheduledTasks {
    fn abort(self) {
        if let Some(expiry) = self.expiry {
            expiry.abort();
        }
        self.countdown.abort();
    }
}

/// Schedules expiry and countdown tasks per user.
pub struct ExpiryScheduler<S: Store> {
    store: Arc<S>,
    supervisor: Arc<RetrySupervisor<S>>,
    notifier: Arc<dyn Notifier>,
    config: RentalConfig,
    tasks: Arc<Mutex<HashMap<UserId, ScheduledTasks>>>,
}

impl<S: Store> Clone for ExpiryScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            supervisor: Arc::clone(&self.supervisor),
            notifier: Arc::clone(&self.notifier),
            config: self.config.clone(),
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<S: Store + 'static> ExpiryScheduler<S> {
    /// Create a new scheduler.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        supervisor: Arc<RetrySupervisor<S>>,
        notifier: Arc<dyn Notifier>,
        config: RentalConfig,
    ) -> Self {
        Self {
            store,
            supervisor,
            notifier,
            config,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule a freshly started rental with the configured grace and window.
    pub fn schedule(&self, rental: &Rental) {
        self.schedule_after(
            rental,
            self.config.expiry_grace(),
            self.config.countdown_window(),
        );
    }

    /// Schedule a rental's expiry after `grace` and its countdown for `window`.
    ///
    /// Replaces whatever was scheduled for the user before.
    pub fn schedule_after(&self, rental: &Rental, grace: Duration, window: Duration) {
        let user_id = rental.user_id;
        let rental_id = rental.rental_id.clone();

        // Tasks look themselves up in the table, so they are registered
        // before the lock is released.
        let mut tasks = self.tasks.lock();

        let expiry = tokio::spawn(self.clone().expire(user_id, rental_id.clone(), grace));
        let countdown = tokio::spawn(self.clone().run_countdown(user_id, rental_id.clone(), window));

        let scheduled = ScheduledTasks {
            rental_id: rental_id.clone(),
            expiry: Some(expiry.abort_handle()),
            countdown: countdown.abort_handle(),
        };
        if let Some(previous) = tasks.insert(user_id, scheduled) {
            previous.abort();
        }

        tracing::debug!(
            user_id = %user_id,
            rental_id = %rental_id,
            grace_seconds = grace.as_secs(),
            window_seconds = window.as_secs(),
            "Scheduled rental expiry"
        );
    }

    /// Cancel the user's pending expiry and countdown.
    ///
    /// An expiry that already started terminating keeps running. Returns true
    /// if anything was scheduled.
    pub fn cancel(&self, user_id: &UserId) -> bool {
        let Some(scheduled) = self.tasks.lock().remove(user_id) else {
            return false;
        };

        tracing::debug!(
            user_id = %user_id,
            rental_id = %scheduled.rental_id,
            "Cancelled scheduled rental tasks"
        );
        scheduled.abort();
        true
    }

    /// Disarm the pending expiry of `rental_id`, keeping its countdown.
    ///
    /// An expiry that already started terminating keeps running. Returns true
    /// if a pending expiry was aborted.
    pub fn cancel_expiry(&self, user_id: &UserId, rental_id: &RentalId) -> bool {
        let mut tasks = self.tasks.lock();
        let Some(expiry) = tasks
            .get_mut(user_id)
            .filter(|scheduled| scheduled.rental_id == *rental_id)
            .and_then(|scheduled| scheduled.expiry.take())
        else {
            return false;
        };

        expiry.abort();
        tracing::debug!(user_id = %user_id, rental_id = %rental_id, "Cancelled rental expiry");
        true
    }

    /// Returns true if an expiry is pending (not yet fired) for the user.
    #[must_use]
    pub fn has_pending_expiry(&self, user_id: &UserId) -> bool {
        self.tasks
            .lock()
            .get(user_id)
            .is_some_and(|scheduled| scheduled.expiry.is_some())
    }

    /// Re-schedule every stored rental, typically after a restart.
    ///
    /// Remaining grace and window are measured from the rental's start. A
    /// rental past its grace, or already terminating, expires immediately.
    /// Returns the number of rentals scheduled.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored rentals cannot be listed.
    pub fn resume(&self) -> Result<usize> {
        let rentals = self.store.list_rentals()?;
        let now = Utc::now();

        for rental in &rentals {
            let elapsed = (now - rental.started_at).to_std().unwrap_or_default();
            let grace = if rental.is_terminating() {
                Duration::ZERO
            } else {
                self.config.expiry_grace().saturating_sub(elapsed)
            };
            let window = self.config.countdown_window().saturating_sub(elapsed);

            tracing::info!(
                user_id = %rental.user_id,
                rental_id = %rental.rental_id,
                step = ?rental.termination_step,
                "Resuming rental"
            );
            self.schedule_after(rental, grace, window);
        }

        Ok(rentals.len())
    }

    async fn expire(self, user_id: UserId, rental_id: RentalId, grace: Duration) {
        tokio::time::sleep(grace).await;

        {
            let mut tasks = self.tasks.lock();
            match tasks.get_mut(&user_id) {
                Some(scheduled)
                    if scheduled.rental_id == rental_id && scheduled.expiry.is_some() =>
                {
                    scheduled.expiry = None;
                }
                // Cancelled, disarmed or replaced while waking up.
                _ => return,
            }
        }

        tracing::info!(user_id = %user_id, rental_id = %rental_id, "Rental expired, terminating");

        match self.supervisor.terminate(&user_id, Some(&rental_id), None).await {
            Ok(_) => {
                self.release(&user_id, &rental_id);
                if let Err(err) = self.notifier.auto_finished(&user_id, &rental_id).await {
                    tracing::error!(user_id = %user_id, error = %err, "Failed to send auto-finish notification");
                }
            }
            Err(ControlError::NoActiveRental(_) | ControlError::RentalMismatch { .. }) => {
                tracing::debug!(
                    user_id = %user_id,
                    rental_id = %rental_id,
                    "Rental already terminated before expiry"
                );
                self.release(&user_id, &rental_id);
            }
            Err(err) => {
                tracing::error!(
                    user_id = %user_id,
                    rental_id = %rental_id,
                    error = %err,
                    "Automatic rental termination failed"
                );
                if let Err(notify_err) = self
                    .notifier
                    .termination_failed(&user_id, &rental_id, &err)
                    .await
                {
                    tracing::error!(user_id = %user_id, error = %notify_err, "Failed to send termination failure notification");
                }
            }
        }
    }

    async fn run_countdown(self, user_id: UserId, rental_id: RentalId, window: Duration) {
        let deadline = Instant::now() + window;
        let mut ticker = tokio::time::interval(self.config.countdown_interval());

        loop {
            ticker.tick().await;
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            match self.store.get_rental(&user_id) {
                Ok(Some(rental)) if rental.rental_id == rental_id => {}
                Ok(_) => {
                    tracing::debug!(user_id = %user_id, rental_id = %rental_id, "Rental gone, stopping countdown");
                    break;
                }
                Err(err) => {
                    tracing::error!(user_id = %user_id, error = %err, "Countdown failed to read rental");
                    continue;
                }
            }

            if let Err(err) = self
                .notifier
                .countdown(&user_id, &rental_id, deadline - now)
                .await
            {
                tracing::error!(user_id = %user_id, error = %err, "Failed to send countdown notification");
            }
        }
    }

    /// Drop the user's scheduled tasks if they still belong to `rental_id`.
    pub fn release(&self, user_id: &UserId, rental_id: &RentalId) {
        let mut tasks = self.tasks.lock();
        if tasks
            .get(user_id)
            .is_some_and(|scheduled| scheduled.rental_id == *rental_id)
        {
            if let Some(scheduled) = tasks.remove(user_id) {
                scheduled.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::UserLocks;
    use crate::termination::TerminationMachine;
    use crate::testing::{
        fast_config, rental, temp_store, wait_until, Notice, Op, RecordingNotifier, Scripted,
        ScriptedClient,
    };
    use tempfile::TempDir;
    use velo_client::RentalClient;
    use velo_store::{RocksStore, TerminationStep};

    struct Harness {
        store: Arc<RocksStore>,
        client: Arc<ScriptedClient>,
        notifier: Arc<RecordingNotifier>,
        scheduler: ExpiryScheduler<RocksStore>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let (store, dir) = temp_store();
        let client = Arc::new(ScriptedClient::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let config = fast_config();

        let machine = TerminationMachine::new(
            Arc::clone(&store),
            Arc::clone(&client) as Arc<dyn RentalClient>,
            None,
        );
        let supervisor = Arc::new(RetrySupervisor::new(
            Arc::clone(&store),
            machine,
            Arc::new(UserLocks::new()),
            config.max_attempts,
            config.retry_delay(),
        ));
        let scheduler = ExpiryScheduler::new(
            Arc::clone(&store),
            supervisor,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            config,
        );

        Harness {
            store,
            client,
            notifier,
            scheduler,
            _dir: dir,
        }
    }

    fn exists(store: &RocksStore, user: i64) -> bool {
        store.get_rental(&UserId::new(user)).unwrap().is_some()
    }

    #[tokio::test(start_paused = true)]
    async fn untouched_rental_expires_after_grace() {
        let h = harness();
        let started = rental(42, "R1");
        h.store.create_rental(&started).unwrap();
        h.scheduler.schedule(&started);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(exists(&h.store, 42));
        assert!(h.client.calls().is_empty());
        assert!(h.scheduler.has_pending_expiry(&UserId::new(42)));

        wait_until(|| !exists(&h.store, 42)).await;
        wait_until(|| {
            h.notifier
                .notices()
                .contains(&Notice::AutoFinished(UserId::new(42), RentalId::new("R1").unwrap()))
        })
        .await;

        assert_eq!(
            h.client.calls(),
            vec![Op::Finish, Op::Park, Op::UploadPhoto, Op::FinishAfterUpload]
        );
        assert!(!h.scheduler.has_pending_expiry(&UserId::new(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_expiry() {
        let h = harness();
        let started = rental(42, "R1");
        h.store.create_rental(&started).unwrap();
        h.scheduler.schedule(&started);

        assert!(h.scheduler.cancel(&UserId::new(42)));
        assert!(!h.scheduler.cancel(&UserId::new(42)));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(exists(&h.store, 42));
        assert!(h.client.calls().is_empty());
        assert_eq!(h.notifier.countdowns(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_expiry_keeps_countdown() {
        let h = harness();
        let started = rental(42, "R1");
        h.store.create_rental(&started).unwrap();
        h.scheduler.schedule(&started);

        let user = UserId::new(42);
        let other = RentalId::new("R9").unwrap();
        assert!(!h.scheduler.cancel_expiry(&user, &other));
        assert!(h.scheduler.cancel_expiry(&user, &started.rental_id));
        assert!(!h.scheduler.cancel_expiry(&user, &started.rental_id));
        assert!(!h.scheduler.has_pending_expiry(&user));

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert!(exists(&h.store, 42));
        assert!(h.client.calls().is_empty());
        assert!(h.notifier.countdowns() >= 4);

        h.scheduler.release(&user, &started.rental_id);
        let before = h.notifier.countdowns();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.notifier.countdowns(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_until_window_closes() {
        let h = harness();
        let started = rental(42, "R1");
        h.store.create_rental(&started).unwrap();
        h.scheduler
            .schedule_after(&started, Duration::from_secs(3600), Duration::from_secs(65));

        tokio::time::sleep(Duration::from_secs(200)).await;

        let notices = h.notifier.notices();
        assert_eq!(h.notifier.countdowns(), 3);
        assert_eq!(
            notices.first(),
            Some(&Notice::Countdown(UserId::new(42), Duration::from_secs(65)))
        );
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_stops_when_rental_disappears() {
        let h = harness();
        let started = rental(42, "R1");
        h.store.create_rental(&started).unwrap();
        h.scheduler
            .schedule_after(&started, Duration::from_secs(3600), Duration::from_secs(1740));

        tokio::time::sleep(Duration::from_secs(61)).await;
        let before = h.notifier.countdowns();
        assert!(before >= 1);

        h.store.delete_rental(&UserId::new(42)).unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.notifier.countdowns(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_expiry_reports_failure() {
        let h = harness();
        h.client.script(Op::Finish, [Scripted::ServiceError(500); 5]);
        let started = rental(42, "R1");
        h.store.create_rental(&started).unwrap();
        h.scheduler
            .schedule_after(&started, Duration::ZERO, Duration::from_secs(1740));

        wait_until(|| {
            h.notifier
                .notices()
                .contains(&Notice::Failed(UserId::new(42), RentalId::new("R1").unwrap()))
        })
        .await;

        assert_eq!(h.client.count(Op::Finish), 5);
        let kept = h.store.get_rental(&UserId::new(42)).unwrap().unwrap();
        assert_eq!(kept.termination_step, TerminationStep::Finish);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_ignores_replaced_rental() {
        let h = harness();
        let first = rental(42, "R1");
        h.store.create_rental(&first).unwrap();
        h.scheduler.schedule(&first);

        // The record now belongs to another rental the scheduler never saw.
        h.store.put_rental(&rental(42, "R2")).unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(h.client.calls().is_empty());
        let kept = h.store.get_rental(&UserId::new(42)).unwrap().unwrap();
        assert_eq!(kept.rental_id.as_str(), "R2");
    }

    #[tokio::test(start_paused = true)]
    async fn resume_rearms_stored_rentals() {
        let h = harness();

        let fresh = rental(1, "R1");
        let mut overdue = rental(2, "R2");
        overdue.started_at = Utc::now() - chrono::Duration::minutes(10);
        let mut terminating = rental(3, "R3");
        terminating.termination_step = TerminationStep::Park;

        for r in [&fresh, &overdue, &terminating] {
            h.store.create_rental(r).unwrap();
        }

        assert_eq!(h.scheduler.resume().unwrap(), 3);

        wait_until(|| !exists(&h.store, 2) && !exists(&h.store, 3)).await;
        assert!(exists(&h.store, 1));
        // Only the overdue rental needed its finish call.
        assert_eq!(h.client.count(Op::Finish), 1);
        assert_eq!(h.client.count(Op::Park), 2);

        tokio::time::sleep(Duration::from_secs(61)).await;
        wait_until(|| !exists(&h.store, 1)).await;
        assert_eq!(h.client.count(Op::Finish), 2);
    }
}
