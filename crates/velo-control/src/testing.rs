//! In-process test doubles for the rental client and the notifier.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;
use velo_client::{
    ClientError, LockType, RemoteOutcome, RentalClient, Result as ClientResult, StartResponse,
};
use velo_core::{AccountLogin, DeviceId, GeoPosition, RentalId, UserId};
use velo_store::{Rental, RocksStore};

use crate::error::ControlError;
use crate::notifier::{Notifier, NotifyError};
use crate::types::RentalConfig;

/// A remote operation observed by [`ScriptedClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Start,
    OpenLock,
    Finish,
    Park,
    UploadPhoto,
    FinishAfterUpload,
}

/// The answer [`ScriptedClient`] gives to one call.
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    Completed,
    NotFound,
    ServiceError(u16),
    Transport,
}

/// A rental client that answers from per-operation scripts.
///
/// Unscripted calls complete. Every call is recorded.
pub struct ScriptedClient {
    calls: Mutex<Vec<Op>>,
    scripts: Mutex<HashMap<Op, VecDeque<Scripted>>>,
    start_body: Mutex<Value>,
    photos: Mutex<Vec<Vec<u8>>>,
    parking_ids: Mutex<Vec<Option<String>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            start_body: Mutex::new(json!({
                "status": "STARTED",
                "rentId": "R1",
                "deviceId": "D1",
                "frameNumber": "12345"
            })),
            photos: Mutex::new(Vec::new()),
            parking_ids: Mutex::new(Vec::new()),
        }
    }

    /// Queue answers for an operation.
    pub fn script(&self, op: Op, answers: impl IntoIterator<Item = Scripted>) {
        self.scripts.lock().entry(op).or_default().extend(answers);
    }

    /// Replace the body returned by a completed start.
    pub fn set_start_body(&self, body: Value) {
        *self.start_body.lock() = body;
    }

    pub fn calls(&self) -> Vec<Op> {
        self.calls.lock().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.lock().iter().filter(|c| **c == op).count()
    }

    pub fn photos(&self) -> Vec<Vec<u8>> {
        self.photos.lock().clone()
    }

    pub fn parking_ids(&self) -> Vec<Option<String>> {
        self.parking_ids.lock().clone()
    }

    fn answer(&self, op: Op) -> ClientResult<RemoteOutcome<Value>> {
        self.calls.lock().push(op);
        let scripted = self
            .scripts
            .lock()
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Scripted::Completed);

        match scripted {
            Scripted::Completed => Ok(RemoteOutcome::Completed(Value::Null)),
            Scripted::NotFound => Ok(RemoteOutcome::NotFound),
            Scripted::ServiceError(status) => Ok(RemoteOutcome::ServiceError {
                status,
                body: "scripted failure".to_string(),
            }),
            Scripted::Transport => Err(ClientError::Transport("connection reset".to_string())),
        }
    }
}

#[async_trait]
impl RentalClient for ScriptedClient {
    async fn start_rental(
        &self,
        _login: &AccountLogin,
        _frame_number: &str,
        _geo: GeoPosition,
    ) -> ClientResult<RemoteOutcome<StartResponse>> {
        let body = self.start_body.lock().clone();
        match self.answer(Op::Start)? {
            RemoteOutcome::Completed(_) => serde_json::from_value(body)
                .map(RemoteOutcome::Completed)
                .map_err(|e| ClientError::InvalidResponse(e.to_string())),
            other => Ok(other.map(|_| StartResponse::default())),
        }
    }

    async fn open_lock(
        &self,
        _login: &AccountLogin,
        _rental_id: &RentalId,
        _device_id: &DeviceId,
        _lock: LockType,
    ) -> ClientResult<RemoteOutcome<Value>> {
        self.answer(Op::OpenLock)
    }

    async fn finish_rental(
        &self,
        _login: &AccountLogin,
        _rental_id: &RentalId,
        _geo: GeoPosition,
    ) -> ClientResult<RemoteOutcome<Value>> {
        self.answer(Op::Finish)
    }

    async fn park_bike(
        &self,
        _login: &AccountLogin,
        _rental_id: &RentalId,
        _device_id: &DeviceId,
        parking_id: Option<&str>,
    ) -> ClientResult<RemoteOutcome<Value>> {
        self.parking_ids.lock().push(parking_id.map(str::to_string));
        self.answer(Op::Park)
    }

    async fn upload_photo(
        &self,
        _login: &AccountLogin,
        _rental_id: &RentalId,
        _device_id: &DeviceId,
        photo: &[u8],
    ) -> ClientResult<RemoteOutcome<Value>> {
        self.photos.lock().push(photo.to_vec());
        self.answer(Op::UploadPhoto)
    }

    async fn finish_after_upload(
        &self,
        _login: &AccountLogin,
        _rental_id: &RentalId,
    ) -> ClientResult<RemoteOutcome<Value>> {
        self.answer(Op::FinishAfterUpload)
    }
}

/// A notification observed by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Countdown(UserId, Duration),
    AutoFinished(UserId, RentalId),
    Failed(UserId, RentalId),
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn countdowns(&self) -> usize {
        self.notices
            .lock()
            .iter()
            .filter(|n| matches!(n, Notice::Countdown(..)))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn countdown(
        &self,
        user_id: &UserId,
        _rental_id: &RentalId,
        remaining: Duration,
    ) -> Result<(), NotifyError> {
        self.notices.lock().push(Notice::Countdown(*user_id, remaining));
        Ok(())
    }

    async fn auto_finished(&self, user_id: &UserId, rental_id: &RentalId) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .push(Notice::AutoFinished(*user_id, rental_id.clone()));
        Ok(())
    }

    async fn termination_failed(
        &self,
        user_id: &UserId,
        rental_id: &RentalId,
        _error: &ControlError,
    ) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .push(Notice::Failed(*user_id, rental_id.clone()));
        Ok(())
    }
}

pub fn temp_store() -> (Arc<RocksStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());
    (store, dir)
}

/// Default configuration without retry delays.
pub fn fast_config() -> RentalConfig {
    RentalConfig {
        retry_delay_seconds: 0,
        ..Default::default()
    }
}

pub fn rental(user_id: i64, rental_id: &str) -> Rental {
    Rental::new(
        UserId::new(user_id),
        AccountLogin::new("u1").unwrap(),
        RentalId::new(rental_id).unwrap(),
        DeviceId::new("D1").unwrap(),
        "12345",
    )
}

/// Yield to the runtime (advancing paused time) until `cond` holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached");
}
