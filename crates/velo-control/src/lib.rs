//! Rental lifecycle coordination for velo.
//!
//! This crate provides the business logic for mediating bike rentals on
//! behalf of users: starting a rental, opening the bike's locks, and driving
//! the four-step remote termination sequence to completion, either on demand
//! or when the rental expires.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Front-end (HTTP / bot)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RentalService                          │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Expiry    │ │   Retry     │ │    Termination      │    │
//! │  │  Scheduler  │→│ Supervisor  │→│    State Machine    │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌──────────┐                  ┌──────────────┐
//!        │  Store   │                  │ RentalClient │
//!        │ (RocksDB)│                  │   (HTTPS)    │
//!        └──────────┘                  └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use velo_client::{ClientConfig, HttpRentalClient, RentalClient};
//! use velo_control::{
//!     RentalControl, RentalService, StartRentalRequest, StoreCredentials, TracingNotifier,
//! };
//! use velo_core::{AccountLogin, UserId};
//! use velo_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/velo")?);
//! let credentials = Arc::new(StoreCredentials::new(Arc::clone(&store)));
//! let client: Arc<dyn RentalClient> =
//!     Arc::new(HttpRentalClient::new(ClientConfig::default(), credentials)?);
//!
//! let service = RentalService::with_defaults(store, client, Arc::new(TracingNotifier));
//!
//! let user_id = UserId::new(42);
//! let request = StartRentalRequest::new(AccountLogin::new("u1")?, "12345");
//! let rental = service.start(&user_id, request).await?;
//!
//! let finished = service.stop(&user_id, Some(&rental.rental_id)).await?;
//! println!("Finished rental: {finished}");
//! # Ok(())
//! # }
//! ```
//!
//! # Termination
//!
//! Each rental carries a termination cursor that only moves forward:
//!
//! - `NotStarted` → `Finish` on the first termination attempt
//! - `Finish` → `Park` once the finish call succeeds
//! - `Park` → `UploadPhoto` once the bike is parked
//! - `UploadPhoto` → `FinishAfterUpload` once the photo is accepted
//! - `FinishAfterUpload` → deleted once the rental is closed remotely
//!
//! See the [`termination`] module for the machine itself.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod credentials;
pub mod error;
pub mod expiry;
pub mod locks;
pub mod notifier;
pub mod retry;
pub mod service;
pub mod termination;
pub mod types;

#[cfg(test)]
mod testing;

pub use credentials::StoreCredentials;
pub use error::{ControlError, Result};
pub use expiry::ExpiryScheduler;
pub use notifier::{Notifier, NotifyError, TracingNotifier};
pub use retry::RetrySupervisor;
pub use service::{RentalControl, RentalService};
pub use termination::{AdvanceOutcome, TerminationMachine, PLACEHOLDER_PHOTO};
pub use types::{RentalConfig, StartRentalRequest};

// Re-export commonly used types from dependencies for convenience
pub use velo_client::LockType;
pub use velo_core::{AccountLogin, RentalId, UserId};
pub use velo_store::{Rental, TerminationStep};
