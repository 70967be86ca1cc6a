//! Core types and utilities for velo.
//!
//! This crate provides the foundational types shared by every velo crate:
//!
//! - **Identifiers**: Strongly-typed ids for users, remote rentals, devices and accounts
//! - **Geo position**: The `clientGeoPosition` value sent to the bike-share service
//! - **Id errors**: Validation failures when building identifiers
//!
//! # Example
//!
//! ```
//! use velo_core::{AccountLogin, GeoPosition, RentalId, UserId};
//!
//! let user_id: UserId = "42".parse().unwrap();
//! let rental_id = RentalId::new("R1").unwrap();
//! let login = AccountLogin::new("u1").unwrap();
//!
//! assert_eq!(user_id.get(), 42);
//! assert_eq!(rental_id.as_str(), "R1");
//! assert_eq!(login.to_string(), "u1");
//! assert_eq!(GeoPosition::origin(), GeoPosition::new(0.0, 0.0));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod geo;
pub mod ids;

pub use geo::GeoPosition;
pub use ids::{AccountLogin, DeviceId, IdError, RentalId, UserId};
