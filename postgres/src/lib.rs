//! `PostgreSQL` booking store for the seat booking core.
//!
//! This crate provides [`PostgresBookingStore`], which implements the
//! `BookingStore` trait from `seat-booking-core` on top of sqlx. It supports:
//!
//! - The all-or-nothing booking transaction, with advisory seat locks or
//!   serializable isolation ([`ConcurrencyStrategy`])
//! - Cancellation with cascading ticket removal
//! - Booking history, booked emails and seat occupancy queries
//! - Embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use seat_booking_postgres::{PoolSettings, PostgresBookingStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresBookingStore::connect("postgres://localhost/booking", &PoolSettings::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod store;
pub mod strategy;
pub mod transaction;

pub use error::{DEADLOCK_DETECTED, SERIALIZATION_FAILURE, classify, is_conflict_abort};
pub use store::{PoolSettings, PostgresBookingStore};
pub use strategy::{ConcurrencyStrategy, advisory_key};
pub use transaction::PgBookingTransaction;
