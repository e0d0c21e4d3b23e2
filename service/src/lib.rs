//! # Seat Booking Service
//!
//! Wires a [`BookingStore`](seat_booking_core::BookingStore) into something
//! an operator can run: configuration from the environment, the
//! [`BookingService`] facade and the `seat-booking` command-line tool.

pub mod config;
pub mod service;

pub use config::{BookingConfig, Config, ConfigError, DatabaseConfig, MetricsConfig};
pub use service::BookingService;
