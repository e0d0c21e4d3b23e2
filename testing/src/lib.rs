//! # Seat Booking Testing
//!
//! Testing utilities for the seat booking crates.
//!
//! This crate provides:
//! - A fixed clock for deterministic timestamps
//! - [`InMemoryBookingStore`], a complete [`BookingStore`](seat_booking_core::BookingStore)
//!   with real seat locks and fault injection
//! - Fleet and journey fixtures matching the sample data
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use seat_booking_testing::{FleetLayout, InMemoryBookingStore, sample_journey};
//!
//! #[tokio::test]
//! async fn test_second_booking_conflicts() {
//!     let store = InMemoryBookingStore::builder()
//!         .with_train(TrainId::new(1), &FleetLayout::standard())
//!         .with_journey(sample_journey(1, TrainId::new(1), Direction::Westbound))
//!         .build();
//!
//!     store.create_booking(request(1, 4)).await.unwrap();
//!     let err = store.create_booking(request(3, 6)).await.unwrap_err();
//!     assert!(matches!(err, BookingError::SeatConflict { .. }));
//! }
//! ```

use chrono::{DateTime, Utc};
use seat_booking_core::Clock;

pub mod fixtures;
pub mod in_memory;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use seat_booking_testing::mocks::FixedClock;
    /// use seat_booking_core::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers and utilities.
pub mod helpers {
    /// Routes `tracing` output through the test harness so it shows up for
    /// failing tests only. Safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "seat_booking=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use seat_booking_core::{Direction, LogicalSeat, Segment, StationIndex};

    /// Any segment on a line of `station_count` stations.
    pub fn segment(station_count: u16) -> impl Strategy<Value = Segment> {
        (1..=station_count, 1..=station_count)
            .prop_filter("origin and destination differ", |(o, d)| o != d)
            .prop_filter_map("valid segment", |(o, d)| {
                Segment::new(StationIndex::new(o), StationIndex::new(d)).ok()
            })
    }

    /// A segment running in `direction` on a line of `station_count` stations.
    pub fn directed_segment(
        station_count: u16,
        direction: Direction,
    ) -> impl Strategy<Value = Segment> {
        segment(station_count).prop_filter("runs in direction", move |s| s.direction() == direction)
    }

    /// A seat position within the standard layout bounds.
    pub fn logical_seat() -> impl Strategy<Value = LogicalSeat> {
        (1_u16..=5, 1_u16..=16, 1_u16..=5)
            .prop_map(|(car, row, column)| LogicalSeat::new(car, row, column))
    }
}

// Re-export commonly used items
pub use fixtures::{CarLayout, FleetLayout, FleetSeat, STATIONS, SeatSlot, sample_journey};
pub use helpers::init_test_tracing;
pub use in_memory::{InMemoryBookingStore, InMemoryBookingStoreBuilder, InMemoryTransaction};
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }
}
