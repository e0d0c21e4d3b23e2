//! # Seat Booking Core
//!
//! Domain types and the conflict-free booking transaction for reserved-seat
//! trains.
//!
//! A train runs journeys along an ordered line of stations. A passenger books a
//! physical seat for a contiguous stretch of one journey (a [`Segment`]). Two
//! tickets on the same seat and journey may coexist only if their stretches do
//! not overlap, so one seat can be sold Tokyo→Nagoya and again Nagoya→Osaka.
//!
//! ## Core Concepts
//!
//! - **Segment**: half-open `[origin, destination)` interval of travel
//! - **Resolver**: maps `(train, car, row, column)` to exactly one physical seat
//! - **Coordinator**: runs Start → Resolve → Check → Commit as one all-or-nothing
//!   transaction over a [`BookingTransaction`]
//! - **Store**: [`BookingStore`], the dyn-compatible surface callers use
//!
//! ## Example
//!
//! ```ignore
//! use seat_booking_core::*;
//!
//! let request = BookingRequest {
//!     journey_id: JourneyId::new(1),
//!     direction: None,
//!     origin: StationIndex::new(1),
//!     destination: StationIndex::new(4),
//!     seats: vec![LogicalSeat::new(3, 1, 1)],
//!     class: SeatClass::Economy,
//!     cost_per_seat: Money::from_minor(12_000),
//!     cost_total: Money::from_minor(12_000),
//!     email: "rider@example.com".to_string(),
//! };
//!
//! match store.create_booking(request).await {
//!     Ok(booking) => println!("booked {}", booking.booking_id),
//!     Err(BookingError::SeatConflict { seat, .. }) => println!("{} is taken", seat.label()),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod booking;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod resolver;
pub mod segment;
pub mod store;
pub mod types;

pub use booking::{
    BookingRequest, BookingSummary, CancellationOutcome, CommittedBooking, IssuedTicket,
    NewTicket, OccupancyQuery, Page, TicketView, ValidatedBooking,
};
pub use coordinator::{BookingTransaction, execute_booking};
pub use environment::{Clock, SystemClock};
pub use error::{BookingError, RequestError};
pub use resolver::{resolve_seat, resolve_unique};
pub use segment::{ExistingTicket, OccupiedInterval, SeatCheck, Segment, check_seat};
pub use store::BookingStore;
pub use types::{
    BookingId, Direction, Journey, JourneyId, LogicalSeat, Money, ParseSeatError, PhysicalSeat,
    SeatClass, SeatId, StationIndex, TicketId, TrainId, UnknownVariant,
};

/// Boxed future returned by the dyn-compatible traits of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
