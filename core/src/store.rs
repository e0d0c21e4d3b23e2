//! Storage abstraction used by callers of the booking core.
//!
//! # Dyn Compatibility
//!
//! Methods return [`BoxFuture`] instead of using `async fn` so the store can be
//! shared as `Arc<dyn BookingStore>`.

use crate::BoxFuture;
use crate::booking::{
    BookingRequest, BookingSummary, CancellationOutcome, CommittedBooking, OccupancyQuery, Page,
};
use crate::error::BookingError;
use crate::types::{BookingId, LogicalSeat};
use std::time::Duration;

/// Booking operations over a transactional store.
///
/// # Implementations
///
/// - `PostgresBookingStore` (in `seat-booking-postgres`): production
/// - `InMemoryBookingStore` (in `seat-booking-testing`): fast, deterministic tests
///
/// Each call is a single attempt. Retrying transient failures is up to the caller.
pub trait BookingStore: Send + Sync {
    /// Books every requested seat or none of them.
    ///
    /// # Errors
    ///
    /// Any [`BookingError`]; the store is left exactly as it was before the call.
    fn create_booking(
        &self,
        request: BookingRequest,
    ) -> BoxFuture<'_, Result<CommittedBooking, BookingError>> {
        self.create_booking_with_deadline(request, None)
    }

    /// Books like [`create_booking`](Self::create_booking), giving up with
    /// [`BookingError::TimedOut`] if the attempt has not reached its commit
    /// within `deadline`.
    ///
    /// The commit itself is never interrupted: a call that returns `TimedOut`
    /// left nothing behind, and a call that committed returns the booking even
    /// if the commit finished after the deadline.
    ///
    /// # Errors
    ///
    /// Any [`BookingError`]; the store is left exactly as it was before the call.
    fn create_booking_with_deadline(
        &self,
        request: BookingRequest,
        deadline: Option<Duration>,
    ) -> BoxFuture<'_, Result<CommittedBooking, BookingError>>;

    /// Deletes a booking and, with it, all of its tickets.
    ///
    /// An unknown or already cancelled id yields [`CancellationOutcome::NotFound`].
    ///
    /// # Errors
    ///
    /// Only storage failures ([`BookingError::TransientFailure`]).
    fn cancel_booking(
        &self,
        booking_id: BookingId,
    ) -> BoxFuture<'_, Result<CancellationOutcome, BookingError>>;

    /// Bookings made with `email`, oldest first, one page at a time.
    ///
    /// # Errors
    ///
    /// Storage failures, or [`BookingError::InvariantViolation`] for undecodable rows.
    fn bookings_for_email<'a>(
        &'a self,
        email: &'a str,
        page: Page,
    ) -> BoxFuture<'a, Result<Vec<BookingSummary>, BookingError>>;

    /// Every email with at least one booking, sorted.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn booked_emails(&self) -> BoxFuture<'_, Result<Vec<String>, BookingError>>;

    /// Seats whose tickets overlap the queried trip, ordered by car, column, row.
    ///
    /// # Errors
    ///
    /// [`BookingError::JourneyNotFound`] for an unknown journey,
    /// [`BookingError::InvalidRequest`] for a trip the journey cannot make
    /// (wrong direction or a station past the end of the line), storage
    /// failures, or [`BookingError::InvariantViolation`] for undecodable rows.
    fn occupied_seats(
        &self,
        query: OccupancyQuery,
    ) -> BoxFuture<'_, Result<Vec<LogicalSeat>, BookingError>>;
}
