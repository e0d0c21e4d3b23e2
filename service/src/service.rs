//! The booking facade used by every entry point.
//!
//! [`BookingService`] wraps any [`BookingStore`] and adds what a single
//! store call does not do on its own: a deadline per attempt, opt-in retry
//! of transient failures, metrics and logging.

use crate::config::BookingConfig;
use seat_booking_core::{
    BookingError, BookingId, BookingRequest, BookingStore, BookingSummary, CancellationOutcome,
    CommittedBooking, LogicalSeat, OccupancyQuery, Page,
};
use seat_booking_runtime::{BookingMetrics, RetryPolicy, retry_with_predicate};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Booking operations with timeouts, retries and metrics.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    attempt_timeout: Duration,
    retry: RetryPolicy,
    page_size: u32,
}

impl std::fmt::Debug for BookingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingService")
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retry", &self.retry)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl BookingService {
    /// Wraps `store` with a 5 second deadline and no retries.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self {
            store,
            attempt_timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
            page_size: Page::DEFAULT_SIZE,
        }
    }

    /// Wraps `store` with the configured deadline, retries and page size.
    #[must_use]
    pub fn from_config(store: Arc<dyn BookingStore>, config: &BookingConfig) -> Self {
        Self::new(store)
            .with_attempt_timeout(config.attempt_timeout)
            .with_retry_policy(config.retry_policy())
            .with_page_size(config.page_size)
    }

    /// Sets the deadline of a single attempt.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets how transient failures are retried.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the page size of booking histories.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Books every requested seat for the requested segment, or none of them.
    ///
    /// Each attempt must reach its commit within the attempt deadline or it is
    /// rolled back with [`BookingError::TimedOut`]. A commit already under way
    /// is always awaited. Only [`BookingError::TransientFailure`] is retried.
    ///
    /// # Errors
    ///
    /// The [`BookingError`] of the last attempt.
    pub async fn book(&self, request: BookingRequest) -> Result<CommittedBooking, BookingError> {
        let started = Instant::now();
        let journey_id = request.journey_id;
        let seats = request.seats.len();

        let result = retry_with_predicate(
            &self.retry,
            |_| self.attempt(request.clone()),
            BookingError::is_retryable,
        )
        .await;

        let elapsed = started.elapsed();
        match &result {
            Ok(booking) => {
                BookingMetrics::record_attempt("committed", elapsed);
                tracing::info!(
                    booking_id = %booking.booking_id,
                    %journey_id,
                    seats,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Booking confirmed"
                );
            }
            Err(err) => {
                BookingMetrics::record_attempt(err.kind(), elapsed);
                if matches!(err, BookingError::InvariantViolation(_)) {
                    BookingMetrics::record_invariant_violation();
                    tracing::error!(%journey_id, error = %err, "Booking aborted on inconsistent data");
                } else if err.is_client_error() {
                    tracing::info!(%journey_id, reason = err.kind(), error = %err, "Booking rejected");
                } else {
                    tracing::warn!(%journey_id, reason = err.kind(), error = %err, "Booking failed");
                }
            }
        }
        result
    }

    async fn attempt(&self, request: BookingRequest) -> Result<CommittedBooking, BookingError> {
        self.store
            .create_booking_with_deadline(request, Some(self.attempt_timeout))
            .await
    }

    /// Cancels a booking and releases its tickets.
    ///
    /// # Errors
    ///
    /// [`BookingError::TransientFailure`] if storage is unavailable. An unknown
    /// booking is reported as [`CancellationOutcome::NotFound`].
    pub async fn cancel(&self, booking_id: BookingId) -> Result<CancellationOutcome, BookingError> {
        let outcome = self.store.cancel_booking(booking_id).await?;
        BookingMetrics::record_cancellation(match outcome {
            CancellationOutcome::Deleted { .. } => "deleted",
            CancellationOutcome::NotFound { .. } => "not_found",
        });
        Ok(outcome)
    }

    /// Page `page` (0-based) of the bookings made with `email`.
    ///
    /// # Errors
    ///
    /// [`BookingError::TransientFailure`] if storage is unavailable.
    pub async fn bookings_for_email(
        &self,
        email: &str,
        page: u32,
    ) -> Result<Vec<BookingSummary>, BookingError> {
        self.store
            .bookings_for_email(email, Page::new(page, self.page_size))
            .await
    }

    /// Every email with at least one booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::TransientFailure`] if storage is unavailable.
    pub async fn booked_emails(&self) -> Result<Vec<String>, BookingError> {
        self.store.booked_emails().await
    }

    /// Seats taken for any part of the queried segment.
    ///
    /// # Errors
    ///
    /// [`BookingError::JourneyNotFound`] for an unknown journey and
    /// [`BookingError::InvalidRequest`] for a trip it does not run.
    pub async fn occupied_seats(&self, query: OccupancyQuery) -> Result<Vec<LogicalSeat>, BookingError> {
        self.store.occupied_seats(query).await
    }
}
