//! Booking requests, their validated form, and what a booking produces.

use crate::error::{BookingError, RequestError};
use crate::segment::Segment;
use crate::types::{
    BookingId, Direction, Journey, JourneyId, LogicalSeat, Money, SeatClass, SeatId,
    StationIndex, TicketId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A request to book one or more seats for the same trip on one journey.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Journey to travel on
    pub journey_id: JourneyId,
    /// Direction, when the caller already knows it; otherwise derived from the stations
    #[serde(default)]
    pub direction: Option<Direction>,
    /// Boarding station
    pub origin: StationIndex,
    /// Alighting station
    pub destination: StationIndex,
    /// Seats to book, one ticket each
    pub seats: Vec<LogicalSeat>,
    /// Class the fare was quoted for
    pub class: SeatClass,
    /// Fare charged per seat
    pub cost_per_seat: Money,
    /// Total charged for the booking
    pub cost_total: Money,
    /// Contact email of the passenger
    pub email: String,
}

impl BookingRequest {
    /// Checks everything that can be checked without storage.
    ///
    /// # Errors
    ///
    /// - [`BookingError::DuplicateSeatInRequest`] for a seat listed twice
    /// - [`BookingError::InvalidRequest`] for a malformed request
    pub fn validate(&self) -> Result<ValidatedBooking, BookingError> {
        if self.seats.is_empty() {
            return Err(RequestError::NoSeats.into());
        }

        let email = self.email.trim();
        if email.is_empty() {
            return Err(RequestError::EmptyEmail.into());
        }

        let mut seen = HashSet::with_capacity(self.seats.len());
        for seat in &self.seats {
            if !seen.insert(*seat) {
                return Err(BookingError::DuplicateSeatInRequest { seat: *seat });
            }
        }

        let segment = Segment::new(self.origin, self.destination)?;
        if let Some(expected) = self.direction {
            let actual = segment.direction();
            if expected != actual {
                return Err(RequestError::DirectionMismatch { expected, actual }.into());
            }
        }

        let seat_count = u64::try_from(self.seats.len()).map_err(|_| RequestError::CostOverflow)?;
        let expected = self
            .cost_per_seat
            .checked_multiply(seat_count)
            .ok_or(RequestError::CostOverflow)?;
        if expected != self.cost_total {
            return Err(RequestError::CostMismatch {
                expected,
                actual: self.cost_total,
            }
            .into());
        }

        Ok(ValidatedBooking {
            journey_id: self.journey_id,
            segment,
            seats: self.seats.clone(),
            class: self.class,
            cost_per_seat: self.cost_per_seat,
            cost_total: self.cost_total,
            email: email.to_string(),
        })
    }
}

/// A booking request that passed [`BookingRequest::validate`].
///
/// Only this type reaches the transaction coordinator, so a coordinator never sees
/// duplicate seats or an empty seat list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedBooking {
    journey_id: JourneyId,
    segment: Segment,
    seats: Vec<LogicalSeat>,
    class: SeatClass,
    cost_per_seat: Money,
    cost_total: Money,
    email: String,
}

impl ValidatedBooking {
    /// Journey to travel on
    #[must_use]
    pub const fn journey_id(&self) -> JourneyId {
        self.journey_id
    }

    /// Requested trip
    #[must_use]
    pub const fn segment(&self) -> Segment {
        self.segment
    }

    /// Requested seats, without duplicates
    #[must_use]
    pub fn seats(&self) -> &[LogicalSeat] {
        &self.seats
    }

    /// Class the fare was quoted for
    #[must_use]
    pub const fn class(&self) -> SeatClass {
        self.class
    }

    /// Fare per seat
    #[must_use]
    pub const fn cost_per_seat(&self) -> Money {
        self.cost_per_seat
    }

    /// Total fare
    #[must_use]
    pub const fn cost_total(&self) -> Money {
        self.cost_total
    }

    /// Trimmed contact email
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Checks the trip against the journey it is booked on.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::StationOutOfRange`] for a station past the end of the
    /// line and [`RequestError::DirectionMismatch`] when the trip runs the other way.
    pub fn check_journey(&self, journey: &Journey) -> Result<(), RequestError> {
        check_trip(&self.segment, journey)
    }
}

fn check_trip(segment: &Segment, journey: &Journey) -> Result<(), RequestError> {
    for station in [segment.origin(), segment.destination()] {
        if station.value() > journey.station_count {
            return Err(RequestError::StationOutOfRange {
                station,
                station_count: Some(journey.station_count),
            });
        }
    }

    let actual = segment.direction();
    if actual != journey.direction {
        return Err(RequestError::DirectionMismatch {
            expected: journey.direction,
            actual,
        });
    }

    Ok(())
}

/// A ticket row about to be written by the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTicket {
    /// Owning booking
    pub booking_id: BookingId,
    /// Journey travelled on
    pub journey_id: JourneyId,
    /// Physical seat held
    pub seat_id: SeatId,
    /// Trip the seat is held for
    pub segment: Segment,
    /// Travel class
    pub class: SeatClass,
    /// Fare paid for this seat
    pub cost: Money,
}

/// One ticket of a committed booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IssuedTicket {
    /// Ticket identifier
    pub ticket_id: TicketId,
    /// Seat as requested
    pub seat: LogicalSeat,
    /// Physical seat held
    pub seat_id: SeatId,
}

/// A booking whose tickets are all committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommittedBooking {
    /// Booking identifier
    pub booking_id: BookingId,
    /// Journey travelled on
    pub journey_id: JourneyId,
    /// Trip booked
    pub segment: Segment,
    /// Total charged
    pub cost_total: Money,
    /// One ticket per requested seat, in request order
    pub tickets: Vec<IssuedTicket>,
}

/// Outcome of cancelling a booking. Neither variant is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CancellationOutcome {
    /// The booking and all its tickets were removed.
    Deleted {
        /// Cancelled booking
        booking_id: BookingId,
        /// Number of tickets released with it
        tickets_released: u64,
    },
    /// No such booking; it may already have been cancelled.
    NotFound {
        /// Requested booking
        booking_id: BookingId,
    },
}

// ============================================================================
// Read models
// ============================================================================

/// Zero-based page of results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    /// Page number, starting at 0
    pub number: u32,
    /// Results per page
    pub size: u32,
}

impl Page {
    /// Page size used by the booking history screen.
    pub const DEFAULT_SIZE: u32 = 5;

    /// Creates a new `Page`
    #[must_use]
    pub const fn new(number: u32, size: u32) -> Self {
        Self { number, size }
    }

    /// Rows to skip before this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.number as u64 * self.size as u64
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

/// A ticket as shown in a passenger's booking history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TicketView {
    /// Ticket identifier
    pub ticket_id: TicketId,
    /// Journey travelled on
    pub journey_id: JourneyId,
    /// Boarding station
    pub origin: StationIndex,
    /// Alighting station
    pub destination: StationIndex,
    /// Seat held
    pub seat: LogicalSeat,
    /// Travel class
    pub class: SeatClass,
    /// Fare paid
    pub cost: Money,
}

/// A booking with its tickets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BookingSummary {
    /// Booking identifier
    pub booking_id: BookingId,
    /// Contact email
    pub email: String,
    /// Total charged
    pub cost_total: Money,
    /// When the booking was made
    pub created_at: DateTime<Utc>,
    /// Tickets, ordered by ticket id
    pub tickets: Vec<TicketView>,
}

/// Which seats are taken for a trip, used to grey out a seat map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OccupancyQuery {
    /// Journey to inspect
    pub journey_id: JourneyId,
    /// Trip the passenger wants
    pub segment: Segment,
    /// Restrict to one class
    pub class: Option<SeatClass>,
}

impl OccupancyQuery {
    /// Checks the queried trip against the journey, like a booking would be.
    ///
    /// # Errors
    ///
    /// [`RequestError::StationOutOfRange`] or [`RequestError::DirectionMismatch`].
    pub fn check_journey(&self, journey: &Journey) -> Result<(), RequestError> {
        check_trip(&self.segment, journey)
    }
}
