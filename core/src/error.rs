//! Booking outcomes that abort the enclosing transaction.
//!
//! Business outcomes (a seat is taken, a seat does not exist) are kept apart from
//! infrastructure failures so callers can tell "try another seat" from "try again".

use crate::types::{Direction, JourneyId, LogicalSeat, Money, SeatClass, StationIndex, TicketId, TrainId};
use std::time::Duration;
use thiserror::Error;

/// Why a booking attempt was aborted.
///
/// Every variant means the transaction was rolled back: no booking row and no
/// ticket from the attempt is visible to anyone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The requested seat does not exist on the train operating the journey.
    #[error("seat {seat} does not exist on train {train_id}")]
    SeatNotFound {
        /// Train the seat was looked up on
        train_id: TrainId,
        /// Seat as requested
        seat: LogicalSeat,
    },

    /// The requested segment overlaps a ticket already issued for the seat.
    #[error("seat {seat} is already taken for part of the requested trip (ticket {conflicting_ticket})")]
    SeatConflict {
        /// Seat as requested
        seat: LogicalSeat,
        /// Ticket that holds the seat
        conflicting_ticket: TicketId,
    },

    /// The same seat appears more than once in one request.
    #[error("seat {seat} is listed more than once in the request")]
    DuplicateSeatInRequest {
        /// The repeated seat
        seat: LogicalSeat,
    },

    /// The request is malformed.
    #[error("invalid booking request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// No journey with this id exists.
    #[error("journey {0} not found")]
    JourneyNotFound(JourneyId),

    /// Stored inventory or tickets contradict the data model.
    #[error("data integrity violation: {0}")]
    InvariantViolation(String),

    /// Storage was unavailable, deadlocked or rejected the transaction under
    /// serializable isolation. The whole attempt can be retried.
    #[error("transient storage failure: {cause}")]
    TransientFailure {
        /// Underlying cause
        cause: String,
    },

    /// The attempt did not reach its commit before the deadline and was rolled
    /// back; nothing from it persisted. A commit that had already started is
    /// never cut short, so it cannot end in this error.
    #[error("booking attempt timed out after {0:?}")]
    TimedOut(Duration),
}

impl BookingError {
    /// Shorthand for a [`BookingError::TransientFailure`].
    pub fn transient(cause: impl Into<String>) -> Self {
        Self::TransientFailure {
            cause: cause.into(),
        }
    }

    /// Whether repeating the identical request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure { .. })
    }

    /// Whether the caller's input caused the abort (as opposed to the system).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SeatNotFound { .. }
                | Self::SeatConflict { .. }
                | Self::DuplicateSeatInRequest { .. }
                | Self::InvalidRequest(_)
                | Self::JourneyNotFound(_)
        )
    }

    /// The seat that made the request fail, when a single seat is to blame.
    #[must_use]
    pub const fn offending_seat(&self) -> Option<LogicalSeat> {
        match self {
            Self::SeatNotFound { seat, .. }
            | Self::SeatConflict { seat, .. }
            | Self::DuplicateSeatInRequest { seat }
            | Self::InvalidRequest(RequestError::SeatClassMismatch { seat, .. }) => Some(*seat),
            _ => None,
        }
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SeatNotFound { .. } => "seat_not_found",
            Self::SeatConflict { .. } => "seat_conflict",
            Self::DuplicateSeatInRequest { .. } => "duplicate_seat",
            Self::InvalidRequest(_) => "invalid_request",
            Self::JourneyNotFound(_) => "journey_not_found",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::TransientFailure { .. } => "transient_failure",
            Self::TimedOut(_) => "timed_out",
        }
    }
}

/// Ways a booking request can be malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No seats were requested.
    #[error("at least one seat must be requested")]
    NoSeats,

    /// The contact email is blank.
    #[error("email must not be empty")]
    EmptyEmail,

    /// Origin and destination are the same station.
    #[error("origin and destination are both station {0}")]
    SameStation(StationIndex),

    /// A station index lies outside the line.
    #[error("station {station} is not on the line{}", range_suffix(.station_count))]
    StationOutOfRange {
        /// The offending index
        station: StationIndex,
        /// Number of stations on the journey, when known
        station_count: Option<u16>,
    },

    /// A stated direction disagrees with the trip or the journey.
    #[error("trip runs {actual} but {expected} was expected")]
    DirectionMismatch {
        /// Direction the journey or caller stated
        expected: Direction,
        /// Direction implied by the requested stations
        actual: Direction,
    },

    /// The seat belongs to a car of another class.
    #[error("seat {seat} is {actual} class, not {requested}")]
    SeatClassMismatch {
        /// Seat as requested
        seat: LogicalSeat,
        /// Class named in the request
        requested: SeatClass,
        /// Class of the seat's car
        actual: SeatClass,
    },

    /// The total does not equal the per-seat fare times the seat count.
    #[error("total {actual} does not match {expected} for the requested seats")]
    CostMismatch {
        /// Per-seat fare multiplied by seat count
        expected: Money,
        /// Total stated in the request
        actual: Money,
    },

    /// A monetary amount does not fit the storage type.
    #[error("amount out of range")]
    CostOverflow,
}

fn range_suffix(station_count: &Option<u16>) -> String {
    station_count.map(|n| format!(" (1..={n})")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_failures_are_retryable() {
        assert!(BookingError::transient("deadlock detected").is_retryable());
        assert!(
            !BookingError::SeatConflict {
                seat: LogicalSeat::new(3, 1, 1),
                conflicting_ticket: TicketId::new(1),
            }
            .is_retryable()
        );
        assert!(!BookingError::InvariantViolation("two seats".into()).is_retryable());
        assert!(!BookingError::TimedOut(Duration::from_secs(5)).is_retryable());
    }

    #[test]
    fn test_client_and_server_errors_are_disjoint() {
        let seat = LogicalSeat::new(3, 1, 1);
        assert!(BookingError::DuplicateSeatInRequest { seat }.is_client_error());
        assert!(BookingError::from(RequestError::NoSeats).is_client_error());
        assert!(!BookingError::transient("pool timed out").is_client_error());
        assert!(!BookingError::InvariantViolation("x".into()).is_client_error());
    }

    #[test]
    fn test_offending_seat_is_reported() {
        let seat = LogicalSeat::new(2, 4, 3);
        let err = BookingError::SeatNotFound {
            train_id: TrainId::new(1),
            seat,
        };
        assert_eq!(err.offending_seat(), Some(seat));
        assert_eq!(BookingError::transient("x").offending_seat(), None);
    }

    #[test]
    fn test_station_out_of_range_message() {
        let err = RequestError::StationOutOfRange {
            station: StationIndex::new(9),
            station_count: Some(6),
        };
        assert_eq!(err.to_string(), "station 9 is not on the line (1..=6)");
    }
}
