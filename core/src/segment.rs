//! Travel segments and the seat overlap rule.
//!
//! A ticket holds its seat over a half-open range of station indices. For a
//! westbound journey the range runs `[origin, destination)`, for an eastbound one
//! `[destination, origin)`. Two tickets on the same seat conflict iff their ranges
//! intersect; sharing only an endpoint is not a conflict, since the passenger
//! alighting at a station frees the seat before the next one boards there.

use crate::error::RequestError;
use crate::types::{Direction, StationIndex, TicketId};
use serde::Serialize;
use std::fmt;

/// An ordered `(origin, destination)` pair of distinct stations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Segment {
    origin: StationIndex,
    destination: StationIndex,
}

impl Segment {
    /// Creates a segment.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::SameStation`] when origin and destination coincide,
    /// and [`RequestError::StationOutOfRange`] for the index 0.
    pub fn new(origin: StationIndex, destination: StationIndex) -> Result<Self, RequestError> {
        if origin.value() == 0 {
            return Err(RequestError::StationOutOfRange {
                station: origin,
                station_count: None,
            });
        }
        if destination.value() == 0 {
            return Err(RequestError::StationOutOfRange {
                station: destination,
                station_count: None,
            });
        }
        if origin == destination {
            return Err(RequestError::SameStation(origin));
        }
        Ok(Self {
            origin,
            destination,
        })
    }

    /// Boarding station
    #[must_use]
    pub const fn origin(&self) -> StationIndex {
        self.origin
    }

    /// Alighting station
    #[must_use]
    pub const fn destination(&self) -> StationIndex {
        self.destination
    }

    /// Direction implied by the station order.
    #[must_use]
    pub fn direction(&self) -> Direction {
        Direction::between(self.origin, self.destination)
    }

    /// Interval the ticket occupies, read in the journey's direction.
    ///
    /// Returns `None` when the segment runs against `direction`, which no ticket on
    /// that journey can legitimately do.
    #[must_use]
    pub fn occupied_interval(&self, direction: Direction) -> Option<OccupiedInterval> {
        match direction {
            Direction::Eastbound if self.origin > self.destination => Some(OccupiedInterval {
                start: self.destination,
                end: self.origin,
            }),
            Direction::Westbound if self.origin < self.destination => Some(OccupiedInterval {
                start: self.origin,
                end: self.destination,
            }),
            _ => None,
        }
    }

    /// Interval in index space regardless of direction.
    #[must_use]
    pub fn span(&self) -> OccupiedInterval {
        OccupiedInterval {
            start: self.origin.min(self.destination),
            end: self.origin.max(self.destination),
        }
    }

    /// Whether two segments would hold the same seat at the same time.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.span().intersects(&other.span())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.origin, self.destination)
    }
}

/// Half-open station range `[start, end)` during which a seat is held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OccupiedInterval {
    /// Lower station index (inclusive)
    pub start: StationIndex,
    /// Upper station index (exclusive)
    pub end: StationIndex,
}

impl OccupiedInterval {
    /// Whether the two ranges share at least one inter-station stretch.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A ticket already persisted against a `(journey, seat)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExistingTicket {
    /// Ticket identifier, reported back when it blocks a request
    pub ticket_id: TicketId,
    /// Segment the ticket was sold for
    pub segment: Segment,
}

/// Result of scanning the tickets on one seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeatCheck {
    /// No existing ticket overlaps the request
    Free,
    /// This ticket already holds part of the requested range
    Conflict(TicketId),
    /// This ticket runs against the journey direction (corrupted data)
    Corrupt(TicketId),
}

/// Checks a requested segment against every ticket held on the same seat.
///
/// The scan stops at the first conflicting or corrupt ticket.
#[must_use]
pub fn check_seat<'a, I>(requested: &Segment, direction: Direction, existing: I) -> SeatCheck
where
    I: IntoIterator<Item = &'a ExistingTicket>,
{
    let Some(wanted) = requested.occupied_interval(direction) else {
        // Validation rejects such requests before they reach a seat.
        return SeatCheck::Free;
    };

    for ticket in existing {
        match ticket.segment.occupied_interval(direction) {
            None => return SeatCheck::Corrupt(ticket.ticket_id),
            Some(held) if held.intersects(&wanted) => return SeatCheck::Conflict(ticket.ticket_id),
            Some(_) => {}
        }
    }

    SeatCheck::Free
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seg(origin: u16, destination: u16) -> Segment {
        Segment::new(StationIndex::new(origin), StationIndex::new(destination)).unwrap()
    }

    fn ticket(id: i64, origin: u16, destination: u16) -> ExistingTicket {
        ExistingTicket {
            ticket_id: TicketId::new(id),
            segment: seg(origin, destination),
        }
    }

    #[test]
    fn test_rejects_same_station_and_zero_index() {
        let one = StationIndex::new(1);
        assert_eq!(Segment::new(one, one), Err(RequestError::SameStation(one)));
        assert!(matches!(
            Segment::new(StationIndex::new(0), one),
            Err(RequestError::StationOutOfRange { .. })
        ));
    }

    #[test]
    fn test_occupied_interval_follows_direction() {
        let west = seg(1, 4);
        assert_eq!(
            west.occupied_interval(Direction::Westbound),
            Some(OccupiedInterval {
                start: StationIndex::new(1),
                end: StationIndex::new(4)
            })
        );
        assert_eq!(west.occupied_interval(Direction::Eastbound), None);

        let east = seg(5, 2);
        assert_eq!(
            east.occupied_interval(Direction::Eastbound),
            Some(OccupiedInterval {
                start: StationIndex::new(2),
                end: StationIndex::new(5)
            })
        );
    }

    #[test]
    fn test_no_existing_tickets_never_conflicts() {
        let none: [ExistingTicket; 0] = [];
        assert_eq!(check_seat(&seg(1, 6), Direction::Westbound, &none), SeatCheck::Free);
    }

    #[test]
    fn test_nested_request_conflicts() {
        // Tokyo(1) -> Nagoya(4) is held; Shin-Yokohama(2) -> Toyohashi(3) sits inside it.
        let existing = [ticket(10, 1, 4)];
        assert_eq!(
            check_seat(&seg(2, 3), Direction::Westbound, &existing),
            SeatCheck::Conflict(TicketId::new(10))
        );
    }

    #[test]
    fn test_shared_endpoint_is_free() {
        let existing = [ticket(10, 1, 4)];
        assert_eq!(check_seat(&seg(4, 6), Direction::Westbound, &existing), SeatCheck::Free);

        let existing = [ticket(11, 6, 3)];
        assert_eq!(check_seat(&seg(3, 1), Direction::Eastbound, &existing), SeatCheck::Free);
    }

    #[test]
    fn test_partial_and_enclosing_overlap_conflict() {
        let existing = [ticket(10, 2, 4)];
        assert!(matches!(
            check_seat(&seg(3, 6), Direction::Westbound, &existing),
            SeatCheck::Conflict(_)
        ));
        assert!(matches!(
            check_seat(&seg(1, 6), Direction::Westbound, &existing),
            SeatCheck::Conflict(_)
        ));
    }

    #[test]
    fn test_reports_first_conflicting_ticket() {
        let existing = [ticket(1, 1, 2), ticket(2, 3, 5), ticket(3, 4, 6)];
        assert_eq!(
            check_seat(&seg(2, 6), Direction::Westbound, &existing),
            SeatCheck::Conflict(TicketId::new(2))
        );
    }

    #[test]
    fn test_ticket_against_journey_direction_is_corrupt() {
        let existing = [ticket(7, 5, 2)];
        assert_eq!(
            check_seat(&seg(1, 2), Direction::Westbound, &existing),
            SeatCheck::Corrupt(TicketId::new(7))
        );
    }

    fn westbound_segment() -> impl Strategy<Value = Segment> {
        (1u16..=10, 1u16..=10)
            .prop_filter("distinct stations", |(a, b)| a != b)
            .prop_map(|(a, b)| seg(a.min(b), a.max(b)))
    }

    proptest! {
        #[test]
        fn prop_overlap_is_symmetric(a in westbound_segment(), b in westbound_segment()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn prop_identical_segments_always_conflict(a in westbound_segment()) {
            let existing = [ExistingTicket { ticket_id: TicketId::new(1), segment: a }];
            prop_assert_eq!(
                check_seat(&a, Direction::Westbound, &existing),
                SeatCheck::Conflict(TicketId::new(1))
            );
        }

        #[test]
        fn prop_back_to_back_segments_never_conflict(start in 1u16..8, mid in 1u16..8, len in 1u16..8) {
            let first = seg(start, start + mid);
            let second = seg(start + mid, start + mid + len);
            prop_assert!(!first.overlaps(&second));
        }

        #[test]
        fn prop_check_agrees_with_span_overlap(a in westbound_segment(), b in westbound_segment()) {
            let existing = [ExistingTicket { ticket_id: TicketId::new(1), segment: a }];
            let conflict = matches!(check_seat(&b, Direction::Westbound, &existing), SeatCheck::Conflict(_));
            prop_assert_eq!(conflict, a.overlaps(&b));
        }
    }
}
