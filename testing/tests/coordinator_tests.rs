//! Booking behaviour against the in-memory store.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use proptest::prelude::*;
use seat_booking_core::{
    BookingError, BookingRequest, BookingStore, CancellationOutcome, Direction, JourneyId,
    LogicalSeat, Money, OccupancyQuery, Page, RequestError, SeatClass, Segment, StationIndex,
    TicketId, TrainId,
};
use seat_booking_testing::{
    FleetLayout, InMemoryBookingStore, init_test_tracing, properties, sample_journey,
};
use std::sync::Arc;
use std::time::Duration;

const TRAIN: TrainId = TrainId::new(1);
const WESTBOUND: JourneyId = JourneyId::new(1);
const EASTBOUND: JourneyId = JourneyId::new(2);
const SEAT: LogicalSeat = LogicalSeat::new(3, 1, 1);
const FARE: u64 = 500;

fn store() -> InMemoryBookingStore {
    init_test_tracing();
    InMemoryBookingStore::builder()
        .with_train(TRAIN, &FleetLayout::standard())
        .with_journey(sample_journey(1, TRAIN, Direction::Westbound))
        .with_journey(sample_journey(2, TRAIN, Direction::Eastbound))
        .build()
}

fn request_on(
    journey_id: JourneyId,
    origin: u16,
    destination: u16,
    seats: &[LogicalSeat],
) -> BookingRequest {
    BookingRequest {
        journey_id,
        direction: None,
        origin: StationIndex::new(origin),
        destination: StationIndex::new(destination),
        seats: seats.to_vec(),
        class: SeatClass::Economy,
        cost_per_seat: Money::from_minor(FARE),
        cost_total: Money::from_minor(FARE * seats.len() as u64),
        email: "rider@example.com".to_string(),
    }
}

fn request(origin: u16, destination: u16, seats: &[LogicalSeat]) -> BookingRequest {
    request_on(WESTBOUND, origin, destination, seats)
}

fn segment(origin: u16, destination: u16) -> Segment {
    Segment::new(StationIndex::new(origin), StationIndex::new(destination)).unwrap()
}

// ============================================================================
// Overlap rule
// ============================================================================

#[tokio::test]
async fn test_overlapping_segment_is_rejected() {
    let store = store();
    let first = store.create_booking(request(1, 4, &[SEAT])).await.unwrap();

    let err = store.create_booking(request(3, 6, &[SEAT])).await.unwrap_err();

    assert_eq!(
        err,
        BookingError::SeatConflict {
            seat: SEAT,
            conflicting_ticket: first.tickets[0].ticket_id,
        }
    );
    assert_eq!(store.ticket_count(), 1);
    assert_eq!(store.booking_count(), 1);
}

#[tokio::test]
async fn test_back_to_back_segments_share_a_seat() {
    let store = store();
    store.create_booking(request(1, 3, &[SEAT])).await.unwrap();
    store.create_booking(request(3, 6, &[SEAT])).await.unwrap();

    let tickets = store.tickets_for_seat(WESTBOUND, SEAT);
    assert_eq!(tickets.len(), 2);
}

#[tokio::test]
async fn test_eastbound_segments_use_reversed_order() {
    let store = store();
    store
        .create_booking(request_on(EASTBOUND, 6, 4, &[SEAT]))
        .await
        .unwrap();
    store
        .create_booking(request_on(EASTBOUND, 4, 1, &[SEAT]))
        .await
        .unwrap();

    let err = store
        .create_booking(request_on(EASTBOUND, 5, 2, &[SEAT]))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SeatConflict { .. }));
}

#[tokio::test]
async fn test_same_seat_on_other_journey_is_independent() {
    let store = store();
    store.create_booking(request(1, 6, &[SEAT])).await.unwrap();
    store
        .create_booking(request_on(EASTBOUND, 6, 1, &[SEAT]))
        .await
        .unwrap();
    assert_eq!(store.ticket_count(), 2);
}

// ============================================================================
// Atomicity
// ============================================================================

#[tokio::test]
async fn test_one_conflicting_seat_aborts_whole_booking() {
    let store = store();
    let taken = LogicalSeat::new(3, 2, 2);
    store.create_booking(request(2, 5, &[taken])).await.unwrap();

    let free = LogicalSeat::new(3, 2, 1);
    let err = store
        .create_booking(request(1, 3, &[free, taken]))
        .await
        .unwrap_err();

    assert_eq!(err.offending_seat(), Some(taken));
    assert_eq!(store.ticket_count(), 1);
    assert_eq!(store.booking_count(), 1);
    assert!(store.tickets_for_seat(WESTBOUND, free).is_empty());
}

#[tokio::test]
async fn test_unknown_seat_aborts_whole_booking() {
    let store = store();
    let missing = LogicalSeat::new(3, 40, 1);

    let err = store
        .create_booking(request(1, 3, &[SEAT, missing]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BookingError::SeatNotFound {
            train_id: TRAIN,
            seat: missing
        }
    );
    assert_eq!(store.ticket_count(), 0);
    assert_eq!(store.booking_count(), 0);
}

#[tokio::test]
async fn test_multi_seat_booking_commits_every_ticket() {
    let store = store();
    let seats = [
        LogicalSeat::new(4, 1, 1),
        LogicalSeat::new(3, 9, 5),
        LogicalSeat::new(5, 16, 3),
    ];

    let booking = store.create_booking(request(2, 6, &seats)).await.unwrap();

    assert_eq!(booking.tickets.len(), 3);
    assert_eq!(booking.cost_total, Money::from_minor(FARE * 3));
    let returned: Vec<LogicalSeat> = booking.tickets.iter().map(|t| t.seat).collect();
    assert_eq!(returned, seats);
}

#[tokio::test]
async fn test_failed_commit_leaves_nothing_behind() {
    let store = store();
    store.fail_next_commits(1);

    let err = store.create_booking(request(1, 4, &[SEAT])).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.ticket_count(), 0);

    store.create_booking(request(1, 4, &[SEAT])).await.unwrap();
    assert_eq!(store.ticket_count(), 1);
}

#[tokio::test]
async fn test_abandoned_attempt_releases_its_seat() {
    let store = store();
    store.delay_commits(Duration::from_secs(60));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), store.create_booking(request(1, 4, &[SEAT])))
            .await;
    assert!(abandoned.is_err());
    assert_eq!(store.ticket_count(), 0);

    store.delay_commits(Duration::ZERO);
    tokio::time::timeout(Duration::from_secs(5), store.create_booking(request(1, 4, &[SEAT])))
        .await
        .expect("seat lock must be released by the abandoned attempt")
        .unwrap();
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_duplicate_seat_in_request() {
    let store = store();
    let err = store
        .create_booking(request(1, 4, &[SEAT, SEAT]))
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::DuplicateSeatInRequest { seat: SEAT });
    assert_eq!(store.booking_count(), 0);
}

#[tokio::test]
async fn test_unknown_journey() {
    let store = store();
    let err = store
        .create_booking(request_on(JourneyId::new(99), 1, 4, &[SEAT]))
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::JourneyNotFound(JourneyId::new(99)));
}

#[tokio::test]
async fn test_trip_against_journey_direction() {
    let store = store();
    let err = store.create_booking(request(4, 1, &[SEAT])).await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidRequest(RequestError::DirectionMismatch { .. })
    ));
}

#[tokio::test]
async fn test_station_past_end_of_line() {
    let store = store();
    let err = store.create_booking(request(2, 7, &[SEAT])).await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidRequest(RequestError::StationOutOfRange {
            station_count: Some(6),
            ..
        })
    ));
}

#[tokio::test]
async fn test_seat_of_other_class() {
    let store = store();
    let first_class = LogicalSeat::new(1, 1, 1);
    let err = store
        .create_booking(request(1, 4, &[first_class]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidRequest(RequestError::SeatClassMismatch {
            actual: SeatClass::First,
            ..
        })
    ));
}

// ============================================================================
// Corrupted data
// ============================================================================

#[tokio::test]
async fn test_duplicate_inventory_is_an_invariant_violation() {
    let store = InMemoryBookingStore::builder()
        .with_seat(TRAIN, SEAT, SeatClass::Economy)
        .with_seat(TRAIN, SEAT, SeatClass::Economy)
        .with_journey(sample_journey(1, TRAIN, Direction::Westbound))
        .build();

    let err = store.create_booking(request(1, 4, &[SEAT])).await.unwrap_err();

    assert!(matches!(err, BookingError::InvariantViolation(_)));
    assert!(!err.is_client_error());
    assert_eq!(store.ticket_count(), 0);
}

#[tokio::test]
async fn test_ticket_against_journey_direction_is_an_invariant_violation() {
    let store = InMemoryBookingStore::builder()
        .with_train(TRAIN, &FleetLayout::standard())
        .with_journey(sample_journey(1, TRAIN, Direction::Westbound))
        .with_ticket(WESTBOUND, SEAT, segment(5, 2))
        .build();

    let err = store.create_booking(request(1, 2, &[SEAT])).await.unwrap_err();

    assert!(matches!(err, BookingError::InvariantViolation(_)));
    assert_eq!(store.ticket_count(), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_fifty_concurrent_bookings_for_one_seat() {
    let store = Arc::new(store());

    let attempts = (0..50).map(|i| {
        let store = Arc::clone(&store);
        // Every trip covers the 3->4 stretch.
        let (origin, destination) = [(1, 4), (2, 5), (3, 6), (1, 6), (3, 4)][i % 5];
        tokio::spawn(async move { store.create_booking(request(origin, destination, &[SEAT])).await })
    });
    let results = futures::future::join_all(attempts).await;

    let mut committed = 0;
    for result in results {
        match result.expect("booking task panicked") {
            Ok(_) => committed += 1,
            Err(BookingError::SeatConflict { seat, .. }) => assert_eq!(seat, SEAT),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(store.tickets_for_seat(WESTBOUND, SEAT).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_disjoint_segments_all_commit() {
    let store = Arc::new(store());

    let attempts = (1..6).map(|origin| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.create_booking(request(origin, origin + 1, &[SEAT])).await })
    });
    for result in futures::future::join_all(attempts).await {
        result.expect("booking task panicked").unwrap();
    }

    assert_eq!(store.tickets_for_seat(WESTBOUND, SEAT).len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crossed_multi_seat_bookings_do_not_deadlock() {
    let store = Arc::new(store());
    let a = LogicalSeat::new(4, 3, 1);
    let b = LogicalSeat::new(4, 3, 2);

    let attempts = (0..20).map(|i| {
        let store = Arc::clone(&store);
        let seats = if i % 2 == 0 { [a, b] } else { [b, a] };
        tokio::spawn(async move { store.create_booking(request(1, 6, &seats)).await })
    });
    let results = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(attempts))
        .await
        .expect("bookings deadlocked");

    let committed = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(committed, 1);
    assert_eq!(store.ticket_count(), 2);
}

// ============================================================================
// Cancellation and reads
// ============================================================================

#[tokio::test]
async fn test_cancel_releases_seat_and_is_idempotent() {
    let store = store();
    let booking = store
        .create_booking(request(1, 6, &[SEAT, LogicalSeat::new(3, 1, 2)]))
        .await
        .unwrap();

    let outcome = store.cancel_booking(booking.booking_id).await.unwrap();
    assert_eq!(
        outcome,
        CancellationOutcome::Deleted {
            booking_id: booking.booking_id,
            tickets_released: 2,
        }
    );
    assert_eq!(store.ticket_count(), 0);

    let again = store.cancel_booking(booking.booking_id).await.unwrap();
    assert_eq!(
        again,
        CancellationOutcome::NotFound {
            booking_id: booking.booking_id
        }
    );

    store.create_booking(request(2, 3, &[SEAT])).await.unwrap();
}

#[tokio::test]
async fn test_bookings_for_email_are_paginated() {
    let store = store();
    for row in 1..=7 {
        store
            .create_booking(request(1, 2, &[LogicalSeat::new(3, row, 1)]))
            .await
            .unwrap();
    }
    let mut other = request(1, 2, &[LogicalSeat::new(3, 9, 1)]);
    other.email = "other@example.com".to_string();
    store.create_booking(other).await.unwrap();

    let first = store
        .bookings_for_email("rider@example.com", Page::default())
        .await
        .unwrap();
    let second = store
        .bookings_for_email("rider@example.com", Page::new(1, Page::DEFAULT_SIZE))
        .await
        .unwrap();

    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 2);
    assert_eq!(first[0].tickets[0].seat, LogicalSeat::new(3, 1, 1));
    assert_eq!(second[1].tickets[0].seat, LogicalSeat::new(3, 7, 1));
    assert!(first.iter().chain(&second).all(|b| b.email == "rider@example.com"));
}

#[tokio::test]
async fn test_booked_emails_are_distinct_and_sorted() {
    let store = store();
    for (row, email) in [(1, "zed@example.com"), (2, "amy@example.com"), (3, "zed@example.com")] {
        let mut req = request(1, 2, &[LogicalSeat::new(3, row, 1)]);
        req.email = email.to_string();
        store.create_booking(req).await.unwrap();
    }

    assert_eq!(
        store.booked_emails().await.unwrap(),
        vec!["amy@example.com".to_string(), "zed@example.com".to_string()]
    );
}

#[tokio::test]
async fn test_occupied_seats_for_a_trip() {
    let store = store();
    store
        .create_booking(request(1, 3, &[LogicalSeat::new(4, 2, 3)]))
        .await
        .unwrap();
    store
        .create_booking(request(2, 5, &[LogicalSeat::new(3, 5, 1), LogicalSeat::new(3, 1, 2)]))
        .await
        .unwrap();
    store
        .create_booking(request(5, 6, &[LogicalSeat::new(3, 1, 1)]))
        .await
        .unwrap();

    let occupied = store
        .occupied_seats(OccupancyQuery {
            journey_id: WESTBOUND,
            segment: segment(2, 4),
            class: Some(SeatClass::Economy),
        })
        .await
        .unwrap();

    assert_eq!(
        occupied,
        vec![
            LogicalSeat::new(3, 5, 1),
            LogicalSeat::new(3, 1, 2),
            LogicalSeat::new(4, 2, 3),
        ]
    );

    let first_class = store
        .occupied_seats(OccupancyQuery {
            journey_id: WESTBOUND,
            segment: segment(2, 4),
            class: Some(SeatClass::First),
        })
        .await
        .unwrap();
    assert!(first_class.is_empty());
}

#[tokio::test]
async fn test_occupied_seats_rejects_trips_the_journey_cannot_make() {
    let store = store();
    store.create_booking(request(1, 4, &[SEAT])).await.unwrap();

    let reversed = store
        .occupied_seats(OccupancyQuery {
            journey_id: WESTBOUND,
            segment: segment(4, 1),
            class: None,
        })
        .await
        .unwrap_err();
    assert_eq!(
        reversed,
        BookingError::InvalidRequest(RequestError::DirectionMismatch {
            expected: Direction::Westbound,
            actual: Direction::Eastbound,
        })
    );

    let past_the_end = store
        .occupied_seats(OccupancyQuery {
            journey_id: WESTBOUND,
            segment: segment(2, 99),
            class: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        past_the_end,
        BookingError::InvalidRequest(RequestError::StationOutOfRange { .. })
    ));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_committed_tickets_never_overlap(
        trips in prop::collection::vec(properties::directed_segment(6, Direction::Westbound), 1..12)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let store = store();

        runtime.block_on(async {
            for trip in &trips {
                let _ = store
                    .create_booking(request(trip.origin().value(), trip.destination().value(), &[SEAT]))
                    .await;
            }
        });

        let tickets = store.tickets_for_seat(WESTBOUND, SEAT);
        prop_assert!(!tickets.is_empty());
        for (i, a) in tickets.iter().enumerate() {
            for b in &tickets[i + 1..] {
                prop_assert!(!a.segment.overlaps(&b.segment), "{} overlaps {}", a.segment, b.segment);
            }
        }
    }

    #[test]
    fn prop_rejection_names_an_overlapping_ticket(
        first in properties::directed_segment(6, Direction::Westbound),
        second in properties::directed_segment(6, Direction::Westbound),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let store = store();

        let outcome = runtime.block_on(async {
            store
                .create_booking(request(first.origin().value(), first.destination().value(), &[SEAT]))
                .await
                .unwrap();
            store
                .create_booking(request(second.origin().value(), second.destination().value(), &[SEAT]))
                .await
        });

        match outcome {
            Ok(_) => prop_assert!(!first.overlaps(&second)),
            Err(BookingError::SeatConflict { conflicting_ticket, .. }) => {
                prop_assert!(first.overlaps(&second));
                prop_assert_eq!(conflicting_ticket, TicketId::new(1));
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}
