//! The all-or-nothing booking transaction.
//!
//! [`execute_booking`] drives one booking attempt through the states
//!
//! ```text
//! Start ──► Resolve ──► Check ──► Commit ──► Committed
//!   │          │          │          │
//!   └──────────┴──────────┴──────────┴─────► Aborted (rollback)
//! ```
//!
//! against a [`BookingTransaction`]. Storage back ends only supply the primitive
//! reads and writes; the ordering, the overlap rule and the rollback discipline
//! live here once.
//!
//! # Isolation
//!
//! The check and the ticket inserts must observe one consistent view of the
//! seat. Implementations guarantee that either by holding an exclusive lock on
//! `(journey, seat)` from [`BookingTransaction::lock_seat`] until the end of the
//! transaction, or by running under an isolation level that detects write skew
//! between the read in [`BookingTransaction::tickets_on_seat`] and a concurrent
//! insert. Plain read-committed check-then-insert is not enough.

use crate::BoxFuture;
use crate::booking::{CommittedBooking, IssuedTicket, NewTicket, ValidatedBooking};
use crate::error::BookingError;
use crate::resolver::resolve_seat;
use crate::segment::{ExistingTicket, SeatCheck, check_seat};
use crate::types::{
    BookingId, Journey, JourneyId, LogicalSeat, Money, PhysicalSeat, SeatId, TicketId, TrainId,
};
use std::time::Duration;

/// One open transaction scope on the booking tables.
///
/// Dropping a transaction without calling [`commit`](Self::commit) must discard
/// every write made through it. The coordinator relies on this when its future is
/// dropped mid-flight (timeouts, task cancellation).
pub trait BookingTransaction: Send + 'static {
    /// Loads the journey, or `None` if it does not exist.
    fn load_journey(
        &mut self,
        journey_id: JourneyId,
    ) -> BoxFuture<'_, Result<Option<Journey>, BookingError>>;

    /// Inserts the booking row and returns its id.
    fn insert_booking<'a>(
        &'a mut self,
        email: &'a str,
        cost_total: Money,
    ) -> BoxFuture<'a, Result<BookingId, BookingError>>;

    /// All physical seats matching the logical seat on the train.
    fn find_seats(
        &mut self,
        train_id: TrainId,
        seat: LogicalSeat,
    ) -> BoxFuture<'_, Result<Vec<PhysicalSeat>, BookingError>>;

    /// Takes the exclusive `(journey, seat)` lock, held until commit or rollback.
    ///
    /// Back ends that rely on serializable isolation instead may make this a no-op.
    fn lock_seat(
        &mut self,
        journey_id: JourneyId,
        seat_id: SeatId,
    ) -> BoxFuture<'_, Result<(), BookingError>>;

    /// Tickets already issued for the seat on the journey.
    fn tickets_on_seat(
        &mut self,
        journey_id: JourneyId,
        seat_id: SeatId,
    ) -> BoxFuture<'_, Result<Vec<ExistingTicket>, BookingError>>;

    /// Inserts one ticket row.
    fn insert_ticket<'a>(
        &'a mut self,
        ticket: &'a NewTicket,
    ) -> BoxFuture<'a, Result<TicketId, BookingError>>;

    /// Makes every write of the transaction visible at once.
    fn commit(self) -> BoxFuture<'static, Result<(), BookingError>>
    where
        Self: Sized;

    /// Discards every write of the transaction.
    fn rollback(self) -> BoxFuture<'static, Result<(), BookingError>>
    where
        Self: Sized;
}

/// Runs one booking attempt inside `tx`.
///
/// On success every ticket is committed together with the booking row. On any
/// failure the transaction is rolled back and nothing from the attempt persists,
/// including tickets for seats that were free.
///
/// `deadline` bounds everything before the commit. Once staging has finished the
/// commit is always awaited, so a booking reported as timed out never persisted
/// and one that persisted is never reported as timed out.
///
/// # Errors
///
/// Returns the [`BookingError`] that aborted the attempt, or
/// [`BookingError::TimedOut`] if staging outlived `deadline`. A failing rollback
/// is logged but never replaces the original error.
pub async fn execute_booking<T>(
    mut tx: T,
    booking: &ValidatedBooking,
    deadline: Option<Duration>,
) -> Result<CommittedBooking, BookingError>
where
    T: BookingTransaction,
{
    let staged = match deadline {
        Some(limit) => tokio::time::timeout(limit, stage_booking(&mut tx, booking))
            .await
            .unwrap_or(Err(BookingError::TimedOut(limit))),
        None => stage_booking(&mut tx, booking).await,
    };

    match staged {
        Ok(committed) => {
            tx.commit().await?;
            tracing::info!(
                booking_id = %committed.booking_id,
                journey_id = committed.journey_id.value(),
                segment = %committed.segment,
                tickets = committed.tickets.len(),
                "Booking committed"
            );
            Ok(committed)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::warn!(
                    error = %rollback_error,
                    "Rollback failed; the transaction is discarded with its connection"
                );
            }
            tracing::debug!(
                journey_id = booking.journey_id().value(),
                reason = error.kind(),
                error = %error,
                "Booking aborted"
            );
            Err(error)
        }
    }
}

async fn stage_booking<T>(
    tx: &mut T,
    booking: &ValidatedBooking,
) -> Result<CommittedBooking, BookingError>
where
    T: BookingTransaction,
{
    let journey_id = booking.journey_id();
    let segment = booking.segment();

    // Start
    let journey = tx
        .load_journey(journey_id)
        .await?
        .ok_or(BookingError::JourneyNotFound(journey_id))?;
    booking.check_journey(&journey)?;
    let booking_id = tx.insert_booking(booking.email(), booking.cost_total()).await?;

    // Resolve
    let mut resolved: Vec<(LogicalSeat, PhysicalSeat)> = Vec::with_capacity(booking.seats().len());
    for &seat in booking.seats() {
        let matches = tx.find_seats(journey.train_id, seat).await?;
        let physical = resolve_seat(journey.train_id, seat, booking.class(), &matches)?;
        resolved.push((seat, physical));
    }

    // Check. Locks are taken in seat id order so that two multi-seat bookings
    // sharing seats cannot deadlock on each other.
    let mut lock_order: Vec<SeatId> = resolved.iter().map(|(_, physical)| physical.id).collect();
    lock_order.sort_unstable();
    lock_order.dedup();
    if lock_order.len() != resolved.len() {
        return Err(BookingError::InvariantViolation(format!(
            "distinct seats in booking for journey {journey_id} resolve to the same physical seat"
        )));
    }
    for seat_id in lock_order {
        tx.lock_seat(journey_id, seat_id).await?;
    }

    for (seat, physical) in &resolved {
        let existing = tx.tickets_on_seat(journey_id, physical.id).await?;
        match check_seat(&segment, journey.direction, &existing) {
            SeatCheck::Free => {}
            SeatCheck::Conflict(conflicting_ticket) => {
                return Err(BookingError::SeatConflict {
                    seat: *seat,
                    conflicting_ticket,
                });
            }
            SeatCheck::Corrupt(ticket_id) => {
                tracing::error!(
                    journey_id = journey_id.value(),
                    seat_id = physical.id.value(),
                    ticket_id = ticket_id.value(),
                    direction = %journey.direction,
                    "Ticket runs against the direction of its journey"
                );
                return Err(BookingError::InvariantViolation(format!(
                    "ticket {ticket_id} runs against the {} journey {journey_id}",
                    journey.direction
                )));
            }
        }
    }

    // Commit
    let mut tickets = Vec::with_capacity(resolved.len());
    for (seat, physical) in resolved {
        let ticket = NewTicket {
            booking_id,
            journey_id,
            seat_id: physical.id,
            segment,
            class: physical.class,
            cost: booking.cost_per_seat(),
        };
        let ticket_id = tx.insert_ticket(&ticket).await?;
        tickets.push(IssuedTicket {
            ticket_id,
            seat,
            seat_id: physical.id,
        });
    }

    Ok(CommittedBooking {
        booking_id,
        journey_id,
        segment,
        cost_total: booking.cost_total(),
        tickets,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::booking::BookingRequest;
    use crate::segment::Segment;
    use crate::types::{Direction, SeatClass, StationIndex};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Lock(i64),
        Insert(i64),
        Commit,
        Rollback,
    }

    /// Seat ids are `car * 100 + row * 10 + column`; seats listed in `taken` hold
    /// a 1->6 ticket.
    struct RecordingTransaction {
        calls: Arc<Mutex<Vec<Call>>>,
        taken: Vec<i64>,
        next_ticket: i64,
        read_delay: Duration,
        commit_delay: Duration,
    }

    impl RecordingTransaction {
        fn new(taken: Vec<i64>) -> (Self, Arc<Mutex<Vec<Call>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let tx = Self {
                calls: Arc::clone(&calls),
                taken,
                next_ticket: 1,
                read_delay: Duration::ZERO,
                commit_delay: Duration::ZERO,
            };
            (tx, calls)
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl BookingTransaction for RecordingTransaction {
        fn load_journey(
            &mut self,
            journey_id: JourneyId,
        ) -> BoxFuture<'_, Result<Option<Journey>, BookingError>> {
            Box::pin(async move {
                Ok(Some(Journey {
                    id: journey_id,
                    train_id: TrainId::new(1),
                    direction: Direction::Westbound,
                    station_count: 6,
                }))
            })
        }

        fn insert_booking<'a>(
            &'a mut self,
            _email: &'a str,
            _cost_total: Money,
        ) -> BoxFuture<'a, Result<BookingId, BookingError>> {
            Box::pin(async move { Ok(BookingId::new()) })
        }

        fn find_seats(
            &mut self,
            _train_id: TrainId,
            seat: LogicalSeat,
        ) -> BoxFuture<'_, Result<Vec<PhysicalSeat>, BookingError>> {
            Box::pin(async move {
                Ok(vec![PhysicalSeat {
                    id: SeatId::new(
                        i64::from(seat.car) * 100 + i64::from(seat.row) * 10 + i64::from(seat.column),
                    ),
                    class: SeatClass::Economy,
                }])
            })
        }

        fn lock_seat(
            &mut self,
            _journey_id: JourneyId,
            seat_id: SeatId,
        ) -> BoxFuture<'_, Result<(), BookingError>> {
            self.record(Call::Lock(seat_id.value()));
            Box::pin(async move { Ok(()) })
        }

        fn tickets_on_seat(
            &mut self,
            _journey_id: JourneyId,
            seat_id: SeatId,
        ) -> BoxFuture<'_, Result<Vec<ExistingTicket>, BookingError>> {
            let held = if self.taken.contains(&seat_id.value()) {
                vec![ExistingTicket {
                    ticket_id: TicketId::new(99),
                    segment: Segment::new(StationIndex::new(1), StationIndex::new(6)).unwrap(),
                }]
            } else {
                Vec::new()
            };
            let delay = self.read_delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(held)
            })
        }

        fn insert_ticket<'a>(
            &'a mut self,
            ticket: &'a NewTicket,
        ) -> BoxFuture<'a, Result<TicketId, BookingError>> {
            self.record(Call::Insert(ticket.seat_id.value()));
            let id = self.next_ticket;
            self.next_ticket += 1;
            Box::pin(async move { Ok(TicketId::new(id)) })
        }

        fn commit(self) -> BoxFuture<'static, Result<(), BookingError>> {
            let delay = self.commit_delay;
            let calls = Arc::clone(&self.calls);
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                calls.lock().unwrap().push(Call::Commit);
                Ok(())
            })
        }

        fn rollback(self) -> BoxFuture<'static, Result<(), BookingError>> {
            self.record(Call::Rollback);
            Box::pin(async { Ok(()) })
        }
    }

    fn booking(seats: Vec<LogicalSeat>) -> ValidatedBooking {
        let count = seats.len() as u64;
        BookingRequest {
            journey_id: JourneyId::new(1),
            direction: None,
            origin: StationIndex::new(2),
            destination: StationIndex::new(4),
            seats,
            class: SeatClass::Economy,
            cost_per_seat: Money::from_minor(100),
            cost_total: Money::from_minor(100 * count),
            email: "rider@example.com".to_string(),
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn test_locks_in_seat_id_order_and_commits() {
        let (tx, calls) = RecordingTransaction::new(vec![]);
        let seats = vec![
            LogicalSeat::new(4, 2, 1),
            LogicalSeat::new(3, 1, 1),
            LogicalSeat::new(3, 5, 2),
        ];

        let committed = execute_booking(tx, &booking(seats.clone()), None).await.unwrap();

        let requested: Vec<LogicalSeat> = committed.tickets.iter().map(|t| t.seat).collect();
        assert_eq!(requested, seats);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Lock(311),
                Call::Lock(352),
                Call::Lock(421),
                Call::Insert(421),
                Call::Insert(311),
                Call::Insert(352),
                Call::Commit,
            ]
        );
    }

    #[tokio::test]
    async fn test_conflict_rolls_back_without_inserting() {
        let (tx, calls) = RecordingTransaction::new(vec![352]);
        let seats = vec![LogicalSeat::new(3, 1, 1), LogicalSeat::new(3, 5, 2)];

        let err = execute_booking(tx, &booking(seats), None).await.unwrap_err();

        assert_eq!(
            err,
            BookingError::SeatConflict {
                seat: LogicalSeat::new(3, 5, 2),
                conflicting_ticket: TicketId::new(99),
            }
        );
        let calls = calls.lock().unwrap();
        assert!(!calls.iter().any(|c| matches!(c, Call::Insert(_) | Call::Commit)));
        assert_eq!(calls.last(), Some(&Call::Rollback));
    }

    #[tokio::test]
    async fn test_deadline_during_staging_rolls_back() {
        let (mut tx, calls) = RecordingTransaction::new(vec![]);
        tx.read_delay = Duration::from_millis(500);
        let deadline = Duration::from_millis(20);

        let err = execute_booking(tx, &booking(vec![LogicalSeat::new(3, 1, 1)]), Some(deadline))
            .await
            .unwrap_err();

        assert_eq!(err, BookingError::TimedOut(deadline));
        let calls = calls.lock().unwrap();
        assert!(!calls.iter().any(|c| matches!(c, Call::Insert(_) | Call::Commit)));
        assert_eq!(calls.last(), Some(&Call::Rollback));
    }

    #[tokio::test]
    async fn test_commit_is_not_cut_short_by_deadline() {
        let (mut tx, calls) = RecordingTransaction::new(vec![]);
        tx.commit_delay = Duration::from_millis(100);

        let committed = execute_booking(
            tx,
            &booking(vec![LogicalSeat::new(3, 1, 1)]),
            Some(Duration::from_millis(20)),
        )
        .await
        .unwrap();

        assert_eq!(committed.tickets.len(), 1);
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Commit));
    }
}
