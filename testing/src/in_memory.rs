//! In-memory booking store for fast, deterministic tests.
//!
//! [`InMemoryBookingStore`] runs the same coordinator as the Postgres store. Seat
//! locks are real async mutexes held until commit or rollback, and every write is
//! staged inside the transaction, so races and aborts behave like they do against
//! a database:
//!
//! - a dropped [`InMemoryTransaction`] leaves no trace
//! - [`InMemoryBookingStore::fail_next_commits`] injects transient failures
//! - [`InMemoryBookingStoreBuilder::with_seat`] can create duplicate inventory

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use crate::fixtures::FleetLayout;
use crate::mocks::test_clock;
use chrono::{DateTime, Utc};
use seat_booking_core::{
    BookingError, BookingId, BookingRequest, BookingStore, BookingSummary, BoxFuture,
    BookingTransaction, CancellationOutcome, Clock, CommittedBooking, ExistingTicket, Journey,
    JourneyId, LogicalSeat, Money, NewTicket, OccupancyQuery, Page, PhysicalSeat, SeatClass,
    SeatId, Segment, TicketId, TicketView, TrainId, execute_booking,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Clone)]
struct SeatRow {
    id: SeatId,
    train_id: TrainId,
    seat: LogicalSeat,
    class: SeatClass,
}

#[derive(Debug, Clone)]
struct BookingRow {
    id: BookingId,
    email: String,
    cost_total: Money,
    created_at: DateTime<Utc>,
    sequence: u64,
}

#[derive(Debug, Clone)]
struct TicketRow {
    id: TicketId,
    booking_id: BookingId,
    journey_id: JourneyId,
    seat_id: SeatId,
    segment: Segment,
    class: SeatClass,
    cost: Money,
}

#[derive(Debug, Default)]
struct Tables {
    seats: Vec<SeatRow>,
    journeys: HashMap<JourneyId, Journey>,
    bookings: Vec<BookingRow>,
    tickets: Vec<TicketRow>,
}

impl Tables {
    fn seat(&self, seat_id: SeatId) -> Option<&SeatRow> {
        self.seats.iter().find(|row| row.id == seat_id)
    }

    fn ticket_view(&self, ticket: &TicketRow) -> Result<TicketView, BookingError> {
        let seat = self.seat(ticket.seat_id).ok_or_else(|| {
            BookingError::InvariantViolation(format!(
                "ticket {} references missing seat {}",
                ticket.id, ticket.seat_id
            ))
        })?;
        Ok(TicketView {
            ticket_id: ticket.id,
            journey_id: ticket.journey_id,
            origin: ticket.segment.origin(),
            destination: ticket.segment.destination(),
            seat: seat.seat,
            class: ticket.class,
            cost: ticket.cost,
        })
    }
}

#[derive(Debug, Default)]
struct Faults {
    failing_commits: u32,
    commit_delay: Option<Duration>,
    read_delay: Option<Duration>,
}

type SeatLock = Arc<tokio::sync::Mutex<()>>;

struct Shared {
    tables: Mutex<Tables>,
    // One entry per (journey, seat) ever locked; entries are never evicted.
    seat_locks: Mutex<HashMap<(JourneyId, SeatId), SeatLock>>,
    faults: Mutex<Faults>,
    next_ticket: AtomicI64,
    next_sequence: AtomicU64,
    clock: Arc<dyn Clock>,
}

/// In-memory [`BookingStore`].
///
/// Seat locks are created the first time a `(journey, seat)` pair is booked
/// and kept for the life of the store, so memory grows with the number of
/// distinct seats ever touched. Meant for tests and short-lived fixtures, not
/// for long-running processes.
///
/// # Example
///
/// ```
/// use seat_booking_testing::{FleetLayout, InMemoryBookingStore, sample_journey};
/// use seat_booking_core::{Direction, TrainId};
///
/// let store = InMemoryBookingStore::builder()
///     .with_train(TrainId::new(1), &FleetLayout::standard())
///     .with_journey(sample_journey(1, TrainId::new(1), Direction::Westbound))
///     .build();
/// assert_eq!(store.ticket_count(), 0);
/// ```
#[derive(Clone)]
pub struct InMemoryBookingStore {
    shared: Arc<Shared>,
}

impl fmt::Debug for InMemoryBookingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.shared.tables.lock().unwrap();
        f.debug_struct("InMemoryBookingStore")
            .field("seats", &tables.seats.len())
            .field("journeys", &tables.journeys.len())
            .field("bookings", &tables.bookings.len())
            .field("tickets", &tables.tickets.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryBookingStore {
    /// Starts building a store.
    #[must_use]
    pub fn builder() -> InMemoryBookingStoreBuilder {
        InMemoryBookingStoreBuilder::default()
    }

    /// Opens a transaction. Nothing it writes is visible before commit.
    #[must_use]
    pub fn begin(&self) -> InMemoryTransaction {
        InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            held: Vec::new(),
            booking: None,
            tickets: Vec::new(),
        }
    }

    /// Makes the next `count` commits fail with a transient error.
    pub fn fail_next_commits(&self, count: u32) {
        self.shared.faults.lock().unwrap().failing_commits = count;
    }

    /// Delays every commit, while still holding the seat locks.
    pub fn delay_commits(&self, delay: Duration) {
        self.shared.faults.lock().unwrap().commit_delay = Some(delay);
    }

    /// Delays every read of a seat's tickets, after its lock is taken.
    pub fn delay_reads(&self, delay: Duration) {
        self.shared.faults.lock().unwrap().read_delay = Some(delay);
    }

    /// Committed tickets across all journeys.
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.shared.tables.lock().unwrap().tickets.len()
    }

    /// Committed bookings.
    #[must_use]
    pub fn booking_count(&self) -> usize {
        self.shared.tables.lock().unwrap().bookings.len()
    }

    /// Committed tickets for a seat on a journey, in ticket order.
    ///
    /// Returns nothing for an unknown journey or seat.
    #[must_use]
    pub fn tickets_for_seat(&self, journey_id: JourneyId, seat: LogicalSeat) -> Vec<ExistingTicket> {
        let tables = self.shared.tables.lock().unwrap();
        let Some(journey) = tables.journeys.get(&journey_id) else {
            return Vec::new();
        };
        let seat_ids: Vec<SeatId> = tables
            .seats
            .iter()
            .filter(|row| row.train_id == journey.train_id && row.seat == seat)
            .map(|row| row.id)
            .collect();
        tables
            .tickets
            .iter()
            .filter(|t| t.journey_id == journey_id && seat_ids.contains(&t.seat_id))
            .map(|t| ExistingTicket {
                ticket_id: t.id,
                segment: t.segment,
            })
            .collect()
    }
}

impl BookingStore for InMemoryBookingStore {
    fn create_booking_with_deadline(
        &self,
        request: BookingRequest,
        deadline: Option<Duration>,
    ) -> BoxFuture<'_, Result<CommittedBooking, BookingError>> {
        Box::pin(async move {
            let booking = request.validate()?;
            execute_booking(self.begin(), &booking, deadline).await
        })
    }

    fn cancel_booking(
        &self,
        booking_id: BookingId,
    ) -> BoxFuture<'_, Result<CancellationOutcome, BookingError>> {
        let mut tables = self.shared.tables.lock().unwrap();
        let outcome = match tables.bookings.iter().position(|b| b.id == booking_id) {
            None => CancellationOutcome::NotFound { booking_id },
            Some(index) => {
                tables.bookings.remove(index);
                let before = tables.tickets.len();
                tables.tickets.retain(|t| t.booking_id != booking_id);
                CancellationOutcome::Deleted {
                    booking_id,
                    tickets_released: (before - tables.tickets.len()) as u64,
                }
            }
        };
        drop(tables);
        Box::pin(async move { Ok(outcome) })
    }

    fn bookings_for_email<'a>(
        &'a self,
        email: &'a str,
        page: Page,
    ) -> BoxFuture<'a, Result<Vec<BookingSummary>, BookingError>> {
        Box::pin(async move {
            let email = email.trim();
            let tables = self.shared.tables.lock().unwrap();

            let mut bookings: Vec<&BookingRow> =
                tables.bookings.iter().filter(|b| b.email == email).collect();
            bookings.sort_by_key(|b| (b.created_at, b.sequence));

            let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let size = usize::try_from(page.size).unwrap_or(usize::MAX);

            bookings
                .into_iter()
                .skip(offset)
                .take(size)
                .map(|booking| -> Result<BookingSummary, BookingError> {
                    let mut tickets: Vec<&TicketRow> = tables
                        .tickets
                        .iter()
                        .filter(|t| t.booking_id == booking.id)
                        .collect();
                    tickets.sort_by_key(|t| t.id);
                    Ok(BookingSummary {
                        booking_id: booking.id,
                        email: booking.email.clone(),
                        cost_total: booking.cost_total,
                        created_at: booking.created_at,
                        tickets: tickets
                            .into_iter()
                            .map(|t| tables.ticket_view(t))
                            .collect::<Result<_, _>>()?,
                    })
                })
                .collect()
        })
    }

    fn booked_emails(&self) -> BoxFuture<'_, Result<Vec<String>, BookingError>> {
        let tables = self.shared.tables.lock().unwrap();
        let mut emails: Vec<String> = tables.bookings.iter().map(|b| b.email.clone()).collect();
        drop(tables);
        emails.sort();
        emails.dedup();
        Box::pin(async move { Ok(emails) })
    }

    fn occupied_seats(
        &self,
        query: OccupancyQuery,
    ) -> BoxFuture<'_, Result<Vec<LogicalSeat>, BookingError>> {
        Box::pin(async move {
            let tables = self.shared.tables.lock().unwrap();
            let journey = tables
                .journeys
                .get(&query.journey_id)
                .ok_or(BookingError::JourneyNotFound(query.journey_id))?;
            query.check_journey(journey)?;

            let mut seats = tables
                .tickets
                .iter()
                .filter(|t| t.journey_id == query.journey_id)
                .filter(|t| t.segment.overlaps(&query.segment))
                .filter(|t| query.class.is_none_or(|class| class == t.class))
                .map(|t| {
                    tables.seat(t.seat_id).map(|row| row.seat).ok_or_else(|| {
                        BookingError::InvariantViolation(format!(
                            "ticket {} references missing seat {}",
                            t.id, t.seat_id
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            seats.sort_by_key(|s| (s.car, s.column, s.row));
            seats.dedup();
            Ok(seats)
        })
    }
}

/// A transaction on an [`InMemoryBookingStore`].
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    held: Vec<OwnedMutexGuard<()>>,
    booking: Option<BookingRow>,
    tickets: Vec<TicketRow>,
}

impl fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("locks_held", &self.held.len())
            .field("booking", &self.booking)
            .field("tickets", &self.tickets)
            .finish_non_exhaustive()
    }
}

impl BookingTransaction for InMemoryTransaction {
    fn load_journey(
        &mut self,
        journey_id: JourneyId,
    ) -> BoxFuture<'_, Result<Option<Journey>, BookingError>> {
        let journey = self
            .shared
            .tables
            .lock()
            .unwrap()
            .journeys
            .get(&journey_id)
            .copied();
        Box::pin(async move { Ok(journey) })
    }

    fn insert_booking<'a>(
        &'a mut self,
        email: &'a str,
        cost_total: Money,
    ) -> BoxFuture<'a, Result<BookingId, BookingError>> {
        let id = BookingId::new();
        self.booking = Some(BookingRow {
            id,
            email: email.to_string(),
            cost_total,
            created_at: self.shared.clock.now(),
            sequence: self.shared.next_sequence.fetch_add(1, Ordering::Relaxed),
        });
        Box::pin(async move { Ok(id) })
    }

    fn find_seats(
        &mut self,
        train_id: TrainId,
        seat: LogicalSeat,
    ) -> BoxFuture<'_, Result<Vec<PhysicalSeat>, BookingError>> {
        let matches = self
            .shared
            .tables
            .lock()
            .unwrap()
            .seats
            .iter()
            .filter(|row| row.train_id == train_id && row.seat == seat)
            .map(|row| PhysicalSeat {
                id: row.id,
                class: row.class,
            })
            .collect();
        Box::pin(async move { Ok(matches) })
    }

    fn lock_seat(
        &mut self,
        journey_id: JourneyId,
        seat_id: SeatId,
    ) -> BoxFuture<'_, Result<(), BookingError>> {
        let lock = Arc::clone(
            self.shared
                .seat_locks
                .lock()
                .unwrap()
                .entry((journey_id, seat_id))
                .or_default(),
        );
        Box::pin(async move {
            let guard = lock.lock_owned().await;
            self.held.push(guard);
            Ok(())
        })
    }

    fn tickets_on_seat(
        &mut self,
        journey_id: JourneyId,
        seat_id: SeatId,
    ) -> BoxFuture<'_, Result<Vec<ExistingTicket>, BookingError>> {
        Box::pin(async move {
            // Give concurrent bookers a chance to interleave between check and insert.
            tokio::task::yield_now().await;
            let delay = self.shared.faults.lock().unwrap().read_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let tables = self.shared.tables.lock().unwrap();
            Ok(tables
                .tickets
                .iter()
                .chain(self.tickets.iter())
                .filter(|t| t.journey_id == journey_id && t.seat_id == seat_id)
                .map(|t| ExistingTicket {
                    ticket_id: t.id,
                    segment: t.segment,
                })
                .collect())
        })
    }

    fn insert_ticket<'a>(
        &'a mut self,
        ticket: &'a NewTicket,
    ) -> BoxFuture<'a, Result<TicketId, BookingError>> {
        let id = TicketId::new(self.shared.next_ticket.fetch_add(1, Ordering::Relaxed));
        self.tickets.push(TicketRow {
            id,
            booking_id: ticket.booking_id,
            journey_id: ticket.journey_id,
            seat_id: ticket.seat_id,
            segment: ticket.segment,
            class: ticket.class,
            cost: ticket.cost,
        });
        Box::pin(async move { Ok(id) })
    }

    fn commit(self) -> BoxFuture<'static, Result<(), BookingError>> {
        Box::pin(async move {
            let delay = self.shared.faults.lock().unwrap().commit_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            {
                let mut faults = self.shared.faults.lock().unwrap();
                if faults.failing_commits > 0 {
                    faults.failing_commits -= 1;
                    return Err(BookingError::transient("injected commit failure"));
                }
            }

            let mut tables = self.shared.tables.lock().unwrap();
            if let Some(booking) = self.booking {
                tables.bookings.push(booking);
            }
            tables.tickets.extend(self.tickets);
            // Seat locks in `self.held` are released when the transaction drops here.
            Ok(())
        })
    }

    fn rollback(self) -> BoxFuture<'static, Result<(), BookingError>> {
        drop(self);
        Box::pin(async { Ok(()) })
    }
}

/// Builder for [`InMemoryBookingStore`].
#[derive(Default)]
pub struct InMemoryBookingStoreBuilder {
    tables: Tables,
    next_seat: i64,
    next_ticket: i64,
    clock: Option<Arc<dyn Clock>>,
}

impl InMemoryBookingStoreBuilder {
    /// Adds every seat of `layout` to the train.
    #[must_use]
    pub fn with_train(mut self, train_id: TrainId, layout: &FleetLayout) -> Self {
        for fleet_seat in layout.seats() {
            self = self.with_seat(train_id, fleet_seat.seat, fleet_seat.class);
        }
        self
    }

    /// Adds one seat. Adding the same position twice creates duplicate inventory.
    #[must_use]
    pub fn with_seat(mut self, train_id: TrainId, seat: LogicalSeat, class: SeatClass) -> Self {
        self.next_seat += 1;
        self.tables.seats.push(SeatRow {
            id: SeatId::new(self.next_seat),
            train_id,
            seat,
            class,
        });
        self
    }

    /// Adds a journey.
    #[must_use]
    pub fn with_journey(mut self, journey: Journey) -> Self {
        self.tables.journeys.insert(journey.id, journey);
        self
    }

    /// Stores a ticket as-is, bypassing every booking rule.
    ///
    /// Used to seed existing bookings and corrupted data. The journey and seat must
    /// already have been added.
    ///
    /// # Panics
    ///
    /// Panics if the journey or seat is unknown.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_ticket(mut self, journey_id: JourneyId, seat: LogicalSeat, segment: Segment) -> Self {
        let journey = *self
            .tables
            .journeys
            .get(&journey_id)
            .expect("journey must be added before its tickets");
        let seat_row = self
            .tables
            .seats
            .iter()
            .find(|row| row.train_id == journey.train_id && row.seat == seat)
            .cloned()
            .expect("seat must be added before its tickets");

        let booking_id = BookingId::new();
        self.tables.bookings.push(BookingRow {
            id: booking_id,
            email: "seed@example.com".to_string(),
            cost_total: Money::default(),
            created_at: DateTime::<Utc>::MIN_UTC,
            sequence: 0,
        });
        self.next_ticket += 1;
        self.tables.tickets.push(TicketRow {
            id: TicketId::new(self.next_ticket),
            booking_id,
            journey_id,
            seat_id: seat_row.id,
            segment,
            class: seat_row.class,
            cost: Money::default(),
        });
        self
    }

    /// Clock stamping new bookings (defaults to [`test_clock`]).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the store.
    #[must_use]
    pub fn build(self) -> InMemoryBookingStore {
        InMemoryBookingStore {
            shared: Arc::new(Shared {
                tables: Mutex::new(self.tables),
                seat_locks: Mutex::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                next_ticket: AtomicI64::new(self.next_ticket + 1),
                next_sequence: AtomicU64::new(1),
                clock: self.clock.unwrap_or_else(|| Arc::new(test_clock())),
            }),
        }
    }
}
