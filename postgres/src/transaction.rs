//! [`BookingTransaction`] over a Postgres transaction.

use crate::error::{
    classify, corrupt, money_to_db, position_to_db, station_from_db, station_to_db,
};
use crate::strategy::{ConcurrencyStrategy, advisory_key};
use seat_booking_core::{
    BookingError, BookingId, BookingTransaction, BoxFuture, Clock, Direction, ExistingTicket,
    Journey, JourneyId, LogicalSeat, Money, NewTicket, PhysicalSeat, SeatClass, SeatId, Segment,
    TicketId, TrainId,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

/// One booking attempt's database transaction.
///
/// Dropping it without committing rolls everything back when the connection
/// returns to the pool, and releases any advisory locks it holds.
pub struct PgBookingTransaction {
    tx: Transaction<'static, Postgres>,
    strategy: ConcurrencyStrategy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PgBookingTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgBookingTransaction")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl PgBookingTransaction {
    /// Opens a transaction with the isolation the strategy needs.
    ///
    /// # Errors
    ///
    /// [`BookingError::TransientFailure`] if no connection is available.
    pub async fn begin(
        pool: &PgPool,
        strategy: ConcurrencyStrategy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BookingError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| classify("begin transaction", e))?;

        if let Some(statement) = strategy.isolation_statement() {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify("set isolation level", e))?;
        }

        Ok(Self {
            tx,
            strategy,
            clock,
        })
    }
}

pub(crate) const SELECT_JOURNEY: &str =
    "SELECT id, train_id, direction, station_count FROM journeys WHERE id = $1";

pub(crate) type JourneyRow = (i64, i64, String, i16);

pub(crate) fn journey_from_row(
    (id, train_id, direction, station_count): JourneyRow,
) -> Result<Journey, BookingError> {
    let direction: Direction = direction
        .parse()
        .map_err(|e| corrupt(format!("journey {id}: {e}")))?;
    let station_count = u16::try_from(station_count)
        .map_err(|_| corrupt(format!("journey {id} has {station_count} stations")))?;

    Ok(Journey {
        id: JourneyId::new(id),
        train_id: TrainId::new(train_id),
        direction,
        station_count,
    })
}

impl BookingTransaction for PgBookingTransaction {
    fn load_journey(
        &mut self,
        journey_id: JourneyId,
    ) -> BoxFuture<'_, Result<Option<Journey>, BookingError>> {
        Box::pin(async move {
            let row: Option<JourneyRow> = sqlx::query_as(SELECT_JOURNEY)
                .bind(journey_id.value())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| classify("load journey", e))?;

            row.map(journey_from_row).transpose()
        })
    }

    fn insert_booking<'a>(
        &'a mut self,
        email: &'a str,
        cost_total: Money,
    ) -> BoxFuture<'a, Result<BookingId, BookingError>> {
        Box::pin(async move {
            let booking_id = BookingId::new();
            sqlx::query(
                "INSERT INTO bookings (id, email, cost_total, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(*booking_id.as_uuid())
            .bind(email)
            .bind(money_to_db(cost_total)?)
            .bind(self.clock.now())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify("insert booking", e))?;
            Ok(booking_id)
        })
    }

    fn find_seats(
        &mut self,
        train_id: TrainId,
        seat: LogicalSeat,
    ) -> BoxFuture<'_, Result<Vec<PhysicalSeat>, BookingError>> {
        Box::pin(async move {
            let (Some(car), Some(row), Some(column)) = (
                position_to_db(seat.car),
                position_to_db(seat.row),
                position_to_db(seat.column),
            ) else {
                return Ok(Vec::new());
            };

            let rows: Vec<(i64, String)> = sqlx::query_as(
                "SELECT s.id, c.class
                 FROM seats s
                 JOIN cars c ON c.id = s.car_id
                 WHERE c.train_id = $1 AND c.car_no = $2 AND s.seat_row = $3 AND s.seat_column = $4
                 ORDER BY s.id",
            )
            .bind(train_id.value())
            .bind(car)
            .bind(row)
            .bind(column)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| classify("find seats", e))?;

            rows.into_iter()
                .map(|(id, class)| -> Result<PhysicalSeat, BookingError> {
                    let class: SeatClass = class
                        .parse()
                        .map_err(|e| corrupt(format!("seat {id}: {e}")))?;
                    Ok(PhysicalSeat {
                        id: SeatId::new(id),
                        class,
                    })
                })
                .collect()
        })
    }

    fn lock_seat(
        &mut self,
        journey_id: JourneyId,
        seat_id: SeatId,
    ) -> BoxFuture<'_, Result<(), BookingError>> {
        Box::pin(async move {
            if !self.strategy.locks_seats() {
                return Ok(());
            }
            let (journey_key, seat_key) = advisory_key(journey_id, seat_id);
            sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
                .bind(journey_key)
                .bind(seat_key)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| classify("lock seat", e))?;
            Ok(())
        })
    }

    fn tickets_on_seat(
        &mut self,
        journey_id: JourneyId,
        seat_id: SeatId,
    ) -> BoxFuture<'_, Result<Vec<ExistingTicket>, BookingError>> {
        Box::pin(async move {
            let rows: Vec<(i64, i16, i16)> = sqlx::query_as(
                "SELECT id, origin, destination
                 FROM tickets
                 WHERE journey_id = $1 AND seat_id = $2
                 ORDER BY id",
            )
            .bind(journey_id.value())
            .bind(seat_id.value())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| classify("load tickets", e))?;

            rows.into_iter()
                .map(|(id, origin, destination)| -> Result<ExistingTicket, BookingError> {
                    let segment = Segment::new(station_from_db(origin)?, station_from_db(destination)?)
                        .map_err(|e| corrupt(format!("ticket {id}: {e}")))?;
                    Ok(ExistingTicket {
                        ticket_id: TicketId::new(id),
                        segment,
                    })
                })
                .collect()
        })
    }

    fn insert_ticket<'a>(
        &'a mut self,
        ticket: &'a NewTicket,
    ) -> BoxFuture<'a, Result<TicketId, BookingError>> {
        Box::pin(async move {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO tickets (booking_id, journey_id, seat_id, origin, destination, class, cost)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 RETURNING id",
            )
            .bind(*ticket.booking_id.as_uuid())
            .bind(ticket.journey_id.value())
            .bind(ticket.seat_id.value())
            .bind(station_to_db(ticket.segment.origin())?)
            .bind(station_to_db(ticket.segment.destination())?)
            .bind(ticket.class.as_str())
            .bind(money_to_db(ticket.cost)?)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| classify("insert ticket", e))?;
            Ok(TicketId::new(id))
        })
    }

    fn commit(self) -> BoxFuture<'static, Result<(), BookingError>> {
        Box::pin(async move {
            self.tx
                .commit()
                .await
                .map_err(|e| classify("commit booking", e))
        })
    }

    fn rollback(self) -> BoxFuture<'static, Result<(), BookingError>> {
        Box::pin(async move {
            self.tx
                .rollback()
                .await
                .map_err(|e| classify("roll back booking", e))
        })
    }
}
