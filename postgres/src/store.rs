//! [`BookingStore`] backed by Postgres.

use crate::error::{
    classify, corrupt, money_from_db, position_from_db, station_from_db, station_to_db,
};
use crate::strategy::ConcurrencyStrategy;
use crate::transaction::{JourneyRow, PgBookingTransaction, SELECT_JOURNEY, journey_from_row};
use chrono::{DateTime, Utc};
use seat_booking_core::{
    BookingError, BookingId, BookingRequest, BookingStore, BookingSummary, BoxFuture,
    CancellationOutcome, Clock, CommittedBooking, JourneyId, LogicalSeat, OccupancyQuery, Page,
    SeatClass, SystemClock, TicketId, TicketView, execute_booking,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Connection pool sizing and timeouts.
///
/// Defaults suit short OLTP transactions: a booking holds its connection only
/// for the few statements of one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
    /// Close connections idle for longer than this
    pub idle_timeout: Duration,
    /// Recycle connections older than this
    pub max_lifetime: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(60),
        }
    }
}

/// Ticket row joined with its seat position.
type TicketRecord = (i64, Uuid, i64, i16, i16, i16, i16, i16, String, i64);

/// Postgres-backed booking store.
///
/// # Example
///
/// ```no_run
/// use seat_booking_postgres::{ConcurrencyStrategy, PoolSettings, PostgresBookingStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresBookingStore::connect("postgres://localhost/booking", &PoolSettings::default())
///     .await?
///     .with_strategy(ConcurrencyStrategy::Serializable);
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
    strategy: ConcurrencyStrategy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PostgresBookingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBookingStore")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl PostgresBookingStore {
    /// Wraps an existing pool, using the default strategy and the system clock.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            strategy: ConcurrencyStrategy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Opens a pool and wraps it.
    ///
    /// # Errors
    ///
    /// [`BookingError::TransientFailure`] if the database cannot be reached.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self, BookingError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .max_lifetime(settings.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| classify("connect", e))?;

        tracing::info!(
            max_connections = settings.max_connections,
            "Connected to booking database"
        );
        Ok(Self::from_pool(pool))
    }

    /// Selects how concurrent bookings are serialized.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: ConcurrencyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replaces the clock stamping new bookings.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creates or upgrades the booking schema.
    ///
    /// # Errors
    ///
    /// [`BookingError::TransientFailure`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), BookingError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BookingError::transient(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Opens a booking transaction.
    ///
    /// # Errors
    ///
    /// [`BookingError::TransientFailure`] if no connection is available.
    pub async fn begin(&self) -> Result<PgBookingTransaction, BookingError> {
        PgBookingTransaction::begin(&self.pool, self.strategy, Arc::clone(&self.clock)).await
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Strategy in force.
    #[must_use]
    pub const fn strategy(&self) -> ConcurrencyStrategy {
        self.strategy
    }

    async fn tickets_of(&self, booking_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TicketView>>, BookingError> {
        let rows: Vec<TicketRecord> = sqlx::query_as(
            "SELECT t.id, t.booking_id, t.journey_id, t.origin, t.destination,
                    c.car_no, s.seat_row, s.seat_column, t.class, t.cost
             FROM tickets t
             JOIN seats s ON s.id = t.seat_id
             JOIN cars c ON c.id = s.car_id
             WHERE t.booking_id = ANY($1)
             ORDER BY t.id",
        )
        .bind(booking_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("load booking tickets", e))?;

        let mut by_booking: HashMap<Uuid, Vec<TicketView>> = HashMap::new();
        for (id, booking_id, journey_id, origin, destination, car, row, column, class, cost) in rows
        {
            let class: SeatClass = class
                .parse()
                .map_err(|e| corrupt(format!("ticket {id}: {e}")))?;
            by_booking.entry(booking_id).or_default().push(TicketView {
                ticket_id: TicketId::new(id),
                journey_id: JourneyId::new(journey_id),
                origin: station_from_db(origin)?,
                destination: station_from_db(destination)?,
                seat: LogicalSeat::new(
                    position_from_db("car", car)?,
                    position_from_db("row", row)?,
                    position_from_db("column", column)?,
                ),
                class,
                cost: money_from_db(cost)?,
            });
        }
        Ok(by_booking)
    }
}

impl BookingStore for PostgresBookingStore {
    fn create_booking_with_deadline(
        &self,
        request: BookingRequest,
        deadline: Option<Duration>,
    ) -> BoxFuture<'_, Result<CommittedBooking, BookingError>> {
        Box::pin(async move {
            let booking = request.validate()?;
            // Opening the transaction is bounded by the pool's acquire timeout.
            let tx = self.begin().await?;
            execute_booking(tx, &booking, deadline).await
        })
    }

    fn cancel_booking(
        &self,
        booking_id: BookingId,
    ) -> BoxFuture<'_, Result<CancellationOutcome, BookingError>> {
        Box::pin(async move {
            let id = *booking_id.as_uuid();
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| classify("begin cancellation", e))?;

            let released = sqlx::query("DELETE FROM tickets WHERE booking_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify("delete tickets", e))?
                .rows_affected();
            let deleted = sqlx::query("DELETE FROM bookings WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify("delete booking", e))?
                .rows_affected();

            tx.commit()
                .await
                .map_err(|e| classify("commit cancellation", e))?;

            if deleted == 0 {
                tracing::debug!(%booking_id, "Cancellation of unknown booking");
                return Ok(CancellationOutcome::NotFound { booking_id });
            }
            tracing::info!(%booking_id, tickets_released = released, "Booking cancelled");
            Ok(CancellationOutcome::Deleted {
                booking_id,
                tickets_released: released,
            })
        })
    }

    fn bookings_for_email<'a>(
        &'a self,
        email: &'a str,
        page: Page,
    ) -> BoxFuture<'a, Result<Vec<BookingSummary>, BookingError>> {
        Box::pin(async move {
            let limit = i64::from(page.size);
            let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

            let bookings: Vec<(Uuid, String, i64, DateTime<Utc>)> = sqlx::query_as(
                "SELECT id, email, cost_total, created_at
                 FROM bookings
                 WHERE email = $1
                 ORDER BY created_at, id
                 LIMIT $2 OFFSET $3",
            )
            .bind(email.trim())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify("list bookings", e))?;

            let ids: Vec<Uuid> = bookings.iter().map(|(id, ..)| *id).collect();
            let mut tickets = self.tickets_of(&ids).await?;

            bookings
                .into_iter()
                .map(|(id, email, cost_total, created_at)| -> Result<BookingSummary, BookingError> {
                    Ok(BookingSummary {
                        booking_id: BookingId::from_uuid(id),
                        email,
                        cost_total: money_from_db(cost_total)?,
                        created_at,
                        tickets: tickets.remove(&id).unwrap_or_default(),
                    })
                })
                .collect()
        })
    }

    fn booked_emails(&self) -> BoxFuture<'_, Result<Vec<String>, BookingError>> {
        Box::pin(async move {
            let rows: Vec<(String,)> =
                sqlx::query_as("SELECT DISTINCT email FROM bookings ORDER BY email")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| classify("list emails", e))?;
            Ok(rows.into_iter().map(|(email,)| email).collect())
        })
    }

    fn occupied_seats(
        &self,
        query: OccupancyQuery,
    ) -> BoxFuture<'_, Result<Vec<LogicalSeat>, BookingError>> {
        Box::pin(async move {
            let row: Option<JourneyRow> = sqlx::query_as(SELECT_JOURNEY)
                .bind(query.journey_id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| classify("find journey", e))?;
            let journey = row
                .map(journey_from_row)
                .transpose()?
                .ok_or(BookingError::JourneyNotFound(query.journey_id))?;
            query.check_journey(&journey)?;

            // Same half-open overlap rule as the booking check.
            let span = query.segment.span();
            let rows: Vec<(i16, i16, i16)> = sqlx::query_as(
                "SELECT DISTINCT c.car_no, s.seat_column, s.seat_row
                 FROM tickets t
                 JOIN seats s ON s.id = t.seat_id
                 JOIN cars c ON c.id = s.car_id
                 WHERE t.journey_id = $1
                   AND LEAST(t.origin, t.destination) < $3
                   AND $2 < GREATEST(t.origin, t.destination)
                   AND ($4::TEXT IS NULL OR t.class = $4)
                 ORDER BY c.car_no, s.seat_column, s.seat_row",
            )
            .bind(query.journey_id.value())
            .bind(station_to_db(span.start)?)
            .bind(station_to_db(span.end)?)
            .bind(query.class.map(|class| class.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify("list occupied seats", e))?;

            rows.into_iter()
                .map(|(car, column, row)| -> Result<LogicalSeat, BookingError> {
                    Ok(LogicalSeat::new(
                        position_from_db("car", car)?,
                        position_from_db("row", row)?,
                        position_from_db("column", column)?,
                    ))
                })
                .collect()
        })
    }
}
