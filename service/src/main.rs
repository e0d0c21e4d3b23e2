//! `seat-booking` operator CLI.
//!
//! Books, cancels and inspects seats against the configured database and
//! prints every result as JSON on stdout. Logs go to stderr.
//!
//! Metrics are recorded but not exported: a process that exits after one
//! command has no useful Prometheus endpoint.

#![allow(clippy::print_stdout)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use seat_booking_core::{
    BookingError, BookingId, BookingRequest, BookingStore, Direction, JourneyId, LogicalSeat,
    Money, OccupancyQuery, SeatClass, Segment, StationIndex,
};
use seat_booking_postgres::PostgresBookingStore;
use seat_booking_service::{BookingService, Config};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Seat booking operator CLI
#[derive(Parser)]
#[command(name = "seat-booking")]
#[command(author, version, about = "Book and manage train seats", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,

    /// Book one or more seats for a trip, all or nothing
    ///
    /// Example: seat-booking book --journey 1 --from 1 --to 4 --seat 3:1:1 --seat 3:1:2
    ///          --class economy --fare 1500 --email rider@example.com
    Book {
        /// Journey to travel on
        #[arg(long)]
        journey: i64,

        /// Boarding station index
        #[arg(long)]
        from: u16,

        /// Alighting station index
        #[arg(long)]
        to: u16,

        /// Seat as car:row:column (repeatable)
        #[arg(long = "seat", required = true)]
        seats: Vec<LogicalSeat>,

        /// Cabin class of every requested seat
        #[arg(long)]
        class: SeatClass,

        /// Fare per seat in minor currency units
        #[arg(long)]
        fare: u64,

        /// Passenger email
        #[arg(long)]
        email: String,

        /// Expected journey direction (derived from the stations if omitted)
        #[arg(long)]
        direction: Option<Direction>,
    },

    /// Cancel a booking and release its seats
    Cancel {
        /// Booking to cancel
        booking_id: BookingId,
    },

    /// List bookings made with an email, with their tickets
    Bookings {
        /// Passenger email
        email: String,

        /// Page number, starting at 0
        #[arg(long, default_value = "0")]
        page: u32,
    },

    /// List every email with at least one booking
    Emails,

    /// List seats taken for any part of a trip
    Occupied {
        /// Journey to inspect
        #[arg(long)]
        journey: i64,

        /// Boarding station index
        #[arg(long)]
        from: u16,

        /// Alighting station index
        #[arg(long)]
        to: u16,

        /// Only seats of this class
        #[arg(long)]
        class: Option<SeatClass>,
    },
}

/// Why a booking did not go through, as printed for the operator.
#[derive(Serialize)]
struct Aborted {
    status: &'static str,
    reason: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seat: Option<LogicalSeat>,
    retryable: bool,
}

impl From<&BookingError> for Aborted {
    fn from(err: &BookingError) -> Self {
        Self {
            status: "aborted",
            reason: err.kind(),
            message: err.to_string(),
            seat: err.offending_seat(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Serialize)]
struct OccupiedSeat {
    car: u16,
    row: u16,
    column: u16,
    label: String,
}

impl From<LogicalSeat> for OccupiedSeat {
    fn from(seat: LogicalSeat) -> Self {
        Self {
            car: seat.car,
            row: seat.row,
            column: seat.column,
            label: seat.label(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,seat_booking=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();
    let config = Config::from_env().context("Invalid configuration")?;
    if config.metrics.enabled {
        tracing::warn!("METRICS_ENABLED is ignored by the CLI");
    }

    let store = PostgresBookingStore::connect(&config.database.url, &config.database.pool_settings())
        .await
        .context("Failed to connect to the booking database")?
        .with_strategy(config.booking.concurrency);
    tracing::info!(concurrency = %store.strategy(), "Booking store ready");

    if matches!(cli.command, Commands::Migrate) {
        store.migrate().await.context("Migration failed")?;
        print_json(&serde_json::json!({ "status": "migrated" }))?;
        return Ok(ExitCode::SUCCESS);
    }

    let service = BookingService::from_config(Arc::new(store) as Arc<dyn BookingStore>, &config.booking);
    run(&service, cli.command).await
}

async fn run(service: &BookingService, command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Migrate => {}
        Commands::Book {
            journey,
            from,
            to,
            seats,
            class,
            fare,
            email,
            direction,
        } => {
            let cost_per_seat = Money::from_minor(fare);
            let cost_total = u64::try_from(seats.len())
                .ok()
                .and_then(|n| cost_per_seat.checked_multiply(n))
                .context("Total fare overflows")?;
            let request = BookingRequest {
                journey_id: JourneyId::new(journey),
                direction,
                origin: StationIndex::new(from),
                destination: StationIndex::new(to),
                seats,
                class,
                cost_per_seat,
                cost_total,
                email,
            };

            match service.book(request).await {
                Ok(booking) => print_json(&booking)?,
                Err(err) => {
                    print_json(&Aborted::from(&err))?;
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Cancel { booking_id } => print_json(&service.cancel(booking_id).await?)?,
        Commands::Bookings { email, page } => {
            print_json(&service.bookings_for_email(&email, page).await?)?;
        }
        Commands::Emails => print_json(&service.booked_emails().await?)?,
        Commands::Occupied {
            journey,
            from,
            to,
            class,
        } => {
            let segment = Segment::new(StationIndex::new(from), StationIndex::new(to))
                .map_err(BookingError::from)?;
            let seats = service
                .occupied_seats(OccupancyQuery {
                    journey_id: JourneyId::new(journey),
                    segment,
                    class,
                })
                .await?;
            let seats: Vec<OccupiedSeat> = seats.into_iter().map(OccupiedSeat::from).collect();
            print_json(&seats)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
