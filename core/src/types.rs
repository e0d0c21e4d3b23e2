//! Domain types for the seat booking core.
//!
//! Identifiers mirror the primary keys of the OLTP schema: trains, journeys, seats
//! and tickets use database sequences, bookings use UUIDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! serial_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw database key.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// The raw database key.
            #[must_use]
            pub const fn value(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

serial_id!(
    /// Identifier of a physical train set.
    TrainId
);
serial_id!(
    /// Identifier of one scheduled run of a train.
    JourneyId
);
serial_id!(
    /// Identifier of a physical seat.
    SeatId
);
serial_id!(
    /// Identifier of an issued ticket.
    TicketId
);

/// Unique identifier for a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BookingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Stations and direction
// ============================================================================

/// Position of a station along the line, counted from 1 at the western terminus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationIndex(u16);

impl StationIndex {
    /// Creates a new `StationIndex`
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the raw index
    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for StationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of travel along the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards lower station indices.
    Eastbound,
    /// Towards higher station indices.
    Westbound,
}

impl Direction {
    /// Direction of a trip from `from` to `to`.
    ///
    /// A decreasing index is eastbound, anything else westbound. Callers reject
    /// `from == to` before relying on the result.
    #[must_use]
    pub fn between(from: StationIndex, to: StationIndex) -> Self {
        if from > to {
            Self::Eastbound
        } else {
            Self::Westbound
        }
    }

    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eastbound => "eastbound",
            Self::Westbound => "westbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eastbound" => Ok(Self::Eastbound),
            "westbound" => Ok(Self::Westbound),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

// ============================================================================
// Seats
// ============================================================================

/// Travel class of a car.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatClass {
    /// First class
    First,
    /// Business class
    Business,
    /// Economy class
    Economy,
}

impl SeatClass {
    /// All classes, from the front of the train backwards.
    pub const ALL: [Self; 3] = [Self::First, Self::Business, Self::Economy];

    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::First => "First",
            Self::Business => "Business",
            Self::Economy => "Economy",
        }
    }
}

impl fmt::Display for SeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatClass {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "business" => Ok(Self::Business),
            "economy" => Ok(Self::Economy),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// A string did not name any variant of an enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownVariant(pub String);

/// A seat as a passenger names it: car, row and column on a given train.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalSeat {
    /// Car number, counted from 1
    pub car: u16,
    /// Row within the car, counted from 1
    pub row: u16,
    /// Column within the row, counted from 1 (A = 1)
    pub column: u16,
}

impl LogicalSeat {
    /// Creates a new `LogicalSeat`
    #[must_use]
    pub const fn new(car: u16, row: u16, column: u16) -> Self {
        Self { car, row, column }
    }

    /// Passenger-facing label such as `3 - A1`.
    #[must_use]
    pub fn label(&self) -> String {
        let letter = u8::try_from(self.column)
            .ok()
            .and_then(|c| c.checked_add(b'A' - 1))
            .filter(u8::is_ascii_uppercase)
            .map_or('?', char::from);
        format!("{} - {letter}{}", self.car, self.row)
    }
}

impl fmt::Display for LogicalSeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "car {} row {} col {}", self.car, self.row, self.column)
    }
}

/// Error parsing a `car:row:column` seat reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected seat as car:row:column, got {0:?}")]
pub struct ParseSeatError(String);

impl FromStr for LogicalSeat {
    type Err = ParseSeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u16> = s
            .split(':')
            .map(|part| part.trim().parse::<u16>())
            .collect::<Result<_, _>>()
            .map_err(|_| ParseSeatError(s.to_string()))?;

        match parts.as_slice() {
            [car, row, column] if *car > 0 && *row > 0 && *column > 0 => {
                Ok(Self::new(*car, *row, *column))
            }
            _ => Err(ParseSeatError(s.to_string())),
        }
    }
}

/// A physical seat matched by the seat resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalSeat {
    /// Database identifier
    pub id: SeatId,
    /// Class of the car the seat belongs to
    pub class: SeatClass,
}

// ============================================================================
// Journeys
// ============================================================================

/// One scheduled run of a train, as far as the booking core needs to know it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journey {
    /// Journey identifier
    pub id: JourneyId,
    /// Train operating the journey
    pub train_id: TrainId,
    /// Direction of travel
    pub direction: Direction,
    /// Number of stations on the line; valid indices are `1..=station_count`
    pub station_count: u16,
}

// ============================================================================
// Money Value Object
// ============================================================================

/// An amount in minor currency units (whole yen for the original fare tables).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(amount: u64) -> Self {
        Self(amount)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u64) -> Option<Self> {
        match self.0.checked_mul(quantity) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
