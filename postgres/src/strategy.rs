//! How concurrent bookings of the same seat are kept apart.

use seat_booking_core::{JourneyId, SeatId, UnknownVariant};
use std::fmt;
use std::str::FromStr;

/// Concurrency discipline of a booking transaction.
///
/// Plain READ COMMITTED check-then-insert lets two overlapping bookings both
/// commit, so one of these is always in force.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConcurrencyStrategy {
    /// READ COMMITTED plus a transaction-scoped advisory lock per
    /// `(journey, seat)`. Losers wait for the winner and then see its ticket.
    #[default]
    AdvisoryLock,
    /// SERIALIZABLE isolation. Postgres aborts one of two conflicting
    /// transactions with a serialization failure, reported as transient.
    Serializable,
}

impl ConcurrencyStrategy {
    /// Name used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AdvisoryLock => "advisory-lock",
            Self::Serializable => "serializable",
        }
    }

    /// Statement to run first in every booking transaction, if any.
    #[must_use]
    pub const fn isolation_statement(&self) -> Option<&'static str> {
        match self {
            Self::AdvisoryLock => None,
            Self::Serializable => Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
        }
    }

    /// Whether seats are locked explicitly before the conflict check.
    #[must_use]
    pub const fn locks_seats(&self) -> bool {
        matches!(self, Self::AdvisoryLock)
    }
}

impl fmt::Display for ConcurrencyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConcurrencyStrategy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advisory-lock" | "advisory_lock" | "advisory" => Ok(Self::AdvisoryLock),
            "serializable" => Ok(Self::Serializable),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Key of the advisory lock guarding one seat on one journey.
///
/// Uses the two-`int4` form of `pg_advisory_xact_lock`, which lives in a key
/// space separate from single-`bigint` locks. Ids are folded to 32 bits; a
/// collision only makes two unrelated seats wait on each other.
#[must_use]
pub const fn advisory_key(journey_id: JourneyId, seat_id: SeatId) -> (i32, i32) {
    (fold(journey_id.value()), fold(seat_id.value()))
}

#[allow(clippy::cast_possible_truncation)]
const fn fold(id: i64) -> i32 {
    (id ^ (id >> 32)) as i32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy() {
        assert_eq!(
            "advisory-lock".parse::<ConcurrencyStrategy>().unwrap(),
            ConcurrencyStrategy::AdvisoryLock
        );
        assert_eq!(
            " Serializable ".parse::<ConcurrencyStrategy>().unwrap(),
            ConcurrencyStrategy::Serializable
        );
        assert!("read-committed".parse::<ConcurrencyStrategy>().is_err());
        assert_eq!(ConcurrencyStrategy::default().to_string(), "advisory-lock");
    }

    #[test]
    fn test_advisory_key_is_stable_and_distinguishes_seats() {
        let key = advisory_key(JourneyId::new(12), SeatId::new(345));
        assert_eq!(key, (12, 345));
        assert_eq!(key, advisory_key(JourneyId::new(12), SeatId::new(345)));
        assert_ne!(key, advisory_key(JourneyId::new(12), SeatId::new(346)));
    }

    #[test]
    fn test_large_ids_fold_high_bits() {
        let high = advisory_key(JourneyId::new(1 << 40), SeatId::new(1));
        assert_ne!(high.0, 0);
    }
}
