//! Mapping `sqlx` errors and column values onto [`BookingError`].

use seat_booking_core::{BookingError, Money, RequestError, StationIndex};

/// SQLSTATE `serialization_failure`.
pub const SERIALIZATION_FAILURE: &str = "40001";

/// SQLSTATE `deadlock_detected`.
pub const DEADLOCK_DETECTED: &str = "40P01";

/// Classifies a database error raised while doing `context`.
///
/// Conflicts Postgres resolves by aborting one transaction (serialization
/// failures, deadlocks) are transient, as are pool and I/O failures. Rows that
/// cannot be decoded mean the stored data is broken.
pub fn classify(context: &str, error: sqlx::Error) -> BookingError {
    match &error {
        sqlx::Error::Database(db) => {
            let code = db.code();
            match code.as_deref() {
                Some(code @ (SERIALIZATION_FAILURE | DEADLOCK_DETECTED)) => {
                    metrics::counter!("booking_serialization_failures_total", "sqlstate" => code.to_string())
                        .increment(1);
                    tracing::debug!(sqlstate = code, context, "Transaction aborted by the database");
                    BookingError::transient(format!("{context}: {error}"))
                }
                _ => {
                    tracing::warn!(error = %error, context, "Database error");
                    BookingError::transient(format!("{context}: {error}"))
                }
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            tracing::error!(error = %error, context, "Stored row cannot be decoded");
            BookingError::InvariantViolation(format!("{context}: {error}"))
        }
        _ => BookingError::transient(format!("{context}: {error}")),
    }
}

/// Whether the error is one Postgres raises to resolve a write conflict.
#[must_use]
pub fn is_conflict_abort(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED)
}

pub(crate) fn station_to_db(station: StationIndex) -> Result<i16, BookingError> {
    i16::try_from(station.value()).map_err(|_| {
        RequestError::StationOutOfRange {
            station,
            station_count: None,
        }
        .into()
    })
}

pub(crate) fn station_from_db(value: i16) -> Result<StationIndex, BookingError> {
    u16::try_from(value)
        .map(StationIndex::new)
        .map_err(|_| BookingError::InvariantViolation(format!("negative station index {value}")))
}

pub(crate) fn position_from_db(what: &str, value: i16) -> Result<u16, BookingError> {
    u16::try_from(value)
        .map_err(|_| BookingError::InvariantViolation(format!("negative {what} {value}")))
}

/// Seat positions beyond the column range cannot exist in the table.
pub(crate) fn position_to_db(value: u16) -> Option<i16> {
    i16::try_from(value).ok()
}

pub(crate) fn money_to_db(money: Money) -> Result<i64, BookingError> {
    i64::try_from(money.minor()).map_err(|_| RequestError::CostOverflow.into())
}

pub(crate) fn money_from_db(value: i64) -> Result<Money, BookingError> {
    u64::try_from(value)
        .map(Money::from_minor)
        .map_err(|_| BookingError::InvariantViolation(format!("negative amount {value}")))
}

pub(crate) fn corrupt(what: impl std::fmt::Display) -> BookingError {
    let message = what.to_string();
    tracing::error!(detail = %message, "Stored data violates the booking model");
    BookingError::InvariantViolation(message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_transient() {
        let err = classify("load journey", sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("load journey"));
    }

    #[test]
    fn test_decode_errors_are_invariant_violations() {
        let err = classify("find seats", sqlx::Error::ColumnNotFound("class".to_string()));
        assert!(matches!(err, BookingError::InvariantViolation(_)));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(station_to_db(StationIndex::new(6)).unwrap(), 6);
        assert!(station_from_db(-1).is_err());
        assert_eq!(money_from_db(1500).unwrap(), Money::from_minor(1500));
        assert!(matches!(
            money_to_db(Money::from_minor(u64::MAX)),
            Err(BookingError::InvalidRequest(RequestError::CostOverflow))
        ));
        assert!(!is_conflict_abort(&sqlx::Error::PoolClosed));
    }
}
