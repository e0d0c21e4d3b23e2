//! Mapping a passenger's seat reference to a physical seat.

use crate::error::{BookingError, RequestError};
use crate::types::{LogicalSeat, PhysicalSeat, SeatClass, TrainId};

/// Reduces the seats matching `(train, car, row, column)` to exactly one.
///
/// Car, row and column are unique per train, so more than one match means the
/// inventory itself is corrupt. That case is logged at error level before it is
/// returned, separately from ordinary booking failures.
///
/// # Errors
///
/// - [`BookingError::SeatNotFound`] when nothing matches
/// - [`BookingError::InvariantViolation`] when several seats match
pub fn resolve_unique(
    train_id: TrainId,
    seat: LogicalSeat,
    matches: &[PhysicalSeat],
) -> Result<PhysicalSeat, BookingError> {
    match matches {
        [] => Err(BookingError::SeatNotFound { train_id, seat }),
        [only] => Ok(*only),
        many => {
            let ids: Vec<i64> = many.iter().map(|m| m.id.value()).collect();
            tracing::error!(
                train_id = train_id.value(),
                car = seat.car,
                row = seat.row,
                column = seat.column,
                seat_ids = ?ids,
                "Seat inventory contains duplicate seats"
            );
            Err(BookingError::InvariantViolation(format!(
                "{} physical seats match {seat} on train {train_id}",
                many.len()
            )))
        }
    }
}

/// Resolves a seat and checks it belongs to the class the fare was quoted for.
///
/// # Errors
///
/// Everything [`resolve_unique`] returns, plus
/// [`RequestError::SeatClassMismatch`] when the seat's car is of another class.
pub fn resolve_seat(
    train_id: TrainId,
    seat: LogicalSeat,
    requested_class: SeatClass,
    matches: &[PhysicalSeat],
) -> Result<PhysicalSeat, BookingError> {
    let physical = resolve_unique(train_id, seat, matches)?;
    if physical.class != requested_class {
        return Err(RequestError::SeatClassMismatch {
            seat,
            requested: requested_class,
            actual: physical.class,
        }
        .into());
    }
    Ok(physical)
}
