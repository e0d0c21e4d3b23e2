//! Sample rolling stock and journeys.
//!
//! The standard layout mirrors the sample data the booking system ships with:
//! one First car, one Business car and three Economy cars per train.

use seat_booking_core::{Direction, Journey, JourneyId, LogicalSeat, SeatClass, TrainId};

/// Stations of the sample line, indexed from 1.
pub const STATIONS: [&str; 6] = [
    "Tokyo",
    "Shin-Yokohama",
    "Toyohashi",
    "Nagoya",
    "Kyoto",
    "Shin-Osaka",
];

/// One car of a train.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CarLayout {
    /// Car number within the train, from 1
    pub car: u16,
    /// Class of every seat in the car
    pub class: SeatClass,
    /// Rows per car
    pub rows: u16,
    /// Seats per row
    pub columns: u16,
}

impl CarLayout {
    /// Seats in the car.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.rows as u64 * self.columns as u64
    }
}

/// A seat of the layout together with its class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FleetSeat {
    /// Seat position
    pub seat: LogicalSeat,
    /// Class of its car
    pub class: SeatClass,
}

/// Seat picked by [`FleetLayout::seat_from_index`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeatSlot {
    /// How many times the index wrapped around the layout
    pub round: u64,
    /// The seat within one train
    pub seat: FleetSeat,
}

/// Car layout shared by every train of a fleet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FleetLayout {
    cars: Vec<CarLayout>,
}

impl FleetLayout {
    /// Creates a layout from cars listed in car order.
    #[must_use]
    pub const fn new(cars: Vec<CarLayout>) -> Self {
        Self { cars }
    }

    /// Car 1 First (8x2), car 2 Business (16x4), cars 3 to 5 Economy (16x5).
    #[must_use]
    pub fn standard() -> Self {
        let mut cars = vec![
            CarLayout {
                car: 1,
                class: SeatClass::First,
                rows: 8,
                columns: 2,
            },
            CarLayout {
                car: 2,
                class: SeatClass::Business,
                rows: 16,
                columns: 4,
            },
        ];
        cars.extend((3..=5).map(|car| CarLayout {
            car,
            class: SeatClass::Economy,
            rows: 16,
            columns: 5,
        }));
        Self::new(cars)
    }

    /// Cars in car order.
    #[must_use]
    pub fn cars(&self) -> &[CarLayout] {
        &self.cars
    }

    /// Seats per train.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.cars.iter().map(CarLayout::capacity).sum()
    }

    /// Every seat, car by car and row by row.
    pub fn seats(&self) -> impl Iterator<Item = FleetSeat> + '_ {
        self.cars.iter().flat_map(|car| {
            (1..=car.rows).flat_map(move |row| {
                (1..=car.columns).map(move |column| FleetSeat {
                    seat: LogicalSeat::new(car.car, row, column),
                    class: car.class,
                })
            })
        })
    }

    /// Maps a running counter to a distinct seat.
    ///
    /// Consecutive indices walk the seats in [`seats`](Self::seats) order; once
    /// every seat was handed out the walk starts over with `round` incremented, so
    /// load generators can move to the next train or journey. An empty layout
    /// yields `None`.
    #[must_use]
    pub fn seat_from_index(&self, index: u64) -> Option<SeatSlot> {
        let capacity = self.capacity();
        if capacity == 0 {
            return None;
        }

        let round = index / capacity;
        let mut offset = index % capacity;
        for car in &self.cars {
            let car_capacity = car.capacity();
            if offset < car_capacity {
                let columns = u64::from(car.columns);
                let row = u16::try_from(offset / columns + 1).ok()?;
                let column = u16::try_from(offset % columns + 1).ok()?;
                return Some(SeatSlot {
                    round,
                    seat: FleetSeat {
                        seat: LogicalSeat::new(car.car, row, column),
                        class: car.class,
                    },
                });
            }
            offset -= car_capacity;
        }
        None
    }
}

/// A journey over the whole sample line.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn sample_journey(id: i64, train_id: TrainId, direction: Direction) -> Journey {
    Journey {
        id: JourneyId::new(id),
        train_id,
        direction,
        station_count: STATIONS.len() as u16,
    }
}
