//! A single reservable event: a fixed-size seat grid behind its own guard.

use std::process;
use std::sync::Mutex;

use log::error;

use crate::error::{EmsError, Result};

/// Default cap on the number of seats in one event.
pub const DEFAULT_MAX_EVENT_SEATS: usize = 1 << 20;

/// 1-based seat coordinate as it arrives from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seat {
    pub row: usize,
    pub col: usize,
}

impl Seat {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Point-in-time copy of an event's grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSnapshot {
    pub id: u32,
    pub rows: usize,
    pub cols: usize,
    /// Row-major reservation markers, 0 = free
    pub seats: Vec<u32>,
}

impl EventSnapshot {
    /// Marker at a 1-based coordinate, `None` when out of bounds.
    pub fn seat(&self, row: usize, col: usize) -> Option<u32> {
        if row == 0 || col == 0 || row > self.rows || col > self.cols {
            return None;
        }
        self.seats.get((row - 1) * self.cols + (col - 1)).copied()
    }

    /// Number of seats carrying a reservation.
    pub fn reserved_count(&self) -> usize {
        self.seats.iter().filter(|&&s| s != 0).count()
    }
}

/// Mutable part of an event, only touched under the event guard.
#[derive(Debug)]
struct SeatGrid {
    seats: Vec<u32>,
    reservations: u32,
}

impl SeatGrid {
    fn fits(&self, rows: usize, cols: usize) -> bool {
        rows.checked_mul(cols) == Some(self.seats.len())
    }
}

/// An event with a dedicated guard so reservations on different events
/// never contend.
#[derive(Debug)]
pub struct Event {
    id: u32,
    rows: usize,
    cols: usize,
    grid: Mutex<SeatGrid>,
}

impl Event {
    /// Allocate a zeroed grid of `rows * cols` seats, capped at
    /// `DEFAULT_MAX_EVENT_SEATS`.
    pub fn new(id: u32, rows: usize, cols: usize) -> Result<Self> {
        Self::bounded(id, rows, cols, DEFAULT_MAX_EVENT_SEATS)
    }

    /// Allocate a zeroed grid of `rows * cols` seats.
    ///
    /// Fails on zero dimensions, on size overflow, above `max_seats`, or when
    /// the allocator refuses the request. Nothing is retained on failure.
    pub fn bounded(id: u32, rows: usize, cols: usize, max_seats: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(EmsError::InvalidDimensions { rows, cols });
        }

        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| EmsError::Allocation(format!("grid {}x{} overflows", rows, cols)))?;
        if len > max_seats {
            return Err(EmsError::Allocation(format!(
                "grid {}x{} exceeds {} seats per event",
                rows, cols, max_seats
            )));
        }

        let mut seats = Vec::new();
        seats
            .try_reserve_exact(len)
            .map_err(|e| EmsError::Allocation(format!("grid {}x{}: {}", rows, cols, e)))?;
        seats.resize(len, 0);

        Ok(Self {
            id,
            rows,
            cols,
            grid: Mutex::new(SeatGrid {
                seats,
                reservations: 0,
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Abort the process if the grid no longer matches the event's
    /// dimensions.
    fn ensure_consistent(&self, grid: &SeatGrid) {
        if !grid.fits(self.rows, self.cols) {
            error!(
                "event {} grid holds {} seats but is {}x{}, aborting",
                self.id,
                grid.seats.len(),
                self.rows,
                self.cols
            );
            process::abort();
        }
    }

    /// Linear index of a 1-based coordinate, `None` when out of bounds.
    pub fn seat_index(&self, seat: Seat) -> Option<usize> {
        if seat.row == 0 || seat.col == 0 || seat.row > self.rows || seat.col > self.cols {
            return None;
        }
        Some((seat.row - 1) * self.cols + (seat.col - 1))
    }

    /// Reserve every seat in `seats` or none of them.
    ///
    /// All coordinates are validated against bounds and occupancy before
    /// anything is written. On success the reservation counter advances once
    /// and its new value is stamped into each seat; that value is returned.
    pub fn reserve(&self, seats: &[Seat]) -> Result<u32> {
        if seats.is_empty() {
            return Err(EmsError::EmptyReservation);
        }

        let mut grid = self
            .grid
            .lock()
            .map_err(|e| EmsError::LockPoisoned(format!("event {}: {}", self.id, e)))?;
        self.ensure_consistent(&grid);

        let mut indices = Vec::with_capacity(seats.len());
        for &seat in seats {
            let idx = self.seat_index(seat).ok_or(EmsError::SeatOutOfBounds {
                row: seat.row,
                col: seat.col,
            })?;
            if grid.seats[idx] != 0 {
                return Err(EmsError::SeatTaken {
                    row: seat.row,
                    col: seat.col,
                });
            }
            indices.push(idx);
        }

        let reservation_id = grid
            .reservations
            .checked_add(1)
            .ok_or_else(|| EmsError::Allocation(format!("event {}: reservation ids exhausted", self.id)))?;
        grid.reservations = reservation_id;

        for idx in indices {
            grid.seats[idx] = reservation_id;
        }

        Ok(reservation_id)
    }

    /// Consistent copy of the grid taken under the event guard.
    pub fn snapshot(&self) -> Result<EventSnapshot> {
        let grid = self
            .grid
            .lock()
            .map_err(|e| EmsError::LockPoisoned(format!("event {}: {}", self.id, e)))?;
        self.ensure_consistent(&grid);

        Ok(EventSnapshot {
            id: self.id,
            rows: self.rows,
            cols: self.cols,
            seats: grid.seats.clone(),
        })
    }

    /// Current value of the reservation counter.
    pub fn reservation_count(&self) -> Result<u32> {
        let grid = self
            .grid
            .lock()
            .map_err(|e| EmsError::LockPoisoned(format!("event {}: {}", self.id, e)))?;
        Ok(grid.reservations)
    }
}
