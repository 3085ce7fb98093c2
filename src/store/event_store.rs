//! EventStore: insertion-ordered collection of events.
//!
//! The store-wide `RwLock` only protects the collection itself. Lookups take
//! it shared, clone the event's `Arc` and release it before touching the
//! event's own guard, so the lock order is always structure → event and
//! operations on different events never contend.

use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::error::{EmsError, Result};
use crate::store::event::{DEFAULT_MAX_EVENT_SEATS, Event, EventSnapshot, Seat};

/// Concurrent, append-only event store.
#[derive(Debug)]
pub struct EventStore {
    events: RwLock<Vec<Arc<Event>>>,
    /// Simulated latency applied to every lookup
    access_delay: Duration,
    /// Largest grid a single CREATE may allocate
    max_event_seats: usize,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    /// Create an empty store with no access delay.
    pub fn new() -> Self {
        Self::with_access_delay(Duration::ZERO)
    }

    /// Create an empty store that sleeps `access_delay` on every lookup.
    pub fn with_access_delay(access_delay: Duration) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            access_delay,
            max_event_seats: DEFAULT_MAX_EVENT_SEATS,
        }
    }

    /// Cap the number of seats a single event may hold.
    pub fn with_max_event_seats(mut self, max: usize) -> Self {
        self.max_event_seats = max;
        self
    }

    pub fn access_delay(&self) -> Duration {
        self.access_delay
    }

    pub fn max_event_seats(&self) -> usize {
        self.max_event_seats
    }

    fn find(&self, events: &[Arc<Event>], id: u32) -> Option<Arc<Event>> {
        if !self.access_delay.is_zero() {
            thread::sleep(self.access_delay);
        }
        events.iter().find(|e| e.id() == id).cloned()
    }

    fn lookup(&self, id: u32) -> Result<Arc<Event>> {
        let events = self
            .events
            .read()
            .map_err(|e| EmsError::LockPoisoned(format!("event store: {}", e)))?;
        self.find(&events, id).ok_or(EmsError::EventNotFound(id))
    }

    /// Create an event with a zeroed `rows x cols` grid.
    ///
    /// Fails if `id` is already present, the grid exceeds the per-event seat
    /// cap or cannot be allocated; the store is unchanged on failure.
    pub fn create(&self, id: u32, rows: usize, cols: usize) -> Result<()> {
        let mut events = self
            .events
            .write()
            .map_err(|e| EmsError::LockPoisoned(format!("event store: {}", e)))?;

        if self.find(&events, id).is_some() {
            return Err(EmsError::EventExists(id));
        }

        let event = Event::bounded(id, rows, cols, self.max_event_seats)?;
        events
            .try_reserve(1)
            .map_err(|e| EmsError::Allocation(format!("event list: {}", e)))?;
        events.push(Arc::new(event));

        debug!("Created event {} ({}x{})", id, rows, cols);
        Ok(())
    }

    /// Reserve all `seats` of event `id` atomically, returning the
    /// reservation id stamped into them.
    pub fn reserve(&self, id: u32, seats: &[Seat]) -> Result<u32> {
        let event = self.lookup(id)?;
        let reservation_id = event.reserve(seats)?;
        debug!(
            "Reserved {} seat(s) on event {} as reservation {}",
            seats.len(),
            id,
            reservation_id
        );
        Ok(reservation_id)
    }

    /// Snapshot of event `id`'s dimensions and grid.
    pub fn show(&self, id: u32) -> Result<EventSnapshot> {
        self.lookup(id)?.snapshot()
    }

    /// All event ids in insertion order.
    pub fn list(&self) -> Result<Vec<u32>> {
        let events = self
            .events
            .read()
            .map_err(|e| EmsError::LockPoisoned(format!("event store: {}", e)))?;
        Ok(events.iter().map(|e| e.id()).collect())
    }

    /// Snapshot of every event in insertion order.
    ///
    /// Holds the structural guard for the whole walk, so no event created
    /// concurrently appears half-way through.
    pub fn dump(&self) -> Result<Vec<EventSnapshot>> {
        let events = self
            .events
            .read()
            .map_err(|e| EmsError::LockPoisoned(format!("event store: {}", e)))?;
        events.iter().map(|e| e.snapshot()).collect()
    }

    pub fn len(&self) -> Result<usize> {
        let events = self
            .events
            .read()
            .map_err(|e| EmsError::LockPoisoned(format!("event store: {}", e)))?;
        Ok(events.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
