//! In-memory event store for the reservation server.
//!
//! Two levels of locking:
//! - **Structural guard**: an `RwLock` over the ordered event list (create,
//!   list and lookup)
//! - **Event guard**: a `Mutex` per event over its seat grid (reserve, show)
//!
//! # Example
//!
//! ```
//! use ems::store::{EventStore, Seat};
//!
//! let store = EventStore::new();
//! store.create(1, 2, 2)?;
//! store.reserve(1, &[Seat::new(1, 1)])?;
//!
//! let snap = store.show(1)?;
//! assert_eq!(snap.seats, vec![1, 0, 0, 0]);
//! # Ok::<(), ems::EmsError>(())
//! ```

mod event;
mod event_store;

pub use event::{DEFAULT_MAX_EVENT_SEATS, Event, EventSnapshot, Seat};
pub use event_store::EventStore;
