//! ems - concurrent event seat reservation server
//!
//! Clients talk to the server over named pipes using a fixed-width binary
//! protocol. A bounded dispatch queue hands new sessions to a fixed pool of
//! worker threads, each serving one client at a time against a shared
//! in-memory event store.

pub mod dispatch;
pub mod error;
pub mod ipc;
pub mod render;
pub mod script;
pub mod shutdown;
pub mod store;

pub use error::{EmsError, Result};
