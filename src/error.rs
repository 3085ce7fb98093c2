//! Error types for the event management system.
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in the reservation engine and its IPC layer
#[derive(Debug, Error)]
pub enum EmsError {
    /// An event with this id was already created
    #[error("Event already exists: {0}")]
    EventExists(u32),

    /// No event with this id in the store
    #[error("Event not found: {0}")]
    EventNotFound(u32),

    /// Rows or columns are zero
    #[error("Invalid dimensions: {rows}x{cols}")]
    InvalidDimensions { rows: usize, cols: usize },

    /// Requested seat lies outside the event's grid
    #[error("Seat out of bounds: ({row}, {col})")]
    SeatOutOfBounds { row: usize, col: usize },

    /// Requested seat already carries a reservation id
    #[error("Seat already reserved: ({row}, {col})")]
    SeatTaken { row: usize, col: usize },

    /// Reservation request listed no seats
    #[error("Reservation contains no seats")]
    EmptyReservation,

    /// Seat grid could not be allocated
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// A guard was poisoned by a panicking holder
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Dispatch queue was closed while waiting
    #[error("Dispatch queue closed")]
    QueueClosed,

    /// Malformed or unexpected message on the wire
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Endpoint open/read/write failure or peer closed mid-message
    #[error("Transport error: {0}")]
    Transport(String),

    /// Endpoint name too long or not representable
    #[error("Invalid endpoint name: {0}")]
    EndpointName(String),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// Job script path does not name a `.jobs` file
    #[error("The provided .jobs file path is not valid. Path: {}", .0.display())]
    ScriptPath(std::path::PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmsError {
    /// Domain failures are answered with a non-zero result code and never
    /// terminate the session.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            EmsError::EventExists(_)
                | EmsError::EventNotFound(_)
                | EmsError::InvalidDimensions { .. }
                | EmsError::SeatOutOfBounds { .. }
                | EmsError::SeatTaken { .. }
                | EmsError::EmptyReservation
                | EmsError::Allocation(_)
        )
    }

    /// Transport failures abort the current session only.
    pub fn is_transport(&self) -> bool {
        matches!(self, EmsError::Transport(_) | EmsError::Io(_))
    }
}

/// Result type alias for reservation engine operations
pub type Result<T> = std::result::Result<T, EmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_exists_error() {
        let err = EmsError::EventExists(7);
        assert_eq!(err.to_string(), "Event already exists: 7");
    }

    #[test]
    fn test_event_not_found_error() {
        let err = EmsError::EventNotFound(3);
        assert_eq!(err.to_string(), "Event not found: 3");
    }

    #[test]
    fn test_seat_errors() {
        let err = EmsError::SeatOutOfBounds { row: 4, col: 1 };
        assert_eq!(err.to_string(), "Seat out of bounds: (4, 1)");

        let err = EmsError::SeatTaken { row: 1, col: 2 };
        assert_eq!(err.to_string(), "Seat already reserved: (1, 2)");
    }

    #[test]
    fn test_invalid_dimensions_error() {
        let err = EmsError::InvalidDimensions { rows: 0, cols: 5 };
        assert_eq!(err.to_string(), "Invalid dimensions: 0x5");
    }

    #[test]
    fn test_script_path_error() {
        let err = EmsError::ScriptPath("jobs/a.txt".into());
        assert_eq!(err.to_string(), "The provided .jobs file path is not valid. Path: jobs/a.txt");
    }

    #[test]
    fn test_domain_classification() {
        assert!(EmsError::EventExists(1).is_domain());
        assert!(EmsError::EventNotFound(1).is_domain());
        assert!(EmsError::EmptyReservation.is_domain());
        assert!(EmsError::Allocation("oom".into()).is_domain());
        assert!(!EmsError::Transport("closed".into()).is_domain());
        assert!(!EmsError::Protocol("bad opcode".into()).is_domain());
        assert!(!EmsError::LockPoisoned("store".into()).is_domain());
    }

    #[test]
    fn test_transport_classification() {
        assert!(EmsError::Transport("peer closed".into()).is_transport());
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        assert!(EmsError::from(io_err).is_transport());
        assert!(!EmsError::QueueClosed.is_transport());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EmsError = io_err.into();
        assert!(matches!(err, EmsError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(EmsError::QueueClosed)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
