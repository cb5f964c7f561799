//! Error types for pixmon

use std::fmt;
use std::io;

/// Result type alias for pixmon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by monitor setup and maintenance calls.
///
/// Timed operations never observe these: write failures on the
/// measurement path are swallowed by the log writer.
#[derive(Debug)]
pub enum Error {
    /// I/O error while preparing the log location
    Io(io::Error),

    /// Log queue is full
    QueueFull,

    /// Log writer has shut down
    Closed,

    /// Monitor configuration rejected
    InvalidConfig(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::QueueFull => write!(f, "Log queue is full"),
            Error::Closed => write!(f, "Log writer is closed"),
            Error::InvalidConfig(msg) => write!(f, "Invalid monitor config: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
