//! Error types for pixcache

use std::fmt;

/// Result type alias for pixcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up a cache or loader
#[derive(Debug)]
pub enum Error {
    /// Cache limits rejected
    InvalidConfig(String),

    /// Performance monitor failed to start
    Monitor(pixmon::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "Invalid cache config: {}", msg),
            Error::Monitor(e) => write!(f, "Monitor error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Monitor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<pixmon::Error> for Error {
    fn from(err: pixmon::Error) -> Self {
        Error::Monitor(err)
    }
}
