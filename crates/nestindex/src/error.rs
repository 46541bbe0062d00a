//! Error types for nestindex

use std::fmt;

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for slot-store operations
///
/// Missing keys, unwritten slots, and empty caches are in-band values,
/// not errors; only storage I/O can fail.
#[derive(Debug)]
pub enum Error {
    /// Reading a storage slot failed
    StorageGet(String),

    /// Writing a storage slot failed
    StorageSet(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StorageGet(msg) => write!(f, "Storage read failed: {}", msg),
            Error::StorageSet(msg) => write!(f, "Storage write failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
