use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Which zone of the shared region ran out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// The fixed-size area holding the serialized index.
    Header,
    /// The area holding raw value bytes.
    Data,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Header => f.write_str("header"),
            Zone::Data => f.write_str("data"),
        }
    }
}

/// Errors surfaced by the shared cache.
///
/// Every public operation converts its faults into one of these variants;
/// nothing escapes as a panic.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The key has no live entry.
    #[error("key not found: {key:?}")]
    NotFound { key: String },

    /// A write would not fit into its zone.
    #[error("{zone} zone capacity exceeded: {required} bytes required, {available} available")]
    CapacityExceeded {
        zone: Zone,
        required: u64,
        available: u64,
    },

    /// Raw I/O failure without further context.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// I/O failure with a description of what was being attempted.
    #[error("I/O failure while trying to {context} ({path}): {source}")]
    IoAt {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cross-process lock could not be acquired.
    #[error("failed to acquire cache lock {path} after {waited:?}: {reason}")]
    LockFailure {
        path: PathBuf,
        waited: Duration,
        reason: String,
    },

    /// A mutating operation was attempted on a read-only mapping.
    #[error("cache is opened read-only")]
    ReadOnly,

    /// A region access fell outside the mapped capacity.
    #[error("range {offset}..{offset}+{len} is outside the mapped capacity of {capacity} bytes")]
    OutOfBounds { offset: u64, len: u64, capacity: u64 },

    /// The header zone does not contain a valid index.
    #[error("corrupt index header: {0}")]
    CorruptIndex(String),

    /// The supplied configuration cannot be used.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// The region was closed.
    #[error("shared region is closed")]
    Closed,

    /// An async wrapper task failed before producing a result.
    #[error("background task failed: {0}")]
    BackgroundTask(String),
}

impl CacheError {
    pub(crate) fn io_at(
        context: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        CacheError::IoAt {
            context,
            path: path.into(),
            source,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }

    #[inline]
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, CacheError::CapacityExceeded { .. })
    }

    #[inline]
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, CacheError::LockFailure { .. })
    }

    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(self, CacheError::Io(_) | CacheError::IoAt { .. })
    }
}

/// Result alias used throughout the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
