//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. Variants map 1:1 onto the command-level
//! failure kinds of the external interface. Validation and capacity errors
//! leave the queue untouched; timeout errors may have already terminated a
//! subprocess before being reported.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the script queue engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Resolved script path escapes its root, or does not exist.
    #[error("bad path: {0}")]
    BadPath(String),

    /// `location` is not FIRST/LAST/BEFORE/AFTER, or BEFORE/AFTER was given
    /// without a usable anchor.
    #[error("invalid location: {0}")]
    LocationInvalid(String),

    /// `stopScripts` was sent with a non-positive `length`.
    #[error("invalid length: {0}")]
    LengthInvalid(String),

    /// No script with the given index is present in pending, current, or history.
    #[error("unknown index: {0}")]
    UnknownIndex(i32),

    /// A `move` or `remove` targeted an index not currently in `pending`.
    #[error("not queued: {0}")]
    NotQueued(i32),

    /// The index allocator wrapped all the way around without finding a free slot.
    #[error("index allocator exhausted")]
    AllocExhausted,

    /// A script failed to reach LOADED/CONFIGURED within its load timeout.
    #[error("load timeout: {0}")]
    LoadTimeout(String),

    /// A bounded operation (e.g. stopScripts) did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The engine is disabled and the command is not `pause`.
    #[error("engine disabled")]
    Disabled,

    /// Internal errors: panics recovered at the command boundary, invariant
    /// violations, or anything else that isn't a caller mistake.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors (opaque config blobs, wire events).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors (subprocess spawn, path resolution).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn bad_path(msg: impl Into<String>) -> Self {
        Self::BadPath(msg.into())
    }

    pub fn location_invalid(msg: impl Into<String>) -> Self {
        Self::LocationInvalid(msg.into())
    }

    pub fn length_invalid(msg: impl Into<String>) -> Self {
        Self::LengthInvalid(msg.into())
    }

    pub fn unknown_index(index: i32) -> Self {
        Self::UnknownIndex(index)
    }

    pub fn not_queued(index: i32) -> Self {
        Self::NotQueued(index)
    }

    pub fn load_timeout(msg: impl Into<String>) -> Self {
        Self::LoadTimeout(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
