//! Error types for the link layer.
//!
//! Every failure in this crate is local and non-fatal: task loops and item
//! entry points turn these into log events and [`LinkStats`](crate::stats::LinkStats)
//! counters instead of aborting.

use thiserror::Error;

/// Why an inbound line was rejected by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Line is not a JSON object of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// One of the mandatory tags (`N`, `C`, `T`, `D`, `B`, `S`) is absent.
    #[error("missing tag '{0}'")]
    MissingTag(&'static str),

    /// `T` names a type this firmware does not know.
    #[error("unknown type tag '{0}'")]
    UnknownType(String),

    /// Count, declared byte total and decoded payload disagree.
    #[error("length mismatch: count={count} declared={declared} actual={actual}")]
    LengthMismatch {
        count: usize,
        declared: usize,
        actual: usize,
    },

    /// A `D` entry is not valid hex of the element width.
    #[error("invalid hex in element {index}")]
    InvalidHex { index: usize },

    /// Recomputed sum of payload bytes differs from `S`.
    #[error("checksum mismatch: declared={declared} computed={computed}")]
    ChecksumMismatch { declared: u64, computed: u64 },
}

/// Why an outbound message could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Payload length is not `count * element size`.
    #[error("payload of {actual} bytes does not hold {count} elements of {size} bytes")]
    PayloadSize {
        count: usize,
        size: usize,
        actual: usize,
    },

    /// Arity zero is not representable on the wire.
    #[error("element count must be at least 1")]
    EmptyPayload,

    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Outbound queue at capacity; the message was dropped.
    #[error("outbound queue full")]
    QueueFull,

    /// Encoded line exceeds the configured maximum message length.
    #[error("message of {len} bytes exceeds limit of {max}")]
    MessageTooLong { len: usize, max: usize },

    /// Another item already answers to this name.
    #[error("item '{0}' already registered")]
    AlreadyRegistered(String),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Underlying byte stream failed.
    #[error("stream I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// Backend reported fewer bytes written than requested.
    #[error("short write for '{key}': wrote {written} of {expected} bytes")]
    ShortWrite {
        key: String,
        written: usize,
        expected: usize,
    },

    /// Backend refused the operation outright.
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Inconsistent item configuration caught at build time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("item name must not be empty")]
    EmptyName,

    /// Periodic transmission or persistence was requested without a timer service.
    #[error("item '{item}' needs a timer service for {purpose}")]
    MissingTimers { item: String, purpose: &'static str },
}
