//! Core error type for APDU operations
//!
//! All APDU-level error variants are consolidated here so higher layers can
//! bubble them up through a single type.

use crate::StatusWord;

/// Core error type for APDU command construction, parsing and exchange
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The device returned a non-success status word
    #[error("invalid status {status} ({cause})")]
    Status {
        /// Status word that caused the error
        status: StatusWord,
        /// Probable cause, from the static status table
        cause: &'static str,
    },

    /// Command could not be serialized or parsed
    #[error("invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// Response shorter than a status word
    #[error("truncated response: {actual} bytes")]
    TruncatedResponse {
        /// Number of bytes actually received
        actual: usize,
    },

    /// Transport-level failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Create a status error for the given status word, looking up its cause
    pub const fn status(status: StatusWord) -> Self {
        Self::Status {
            status,
            cause: status.cause(),
        }
    }
}

/// Errors raised by concrete transports
///
/// Framing errors are fatal to the transport session: the chunk stream is no
/// longer synchronized and the handle must be reopened. A timeout leaves the
/// handle usable; the caller may retry the whole operation.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// No device could be found or opened
    #[error("no device available")]
    NoDevice,

    /// The device handle is not open
    #[error("device not open")]
    NotOpen,

    /// Read or write failed at the OS level
    #[error("device i/o error: {0}")]
    Io(String),

    /// A read did not complete within the requested timeout
    #[error("read timed out")]
    Timeout,

    /// A reassembly chunk carried an unexpected channel, tag or sequence index
    #[error("framing error: {0}")]
    Framing(&'static str),

    /// The transport does not support the requested operation
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl TransportError {
    /// Create an i/o error from any displayable source
    pub fn io<E: std::fmt::Display>(source: E) -> Self {
        Self::Io(source.to_string())
    }
}
