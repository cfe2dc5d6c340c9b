//! Error taxonomy for device management operations
//!
//! Five kinds of failure flow through one enum so callers can match on the
//! kind before deciding retry policy: local validation errors (never sent to
//! the device), framing errors (fatal to the transport session),
//! cryptographic errors (fatal to the secure channel), device status errors
//! (recoverable at the caller's discretion), and remote peer failures. The
//! library itself performs no hidden retries.

use tessera_apdu_core::{StatusWord, TransportError};

use crate::codec::CodecError;
use crate::crypto::CryptoError;
use crate::image::ImageError;
use crate::manifest::ManifestError;
use crate::scp::ScpError;

/// Result type for device management operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kind, for retry policy decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised before any device interaction; never retried
    Validation,
    /// Sequence/length mismatch or truncated decode; requires a new handle
    Framing,
    /// MAC, padding or certificate failure; requires re-authentication
    Crypto,
    /// Mapped status word; retry is the caller's call
    DeviceStatus,
    /// Remote HSM failure, with the server's message
    Remote,
}

/// Error type for device management operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Code image length is not 64-byte aligned
    #[error("misaligned image: code length {0:#x} is not a multiple of 64")]
    MisalignedImage(u32),

    /// A locally validated argument is malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The target does not support this secure channel protocol version
    #[error("target {0:#010x} does not support SCP V2")]
    UnsupportedTarget(u32),

    /// Manifest loading or validation failed
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Application image loading failed
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Wire structure encoding or decoding failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Key material was malformed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Secure channel failure
    #[error(transparent)]
    Scp(#[from] ScpError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The device returned a non-success status word
    #[error("invalid status {status} ({cause})")]
    Status {
        /// The status word
        status: StatusWord,
        /// Probable cause from the static status table
        cause: &'static str,
    },

    /// The remote HSM reported a failure
    #[error("remote peer failure: {0}")]
    Remote(String),
}

impl Error {
    /// The failure kind, for retry policy decisions
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MisalignedImage(_)
            | Self::InvalidArgument(_)
            | Self::UnsupportedTarget(_)
            | Self::Manifest(_)
            | Self::Image(_) => ErrorKind::Validation,
            Self::Codec(_) | Self::Transport(_) => ErrorKind::Framing,
            Self::Crypto(_) | Self::Scp(_) => ErrorKind::Crypto,
            Self::Status { .. } => ErrorKind::DeviceStatus,
            Self::Remote(_) => ErrorKind::Remote,
        }
    }

    /// The status word, when the device rejected a command
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<tessera_apdu_core::Error> for Error {
    fn from(error: tessera_apdu_core::Error) -> Self {
        match error {
            tessera_apdu_core::Error::Status { status, cause } => Self::Status { status, cause },
            tessera_apdu_core::Error::Transport(e) => Self::Transport(e),
            tessera_apdu_core::Error::InvalidCommandLength(_) => {
                Self::InvalidArgument("command payload too long")
            }
            tessera_apdu_core::Error::TruncatedResponse { .. } => {
                Self::Codec(CodecError::TruncatedInput)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Error::MisalignedImage(100).kind(), ErrorKind::Validation);
        assert_eq!(
            Error::from(CodecError::TruncatedInput).kind(),
            ErrorKind::Framing
        );
        assert_eq!(Error::from(ScpError::InvalidMac).kind(), ErrorKind::Crypto);
        assert_eq!(
            Error::Status {
                status: StatusWord::from_u16(0x6985),
                cause: "",
            }
            .kind(),
            ErrorKind::DeviceStatus
        );
        assert_eq!(Error::Remote(String::new()).kind(), ErrorKind::Remote);
    }

    #[test]
    fn test_status_word_accessor() {
        let error = Error::from(tessera_apdu_core::Error::status(StatusWord::from_u16(0x6A81)));
        assert_eq!(error.status_word().map(u16::from), Some(0x6A81));
        assert_eq!(Error::Remote(String::new()).status_word(), None);
    }
}
