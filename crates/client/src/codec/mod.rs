//! Binary codecs for the device's wire structures
//!
//! Every structure gets an explicit, independently testable encode/decode
//! pair; there is no schema-driven parsing. Decoders take a slice and return
//! the decoded value together with the unconsumed rest.

pub mod asn1;
pub mod params;
pub mod path;

pub use params::{AppParam, Dependency, DerivationPath};

/// Errors raised by the wire codecs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input ended before the structure was complete
    #[error("truncated input")]
    TruncatedInput,

    /// A derivation path element is malformed
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A field value violates the encoding rules
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// A string field is not valid UTF-8
    #[error("invalid string encoding")]
    InvalidString,
}

/// Prefix a byte string with its single-byte length
pub fn serialize(buffer: &[u8]) -> Result<Vec<u8>, CodecError> {
    if buffer.len() > u8::MAX as usize {
        return Err(CodecError::InvalidValue("byte string longer than 255"));
    }
    let mut out = Vec::with_capacity(1 + buffer.len());
    out.push(buffer.len() as u8);
    out.extend_from_slice(buffer);
    Ok(out)
}

/// Split a single-byte length-prefixed byte string off the input
pub fn unserialize(buffer: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    let (&len, rest) = buffer.split_first().ok_or(CodecError::TruncatedInput)?;
    let len = len as usize;
    if rest.len() < len {
        return Err(CodecError::TruncatedInput);
    }
    Ok(rest.split_at(len))
}

/// Read a fixed number of bytes off the input
pub(crate) fn take(buffer: &[u8], len: usize) -> Result<(&[u8], &[u8]), CodecError> {
    if buffer.len() < len {
        return Err(CodecError::TruncatedInput);
    }
    Ok(buffer.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize() {
        let sample = b"some bytes";
        let result = serialize(sample).unwrap();
        assert_eq!(result[0] as usize, sample.len());
        assert_eq!(&result[1..], sample);
    }

    #[test]
    fn test_unserialize() {
        let sample = hex::decode("0304050607").unwrap();
        let (value, rest) = unserialize(&sample).unwrap();
        assert_eq!(value, &[0x04, 0x05, 0x06]);
        assert_eq!(rest, &[0x07]);
    }

    #[test]
    fn test_unserialize_too_small() {
        assert_eq!(unserialize(&[0x01]), Err(CodecError::TruncatedInput));
        assert_eq!(unserialize(&[]), Err(CodecError::TruncatedInput));
    }

    #[test]
    fn test_serialize_too_long() {
        assert!(serialize(&[0u8; 256]).is_err());
    }
}
