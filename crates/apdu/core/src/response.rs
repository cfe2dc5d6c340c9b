//! APDU response parsing
//!
//! Every device response terminates with a 2-byte status word; the bytes in
//! front of it are the payload.

use bytes::Bytes;

use crate::{Error, StatusWord};

/// Parsed APDU response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: Bytes,
    status: StatusWord,
}

impl Response {
    /// Create a response from a payload and status word
    pub const fn new(payload: Bytes, status: StatusWord) -> Self {
        Self { payload, status }
    }

    /// Split raw response bytes into payload and trailing status word
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 2 {
            return Err(Error::TruncatedResponse { actual: data.len() });
        }

        let (payload, trailer) = data.split_at(data.len() - 2);
        Ok(Self {
            payload: Bytes::copy_from_slice(payload),
            status: StatusWord::new(trailer[0], trailer[1]),
        })
    }

    /// Response payload without the status word
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Trailing status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Consume the response, returning the payload if the device accepted the
    /// command, or the mapped status error otherwise.
    pub fn into_payload(self) -> Result<Bytes, Error> {
        if self.status.is_ok() {
            Ok(self.payload)
        } else {
            Err(Error::status(self.status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_status_word() {
        let response = Response::from_bytes(&[0x01, 0x02, 0x90, 0x00]).unwrap();
        assert_eq!(response.payload().as_ref(), &[0x01, 0x02]);
        assert!(response.status().is_success());
    }

    #[test]
    fn test_empty_payload() {
        let response = Response::from_bytes(&[0x90, 0x00]).unwrap();
        assert!(response.payload().is_empty());
        assert_eq!(response.into_payload().unwrap(), Bytes::new());
    }

    #[test]
    fn test_error_status() {
        let response = Response::from_bytes(&[0x6A, 0x81]).unwrap();
        let err = response.into_payload().unwrap_err();
        match err {
            Error::Status { status, .. } => assert_eq!(status.to_u16(), 0x6A81),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_truncated_response() {
        assert!(Response::from_bytes(&[0x90]).is_err());
        assert!(Response::from_bytes(&[]).is_err());
    }
}
