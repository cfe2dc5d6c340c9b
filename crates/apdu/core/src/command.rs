//! APDU command definitions
//!
//! This module provides the command type exchanged with the secure element:
//! a 4-byte header (CLA, INS, P1, P2) followed by a length-prefixed payload.

use bytes::{BufMut, Bytes, BytesMut};

use crate::Error;

/// Maximum payload length of a single command
pub const MAX_DATA_LENGTH: usize = 255;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Command payload data
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Length of the serialized command
    pub fn command_length(&self) -> usize {
        // Header is always 4 bytes, a payload adds Lc plus the data itself
        4 + self.data.as_ref().map_or(0, |d| 1 + d.len())
    }

    /// Convert to raw APDU bytes
    ///
    /// The payload, when present, is emitted as a single-byte length followed
    /// by the data. Payloads over [`MAX_DATA_LENGTH`] cannot be represented.
    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = &self.data {
            if data.len() > MAX_DATA_LENGTH {
                return Err(Error::InvalidCommandLength(data.len()));
            }
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        Ok(buffer.freeze())
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 4 {
            return Err(Error::InvalidCommandLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);

        if data.len() > 4 {
            let lc = data[4] as usize;
            if data.len() != 5 + lc {
                return Err(Error::InvalidCommandLength(data.len()));
            }
            if lc > 0 {
                command.data = Some(Bytes::copy_from_slice(&data[5..5 + lc]));
            }
        }

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization() {
        let data = Bytes::from_static(&[0x31, 0x10, 0x00, 0x04]);
        let cmd = Command::new_with_data(0xE0, 0x04, 0x00, 0x00, data);
        let bytes = cmd.to_bytes().unwrap();

        assert_eq!(&bytes[..], &[0xE0, 0x04, 0x00, 0x00, 0x04, 0x31, 0x10, 0x00, 0x04]);
    }

    #[test]
    fn test_command_without_data() {
        let cmd = Command::new(0xE0, 0x53, 0x00, 0x00);
        assert_eq!(cmd.command_length(), 4);
        assert_eq!(&cmd.to_bytes().unwrap()[..], &[0xE0, 0x53, 0x00, 0x00]);
    }

    #[test]
    fn test_command_from_bytes() {
        let cmd = Command::from_bytes(&[0xE0, 0x50, 0x00, 0x00, 0x02, 0xAA, 0xBB]).unwrap();
        assert_eq!(cmd.cla, 0xE0);
        assert_eq!(cmd.ins, 0x50);
        assert_eq!(cmd.data.as_deref(), Some([0xAA, 0xBB].as_ref()));

        // Truncated payloads are rejected
        assert!(Command::from_bytes(&[0xE0, 0x50, 0x00, 0x00, 0x05, 0xAA]).is_err());
        assert!(Command::from_bytes(&[0xE0, 0x50]).is_err());
    }

    #[test]
    fn test_oversized_payload() {
        let cmd = Command::new_with_data(0xE0, 0x00, 0, 0, vec![0u8; 300]);
        assert!(cmd.to_bytes().is_err());
    }
}
