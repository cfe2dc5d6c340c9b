//! Memory usage information

use crate::codec::CodecError;

/// Memory usage reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Bytes used by the system
    pub system_size: u32,
    /// Bytes used by installed applications
    pub applications_size: u32,
    /// Bytes available
    pub free_size: u32,
    /// Application slots in use
    pub used_app_slots: u32,
    /// Total application slots
    pub num_app_slots: u32,
}

impl MemoryInfo {
    /// Decode a memory-info response: five 4-byte big-endian words
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() != 20 {
            return Err(CodecError::InvalidValue("memory info must be 20 bytes"));
        }

        let word = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Ok(Self {
            system_size: word(0),
            applications_size: word(4),
            free_size: word(8),
            used_app_slots: word(12),
            num_app_slots: word(16),
        })
    }

    /// Total managed memory
    pub const fn total_size(&self) -> u32 {
        self.system_size + self.applications_size + self.free_size
    }
}
