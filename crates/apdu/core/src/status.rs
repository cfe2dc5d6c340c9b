//! Status word definitions for APDU responses

use std::fmt;

/// Status Word (SW1-SW2) terminating every device response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create from a u16 value (SW1 | SW2)
    pub const fn from_u16(status: u16) -> Self {
        Self {
            sw1: (status >> 8) as u8,
            sw2: status as u8,
        }
    }

    /// Convert to a u16 value (SW1 | SW2)
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Check if this status word indicates plain success (90 00)
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Check if this status word indicates more data is available (61 XX)
    pub const fn is_more_data_available(&self) -> bool {
        self.sw1 == 0x61
    }

    /// Whether the device accepted the command.
    ///
    /// `90 00` and `61 XX` are the only success forms; everything else is a
    /// device error.
    pub const fn is_ok(&self) -> bool {
        self.is_success() || self.is_more_data_available()
    }

    /// Get the number of remaining bytes when SW1 = 61
    pub const fn remaining_bytes(&self) -> Option<u8> {
        if self.sw1 == 0x61 { Some(self.sw2) } else { None }
    }

    /// Get a probable cause for this status word.
    ///
    /// The mapping reproduces the device's management protocol contract; codes
    /// it does not know about get a generic cause.
    pub const fn cause(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Success",
            (0x61, _) => "More data available",
            (0x64, 0x84) => "Are you using the correct target id?",
            (0x68, 0x02) => "Invalid parameter",
            (0x69, 0x82) => "Have you uninstalled the existing CA first?",
            (0x69, 0x84) => "Application is not installed",
            (0x69, 0x85) => "Condition of use not satisfied (denied by the user?)",
            (0x69, 0xD5) => "Custom secure channels are not supported on this target",
            (0x6A, 0x80) => "An application with the same name is already installed",
            (0x6A, 0x81) => "Application is already installed",
            (0x6A, 0x83) => "Maybe this app requires a library to be installed first?",
            (0x6A, 0x84) | (0x6A, 0x85) => "Not enough space?",
            _ => "Unknown reason",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        Self::from_u16(status)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}", self.sw1, self.sw2)
    }
}

/// Common status words
pub mod common {
    use super::StatusWord;

    /// Success (90 00)
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);

    /// Condition of use not satisfied, e.g. denied on the device (69 85)
    pub const CONDITIONS_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x85);

    /// A custom CA certificate is already installed (69 82)
    pub const CA_ALREADY_INSTALLED: StatusWord = StatusWord::new(0x69, 0x82);

    /// Application not installed (69 84)
    pub const APP_NOT_INSTALLED: StatusWord = StatusWord::new(0x69, 0x84);

    /// Duplicate application name (6A 80)
    pub const DUPLICATE_NAME: StatusWord = StatusWord::new(0x6A, 0x80);

    /// Application already installed (6A 81)
    pub const ALREADY_INSTALLED: StatusWord = StatusWord::new(0x6A, 0x81);

    /// Missing dependency (6A 83)
    pub const MISSING_DEPENDENCY: StatusWord = StatusWord::new(0x6A, 0x83);

    /// No object / not enough space (6A 84)
    pub const NOT_ENOUGH_SPACE: StatusWord = StatusWord::new(0x6A, 0x84);

    /// Wrong target id (64 84)
    pub const WRONG_TARGET_ID: StatusWord = StatusWord::new(0x64, 0x84);

    /// Invalid parameter (68 02)
    pub const INVALID_PARAMETER: StatusWord = StatusWord::new(0x68, 0x02);

    /// Custom secure channel unsupported on this target (69 D5)
    pub const CUSTOM_CHANNEL_UNSUPPORTED: StatusWord = StatusWord::new(0x69, 0xD5);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_from_to_u16() {
        let sw = StatusWord::from_u16(0x9000);
        assert_eq!(sw.sw1, 0x90);
        assert_eq!(sw.sw2, 0x00);
        assert_eq!(sw.to_u16(), 0x9000);
    }

    #[test]
    fn test_success_forms() {
        assert!(StatusWord::new(0x90, 0x00).is_ok());
        assert!(StatusWord::new(0x61, 0x10).is_ok());
        assert!(!StatusWord::new(0x69, 0x85).is_ok());
        assert!(!StatusWord::new(0x6A, 0x84).is_ok());
    }

    #[test]
    fn test_remaining_bytes() {
        assert_eq!(StatusWord::new(0x61, 0x15).remaining_bytes(), Some(0x15));
        assert_eq!(StatusWord::new(0x90, 0x00).remaining_bytes(), None);
    }

    #[test]
    fn test_causes() {
        assert_eq!(
            StatusWord::from_u16(0x6985).cause(),
            "Condition of use not satisfied (denied by the user?)"
        );
        assert_eq!(StatusWord::from_u16(0x6A84).cause(), "Not enough space?");
        assert_eq!(StatusWord::from_u16(0x6A85).cause(), "Not enough space?");
        assert_eq!(
            StatusWord::from_u16(0x6484).cause(),
            "Are you using the correct target id?"
        );
        assert_eq!(StatusWord::from_u16(0x1234).cause(), "Unknown reason");
    }
}
