//! Version information response decoding

use crate::codec::{take, CodecError};

/// Device flag: booted in recovery mode
pub const FLAG_RECOVERY_MODE: u32 = 1;
/// Device flag: MCU firmware signature verified
pub const FLAG_SIGNED_MCU: u32 = 2;
/// Device flag: onboarding completed
pub const FLAG_IS_ONBOARDED: u32 = 4;
/// Device flag: issuer keys trusted
pub const FLAG_TRUST_ISSUER: u32 = 8;
/// Device flag: a custom CA is trusted
pub const FLAG_TRUST_CUSTOM_CA: u32 = 16;
/// Device flag: HSM personalization completed
pub const FLAG_HSM_INITIALIZED: u32 = 32;
/// Device flag: PIN has been validated this session
pub const FLAG_PIN_VALIDATED: u32 = 128;

/// Version information reported by the device
///
/// The trailing fields are optional on the wire; their presence is inferred
/// from the remaining buffer length and absence means "unset", not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Target identifier of the hardware
    pub target_id: u32,
    /// Secure element firmware version
    pub se_version: String,
    /// Device flag word (FLAG_* bits)
    pub flags: u32,
    /// MCU firmware version
    pub mcu_version: String,
    /// MCU firmware hash
    pub mcu_hash: Option<[u8; 32]>,
    /// MCU bootloader version
    pub mcu_bl_version: Option<String>,
    /// Hardware revision
    pub hw_version: Option<u8>,
    /// Configured language code
    pub language: Option<u8>,
    /// Recovery onboarding state
    pub recover_state: Option<u8>,
}

fn pascal_string(input: &[u8]) -> Result<(String, &[u8]), CodecError> {
    let (&len, rest) = input.split_first().ok_or(CodecError::TruncatedInput)?;
    let (raw, rest) = take(rest, len as usize)?;
    let value = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidString)?;
    Ok((value.to_string(), rest))
}

impl VersionInfo {
    /// Decode a version-info response payload
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        let (raw_target, rest) = take(data, 4)?;
        let target_id = u32::from_be_bytes([raw_target[0], raw_target[1], raw_target[2], raw_target[3]]);

        let (se_version, rest) = pascal_string(rest)?;

        let (&flags_len, rest) = rest.split_first().ok_or(CodecError::TruncatedInput)?;
        if flags_len != 4 {
            return Err(CodecError::InvalidValue("flag field length must be 4"));
        }
        let (raw_flags, rest) = take(rest, 4)?;
        // The flag word is little-endian, unlike everything around it
        let flags = u32::from_le_bytes([raw_flags[0], raw_flags[1], raw_flags[2], raw_flags[3]]);

        let (mcu_version, mut rest) = pascal_string(rest)?;

        let mut info = Self {
            target_id,
            se_version,
            flags,
            mcu_version,
            mcu_hash: None,
            mcu_bl_version: None,
            hw_version: None,
            language: None,
            recover_state: None,
        };

        if rest.len() >= 32 {
            let (raw, remaining) = take(rest, 32)?;
            let mut hash = [0u8; 32];
            hash.copy_from_slice(raw);
            info.mcu_hash = Some(hash);
            rest = remaining;
        }
        if !rest.is_empty() {
            let (value, remaining) = pascal_string(rest)?;
            info.mcu_bl_version = Some(value);
            rest = remaining;
        }
        if let Some((&value, remaining)) = rest.split_first() {
            info.hw_version = Some(value);
            rest = remaining;
        }
        if let Some((&value, remaining)) = rest.split_first() {
            info.language = Some(value);
            rest = remaining;
        }
        if let Some((&value, _)) = rest.split_first() {
            info.recover_state = Some(value);
        }

        Ok(info)
    }

    /// Marketing name of the hardware for this target id
    pub const fn device_name(&self) -> &'static str {
        get_device_name(self.target_id)
    }

    /// Whether onboarding has completed
    pub const fn is_onboarded(&self) -> bool {
        self.flags & FLAG_IS_ONBOARDED != 0
    }

    /// Whether the device booted in recovery mode
    pub const fn is_recovery_mode(&self) -> bool {
        self.flags & FLAG_RECOVERY_MODE != 0
    }
}

/// Marketing name for a target id
pub const fn get_device_name(target_id: u32) -> &'static str {
    match target_id {
        // Several target ids map to the same product across firmware ranges
        0x31100002 | 0x31100003 | 0x31100004 => "Ledger Nano S",
        0x31000002 | 0x31010004 => "Ledger Blue",
        0x33000004 => "Ledger Nano X",
        _ => "Unknown device",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_parse_minimal() {
        // target 0x33000004, se "2.1.0", flags 0x04 (LE), mcu "1.0"
        let payload = hex!("33000004 05 322e312e30 04 04000000 03 312e30");
        let info = VersionInfo::parse(&payload).unwrap();
        assert_eq!(info.target_id, 0x33000004);
        assert_eq!(info.se_version, "2.1.0");
        assert_eq!(info.mcu_version, "1.0");
        assert!(info.is_onboarded());
        assert!(!info.is_recovery_mode());
        assert_eq!(info.device_name(), "Ledger Nano X");
        assert_eq!(info.mcu_hash, None);
        assert_eq!(info.mcu_bl_version, None);
    }

    #[test]
    fn test_parse_with_trailing_fields() {
        let mut payload = hex!("31100004 05 312e362e30 04 05000000 03 312e37").to_vec();
        payload.extend_from_slice(&[0xAB; 32]);
        payload.extend_from_slice(&hex!("04 302e3131 01 00 01"));

        let info = VersionInfo::parse(&payload).unwrap();
        assert_eq!(info.device_name(), "Ledger Nano S");
        assert_eq!(info.mcu_hash, Some([0xAB; 32]));
        assert_eq!(info.mcu_bl_version.as_deref(), Some("0.11"));
        assert_eq!(info.hw_version, Some(0x01));
        assert_eq!(info.language, Some(0x00));
        assert_eq!(info.recover_state, Some(0x01));
        assert!(info.is_recovery_mode());
    }

    #[test]
    fn test_flag_word_is_little_endian() {
        let payload = hex!("33000004 00 04 80000000 00");
        let info = VersionInfo::parse(&payload).unwrap();
        assert_eq!(info.flags, FLAG_PIN_VALIDATED);
    }

    #[test]
    fn test_rejects_bad_flag_length() {
        let payload = hex!("33000004 00 03 800000 00");
        assert!(VersionInfo::parse(&payload).is_err());
    }

    #[test]
    fn test_rejects_truncated() {
        assert_eq!(
            VersionInfo::parse(&hex!("330000")),
            Err(CodecError::TruncatedInput)
        );
        assert_eq!(
            VersionInfo::parse(&hex!("33000004 05 3131")),
            Err(CodecError::TruncatedInput)
        );
    }
}
