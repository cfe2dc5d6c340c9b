//! Installed application records

use crate::codec::{take, CodecError};

/// Expected version byte of an app-list page
const LIST_VERSION: u8 = 0x01;

/// One installed application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Application name
    pub name: String,
    /// Application flag bits
    pub flags: u32,
    /// Hash over code and data
    pub code_data_hash: [u8; 32],
    /// Hash over the full application
    pub full_hash: [u8; 32],
}

impl AppInfo {
    /// Human-readable names of the set flag bits
    pub fn flag_names(&self) -> Vec<&'static str> {
        decode_flags(self.flags)
    }
}

/// Decode one app-list page: a version byte followed by zero or more
/// self-length-prefixed records
pub fn parse_app_list(data: &[u8]) -> Result<Vec<AppInfo>, CodecError> {
    let (&version, mut rest) = data.split_first().ok_or(CodecError::TruncatedInput)?;
    if version != LIST_VERSION {
        return Err(CodecError::InvalidValue("unsupported app list version"));
    }

    let mut apps = Vec::new();
    while !rest.is_empty() {
        // Record size byte, counted but not needed to walk the fields
        let (_, remaining) = take(rest, 1)?;

        let (raw_flags, remaining) = take(remaining, 4)?;
        let flags = u32::from_be_bytes([raw_flags[0], raw_flags[1], raw_flags[2], raw_flags[3]]);

        let (raw_code_hash, remaining) = take(remaining, 32)?;
        let mut code_data_hash = [0u8; 32];
        code_data_hash.copy_from_slice(raw_code_hash);

        let (raw_full_hash, remaining) = take(remaining, 32)?;
        let mut full_hash = [0u8; 32];
        full_hash.copy_from_slice(raw_full_hash);

        let (&name_len, remaining) = remaining.split_first().ok_or(CodecError::TruncatedInput)?;
        let (raw_name, remaining) = take(remaining, name_len as usize)?;
        let name = std::str::from_utf8(raw_name)
            .map_err(|_| CodecError::InvalidString)?
            .to_string();

        apps.push(AppInfo {
            name,
            // Only the low 16 bits are application flags
            flags: flags & 0xFFFF,
            code_data_hash,
            full_hash,
        });
        rest = remaining;
    }
    Ok(apps)
}

/// Decode an application flag word into flag names
pub fn decode_flags(flags: u32) -> Vec<&'static str> {
    // "enabled" (32768) is always set and not worth displaying
    const FLAG_NAMES: &[(u32, &str)] = &[
        (1, "issuer"),
        (2, "bolos_upgrade"),
        (4, "signed"),
        (8, "bolos_ux"),
        (16, "derive_master"),
        (64, "global_pin"),
        (128, "debug"),
        (256, "autoboot"),
        (512, "bolos_settings"),
        (1024, "custom_ca"),
        (2048, "library"),
        (4096, "no_run"),
    ];

    FLAG_NAMES
        .iter()
        .filter(|(bit, _)| flags & bit == *bit)
        .map(|&(_, name)| name)
        .collect()
}

/// Render an application flag word as a comma-separated list
pub fn flags_to_string(flags: u32) -> String {
    decode_flags(flags).join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(name: &str, flags: u32) -> Vec<u8> {
        let mut record = Vec::new();
        record.push((1 + 4 + 32 + 32 + name.len()) as u8);
        record.extend_from_slice(&flags.to_be_bytes());
        record.extend_from_slice(&[0x11; 32]);
        record.extend_from_slice(&[0x22; 32]);
        record.push(name.len() as u8);
        record.extend_from_slice(name.as_bytes());
        record
    }

    #[test]
    fn test_parse_single_record() {
        let mut page = vec![0x01];
        page.extend_from_slice(&sample_record("Bitcoin", 0x0800));

        let apps = parse_app_list(&page).unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "Bitcoin");
        assert_eq!(apps[0].flags, 0x0800);
        assert_eq!(apps[0].code_data_hash, [0x11; 32]);
        assert_eq!(apps[0].full_hash, [0x22; 32]);
    }

    #[test]
    fn test_parse_multiple_records() {
        let mut page = vec![0x01];
        page.extend_from_slice(&sample_record("A", 0));
        page.extend_from_slice(&sample_record("B", 4));

        let apps = parse_app_list(&page).unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[1].name, "B");
        assert_eq!(apps[1].flag_names(), vec!["signed"]);
    }

    #[test]
    fn test_flags_masked_to_low_16_bits() {
        let mut page = vec![0x01];
        page.extend_from_slice(&sample_record("X", 0xDEAD_0804));
        let apps = parse_app_list(&page).unwrap();
        assert_eq!(apps[0].flags, 0x0804);
    }

    #[test]
    fn test_empty_page_has_no_records() {
        assert!(parse_app_list(&[0x01]).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_version() {
        assert!(parse_app_list(&[0x02]).is_err());
        assert!(parse_app_list(&[]).is_err());
    }

    #[test]
    fn test_flags_to_string() {
        assert_eq!(
            flags_to_string(5333),
            "issuer,signed,derive_master,global_pin,debug,custom_ca,no_run"
        );
    }
}
