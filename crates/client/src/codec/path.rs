//! BIP32 and SLIP21 derivation path codecs
//!
//! A BIP32 path is an element count byte (below 0x80) followed by 4-byte
//! big-endian elements; hardened elements set the top bit, the `*` wildcard
//! is the reserved value 0x7FFFFFFF. A SLIP21 path is a length byte with the
//! top bit forced set, followed by a zero byte and the UTF-8 label.

use super::{take, CodecError};

/// Top bit marking a hardened element
pub const HARDENED: u32 = 0x8000_0000;

/// Reserved element value for the `*` wildcard
pub const WILDCARD: u32 = 0x7FFF_FFFF;

fn parse_element(element: &str) -> Result<u32, CodecError> {
    let invalid = || CodecError::InvalidPath(element.to_string());

    if element == "*" {
        return Ok(WILDCARD);
    }

    let (digits, hardened) = match element.strip_suffix('\'') {
        Some(digits) => (digits, true),
        None => (element, false),
    };
    let value: u32 = digits.parse().map_err(|_| invalid())?;

    if value & HARDENED != 0 {
        // Values past the 31-bit range must use the hardened quote instead
        return Err(invalid());
    }
    if value == WILDCARD {
        // Reserved for the wildcard symbol
        return Err(invalid());
    }

    Ok(if hardened { value | HARDENED } else { value })
}

/// Encode a BIP32 path such as `"44'/0'/1"`; a leading `m` element is dropped
pub fn encode_bip32_path(path: &str) -> Result<Vec<u8>, CodecError> {
    if path.is_empty() {
        return Ok(vec![0]);
    }

    let mut elements: Vec<&str> = path.split('/').collect();
    if elements.first() == Some(&"m") {
        elements.remove(0);
    }
    if elements.len() >= 0x80 {
        return Err(CodecError::InvalidPath(path.to_string()));
    }

    let mut out = Vec::with_capacity(1 + 4 * elements.len());
    out.push(elements.len() as u8);
    for element in elements {
        out.extend_from_slice(&parse_element(element)?.to_be_bytes());
    }
    Ok(out)
}

/// Decode a BIP32 path, returning it and the unconsumed rest
///
/// An element count of zero decodes to the empty string.
pub fn decode_bip32_path(input: &[u8]) -> Result<(String, &[u8]), CodecError> {
    let (&count, mut rest) = input.split_first().ok_or(CodecError::TruncatedInput)?;
    if count >= 0x80 {
        return Err(CodecError::InvalidValue("BIP32 element count must be < 0x80"));
    }

    let mut elements = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (raw, remaining) = take(rest, 4)?;
        rest = remaining;
        let value = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if value & HARDENED != 0 {
            elements.push(format!("{}'", value & !HARDENED));
        } else if value == WILDCARD {
            elements.push("*".to_string());
        } else {
            elements.push(value.to_string());
        }
    }
    Ok((elements.join("/"), rest))
}

/// Encode a SLIP21 path label; payloads over 127 bytes are rejected
pub fn encode_slip21_path(path: &str) -> Result<Vec<u8>, CodecError> {
    let payload_len = 1 + path.len();
    if payload_len > 0x7F {
        return Err(CodecError::InvalidPath(path.to_string()));
    }

    let mut out = Vec::with_capacity(1 + payload_len);
    out.push(0x80 | payload_len as u8);
    out.push(0x00);
    out.extend_from_slice(path.as_bytes());
    Ok(out)
}

/// Decode a SLIP21 path, returning it and the unconsumed rest
pub fn decode_slip21_path(input: &[u8]) -> Result<(String, &[u8]), CodecError> {
    let (&first, rest) = input.split_first().ok_or(CodecError::TruncatedInput)?;
    if first < 0x80 {
        return Err(CodecError::InvalidValue("SLIP21 length prefix must be >= 0x80"));
    }

    let (payload, rest) = take(rest, (first & 0x7F) as usize)?;
    if payload.is_empty() {
        return Ok((String::new(), rest));
    }
    if payload[0] != 0x00 {
        return Err(CodecError::InvalidValue("invalid SLIP21 path prefix"));
    }
    let label = std::str::from_utf8(&payload[1..]).map_err(|_| CodecError::InvalidString)?;
    Ok((label.to_string(), rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const BIP32_SAMPLES: &[(&str, &[u8])] = &[
        ("1", &hex!("01 00000001")),
        ("1'", &hex!("01 80000001")),
        ("0'/0", &hex!("02 80000000 00000000")),
        ("44'/91223'/2", &hex!("03 8000002c 80016457 00000002")),
        (
            "44'/0'/0'/1/400",
            &hex!("05 8000002c 80000000 80000000 00000001 00000190"),
        ),
    ];

    #[test]
    fn test_bip32_encode() {
        for &(path, expected) in BIP32_SAMPLES {
            assert_eq!(encode_bip32_path(path).unwrap(), expected, "path {path}");
        }
    }

    #[test]
    fn test_bip32_decode() {
        for &(expected, encoded) in BIP32_SAMPLES {
            let (path, rest) = decode_bip32_path(encoded).unwrap();
            assert_eq!(path, expected);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn test_bip32_round_trip() {
        let (path, _) = decode_bip32_path(&encode_bip32_path("44'/0'/1").unwrap()).unwrap();
        assert_eq!(path, "44'/0'/1");
    }

    #[test]
    fn test_bip32_empty() {
        assert_eq!(encode_bip32_path("").unwrap(), vec![0]);
        assert_eq!(decode_bip32_path(&[0]).unwrap(), (String::new(), &[][..]));
    }

    #[test]
    fn test_bip32_master_prefix_dropped() {
        let encoded = encode_bip32_path("m/44'/0'").unwrap();
        let (path, _) = decode_bip32_path(&encoded).unwrap();
        assert_eq!(path, "44'/0'");
    }

    #[test]
    fn test_bip32_wildcard() {
        let encoded = encode_bip32_path("44'/*").unwrap();
        assert_eq!(encoded, hex!("02 8000002c 7fffffff"));
        let (path, _) = decode_bip32_path(&encoded).unwrap();
        assert_eq!(path, "44'/*");
    }

    #[test]
    fn test_bip32_invalid_elements() {
        // Reserved wildcard value spelled out as a number
        assert!(encode_bip32_path("2147483647").is_err());
        // Out of the 31-bit range
        assert!(encode_bip32_path("2147483648").is_err());
        assert!(encode_bip32_path("4294967296").is_err());
        assert!(encode_bip32_path("x").is_err());
    }

    #[test]
    fn test_bip32_truncated() {
        assert_eq!(decode_bip32_path(&hex!("01")), Err(CodecError::TruncatedInput));
        assert_eq!(
            decode_bip32_path(&hex!("02 80000000")),
            Err(CodecError::TruncatedInput)
        );
    }

    #[test]
    fn test_slip21_round_trip() {
        let encoded = encode_slip21_path("LEDGER-WALLET").unwrap();
        assert_eq!(encoded[0], 0x80 | 14);
        assert_eq!(encoded[1], 0x00);
        let (path, rest) = decode_slip21_path(&encoded).unwrap();
        assert_eq!(path, "LEDGER-WALLET");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_slip21_too_long() {
        let long = "x".repeat(0x7F);
        assert!(encode_slip21_path(&long).is_err());
        assert!(encode_slip21_path(&"x".repeat(0x7E)).is_ok());
    }

    #[test]
    fn test_slip21_rejects_low_prefix() {
        assert_eq!(
            decode_slip21_path(&hex!("05 0041424344")),
            Err(CodecError::InvalidValue("SLIP21 length prefix must be >= 0x80"))
        );
    }
}
