//! ASN.1-style variable length encoding
//!
//! Lengths below 0x80 are a single byte; larger values are encoded as
//! `0x80 | k` followed by the `k` big-endian bytes of the value.

use super::CodecError;

/// Append the variable-length encoding of `value` to `out`
pub fn encode_len(out: &mut Vec<u8>, value: usize) {
    if value < 0x80 {
        out.push(value as u8);
        return;
    }

    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

/// Variable-length encoding of `value` as a standalone buffer
pub fn encode_len_vec(value: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    encode_len(&mut out, value);
    out
}

/// Decode a variable-length integer, returning it and the unconsumed rest
pub fn decode_len(input: &[u8]) -> Result<(usize, &[u8]), CodecError> {
    let (&first, rest) = input.split_first().ok_or(CodecError::TruncatedInput)?;
    if first & 0x80 == 0 {
        return Ok((first as usize, rest));
    }

    let num_bytes = (first & 0x7F) as usize;
    if rest.len() < num_bytes {
        return Err(CodecError::TruncatedInput);
    }
    let mut value = 0usize;
    for &byte in &rest[..num_bytes] {
        value = (value << 8) | byte as usize;
    }
    Ok((value, &rest[num_bytes..]))
}

/// Append a length-prefixed byte region
pub fn encode_prefixed(out: &mut Vec<u8>, region: &[u8]) {
    encode_len(out, region.len());
    out.extend_from_slice(region);
}

/// Split a length-prefixed byte region off the input
pub fn decode_prefixed(input: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    let (len, rest) = decode_len(input)?;
    if rest.len() < len {
        return Err(CodecError::TruncatedInput);
    }
    Ok(rest.split_at(len))
}

/// Append a length-prefixed UTF-8 string
pub fn encode_string(out: &mut Vec<u8>, value: &str) {
    encode_prefixed(out, value.as_bytes());
}

/// Split a length-prefixed UTF-8 string off the input
pub fn decode_string(input: &[u8]) -> Result<(String, &[u8]), CodecError> {
    let (region, rest) = decode_prefixed(input)?;
    let value = std::str::from_utf8(region).map_err(|_| CodecError::InvalidString)?;
    Ok((value.to_string(), rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const SAMPLES: &[(usize, &[u8])] = &[
        (0, &hex!("00")),
        (4, &hex!("04")),
        (127, &hex!("7f")),
        (128, &hex!("8180")),
        (160, &hex!("81a0")),
        (255, &hex!("81ff")),
        (256, &hex!("820100")),
    ];

    #[test]
    fn test_encode() {
        for &(value, expected) in SAMPLES {
            assert_eq!(encode_len_vec(value), expected, "value {value}");
        }
    }

    #[test]
    fn test_decode() {
        for &(expected, encoded) in SAMPLES {
            assert_eq!(decode_len(encoded).unwrap(), (expected, &[][..]));
        }
    }

    #[test]
    fn test_round_trip() {
        for value in 0..(1usize << 24) {
            // Exhaustively checking 16M values is slow; sample the range
            if value > 0x400 && value % 997 != 0 {
                continue;
            }
            let encoded = encode_len_vec(value);
            assert_eq!(decode_len(&encoded).unwrap(), (value, &[][..]));
        }
    }

    #[test]
    fn test_truncated() {
        assert_eq!(decode_len(&[]), Err(CodecError::TruncatedInput));
        assert_eq!(decode_len(&hex!("82 01")), Err(CodecError::TruncatedInput));
        assert_eq!(decode_prefixed(&hex!("05 0102")), Err(CodecError::TruncatedInput));
    }
}
