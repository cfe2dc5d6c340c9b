//! Secure channel session: key derivation and the authenticated-encryption
//! wrapper applied to every secure instruction
//!
//! After the handshake negotiates a shared secret, two 16-byte keys are
//! derived from it. Payloads are ISO 9797-1 padded, AES-128-CBC encrypted,
//! and authenticated with a truncated CBC-MAC. Both the encryption IV and
//! the MAC IV chain across messages; the chaining is part of the protocol,
//! so wrap/unwrap calls must be totally ordered.

use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::PrivateKey;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Cipher block size
pub const BLOCK_SIZE: usize = 16;

/// Bytes of the CBC-MAC block appended to wrapped payloads
pub const MAC_LENGTH: usize = 14;

/// Errors raised by the secure channel
///
/// All of these are fatal to the current channel: it must be torn down and
/// re-established by a new handshake. None may be downgraded to an empty or
/// success result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScpError {
    /// MAC verification failed on a wrapped response
    #[error("invalid secure channel MAC")]
    InvalidMac,

    /// ISO 9797 padding was malformed after decryption
    #[error("invalid secure channel padding")]
    InvalidPadding,

    /// Wrapped data is not a whole number of cipher blocks
    #[error("malformed secure channel payload")]
    MalformedPayload,

    /// A certificate chain entry failed signature verification
    #[error("broken certificate chain")]
    BrokenCertificateChain,

    /// The handshake steps were driven out of order
    #[error("handshake state error: {0}")]
    Handshake(&'static str),

    /// The peer completed the handshake without a shared secret
    #[error("no shared secret negotiated")]
    MissingSharedSecret,
}

/// Pad with ISO/IEC 9797-1 padding method 2: append 0x80, then zero-fill to
/// a block boundary. At least one byte is always appended.
pub fn iso9797_pad(data: &[u8]) -> Vec<u8> {
    let padding_len = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut padded = Vec::with_capacity(data.len() + padding_len);
    padded.extend_from_slice(data);
    padded.push(0x80);
    padded.resize(data.len() + padding_len, 0x00);
    padded
}

/// Remove ISO/IEC 9797-1 padding method 2
///
/// Scans the final block backwards for the 0x80 marker; any non-zero byte in
/// between is a padding error.
pub fn iso9797_unpad(data: &[u8]) -> Result<Vec<u8>, ScpError> {
    if data.len() < BLOCK_SIZE || data.len() % BLOCK_SIZE != 0 {
        return Err(ScpError::MalformedPayload);
    }

    let last_block = &data[data.len() - BLOCK_SIZE..];
    for (i, &byte) in last_block.iter().enumerate().rev() {
        if byte == 0x80 {
            let mut out = data[..data.len() - BLOCK_SIZE].to_vec();
            out.extend_from_slice(&last_block[..i]);
            return Ok(out);
        }
        if byte != 0x00 {
            return Err(ScpError::InvalidPadding);
        }
    }
    Err(ScpError::InvalidPadding)
}

/// Derived session keys, wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
struct Keys {
    enc: [u8; 16],
    mac: [u8; 16],
}

/// Secure channel session state
///
/// Owned exclusively by one device session; invalidated whenever a new
/// handshake occurs.
pub struct Scp {
    keys: Keys,
    enc_iv: [u8; 16],
    mac_iv: [u8; 16],
}

impl std::fmt::Debug for Scp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scp").finish_non_exhaustive()
    }
}

/// Derive one 16-byte session key from the shared secret.
///
/// SHA-256 over {index, retry counter, secret} is retried until the digest is
/// a valid non-zero curve scalar; the key is the first 16 bytes of SHA-256
/// over the corresponding uncompressed public point. The truncation point is
/// load-bearing for device interoperability.
fn derive_key(secret: &[u8], index: u32) -> [u8; 16] {
    let mut retry = 0u8;
    let scalar = loop {
        let mut hasher = Sha256::new();
        hasher.update(index.to_be_bytes());
        hasher.update([retry]);
        hasher.update(secret);
        let digest = hasher.finalize();

        if let Ok(key) = PrivateKey::from_bytes(digest.as_slice()) {
            break key;
        }
        retry = retry.wrapping_add(1);
    };

    let point = scalar.public_key().serialize();
    let digest = Sha256::digest(&point);
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

impl Scp {
    /// Derive a session from a negotiated shared secret
    pub fn new(shared_secret: &[u8]) -> Self {
        Self {
            keys: Keys {
                enc: derive_key(shared_secret, 0),
                mac: derive_key(shared_secret, 1),
            },
            enc_iv: [0u8; 16],
            mac_iv: [0u8; 16],
        }
    }

    fn encrypt_data(&mut self, data: &mut [u8]) {
        let len = data.len();
        // SAFETY: the buffer is a whole number of blocks, so NoPadding cannot fail
        Aes128CbcEnc::new(&self.keys.enc.into(), &self.enc_iv.into())
            .encrypt_padded_mut::<NoPadding>(data, len)
            .unwrap();
        self.enc_iv.copy_from_slice(&data[len - BLOCK_SIZE..]);
    }

    fn decrypt_data(&mut self, data: &mut [u8]) -> Result<(), ScpError> {
        let mut next_iv = [0u8; 16];
        next_iv.copy_from_slice(&data[data.len() - BLOCK_SIZE..]);

        Aes128CbcDec::new(&self.keys.enc.into(), &self.enc_iv.into())
            .decrypt_padded_mut::<NoPadding>(data)
            .map_err(|_| ScpError::MalformedPayload)?;
        self.enc_iv = next_iv;
        Ok(())
    }

    /// CBC-MAC over full blocks, chaining the MAC IV across calls
    fn compute_cbc_mac(&mut self, data: &[u8]) -> [u8; 16] {
        let mut buffer = data.to_vec();
        let len = buffer.len();
        // SAFETY: callers only MAC whole ciphertext blocks, so NoPadding cannot fail
        Aes128CbcEnc::new(&self.keys.mac.into(), &self.mac_iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .unwrap();

        let mut mac = [0u8; 16];
        mac.copy_from_slice(&buffer[len - BLOCK_SIZE..]);
        self.mac_iv = mac;
        mac
    }

    /// Encrypt and authenticate a payload for the device
    pub fn wrap(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = iso9797_pad(data);
        self.encrypt_data(&mut out);
        let mac = self.compute_cbc_mac(&out);
        out.extend_from_slice(&mac[BLOCK_SIZE - MAC_LENGTH..]);
        out
    }

    /// Verify and decrypt a payload from the device
    ///
    /// Empty input is the device's "no data" sentinel and unwraps to empty
    /// output without touching the channel state.
    pub fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ScpError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data.len() < MAC_LENGTH + BLOCK_SIZE
            || (data.len() - MAC_LENGTH) % BLOCK_SIZE != 0
        {
            return Err(ScpError::MalformedPayload);
        }

        let (encrypted, received_mac) = data.split_at(data.len() - MAC_LENGTH);
        let computed = self.compute_cbc_mac(encrypted);
        if !bool::from(computed[BLOCK_SIZE - MAC_LENGTH..].ct_eq(received_mac)) {
            return Err(ScpError::InvalidMac);
        }

        let mut buffer = encrypted.to_vec();
        self.decrypt_data(&mut buffer)?;
        iso9797_unpad(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn session_pair() -> (Scp, Scp) {
        let secret = hex!("b410e816da313545151807e25a830201fa389913a977066ab0c6de0e8631e400");
        (Scp::new(&secret), Scp::new(&secret))
    }

    #[test]
    fn test_pad_round_trip() {
        for len in 0..=1000 {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let padded = iso9797_pad(&data);
            assert_eq!(padded.len() % BLOCK_SIZE, 0, "len {len}");
            assert!(padded.len() >= data.len() + 1, "len {len}");
            assert_eq!(iso9797_unpad(&padded).unwrap(), data, "len {len}");
        }
    }

    #[test]
    fn test_pad_appends_full_block_when_aligned() {
        let padded = iso9797_pad(&[0u8; 16]);
        assert_eq!(padded.len(), 32);
        assert_eq!(padded[16], 0x80);
    }

    #[test]
    fn test_unpad_rejects_garbage() {
        assert_eq!(iso9797_unpad(&[0u8; 16]), Err(ScpError::InvalidPadding));
        let mut block = [0u8; 16];
        block[14] = 0x80;
        block[15] = 0x01;
        assert_eq!(iso9797_unpad(&block), Err(ScpError::InvalidPadding));
        assert_eq!(iso9797_unpad(&[0u8; 15]), Err(ScpError::MalformedPayload));
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let secret = hex!("0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20");
        assert_eq!(derive_key(&secret, 0), derive_key(&secret, 0));
        assert_ne!(derive_key(&secret, 0), derive_key(&secret, 1));
    }

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let (mut wrapper, mut unwrapper) = session_pair();

        for msg in [&b"hello"[..], &[0u8; 16], &[], &[0xAB; 100]] {
            let wire = wrapper.wrap(msg);
            assert_eq!(wire.len() % BLOCK_SIZE, MAC_LENGTH % BLOCK_SIZE);
            assert_eq!(unwrapper.unwrap(&wire).unwrap(), msg);
        }
    }

    #[test]
    fn test_iv_chaining() {
        let (mut wrapper, mut unwrapper) = session_pair();

        let first = wrapper.wrap(b"first message");
        let second = wrapper.wrap(b"second message");
        // The second message depends on IV state advanced by the first
        assert_eq!(unwrapper.unwrap(&first).unwrap(), b"first message");
        assert_eq!(unwrapper.unwrap(&second).unwrap(), b"second message");
    }

    #[test]
    fn test_replay_fails_mac() {
        let (mut wrapper, mut unwrapper) = session_pair();

        let wire = wrapper.wrap(b"pay 1 coin");
        assert!(unwrapper.unwrap(&wire).is_ok());
        // Replaying the same ciphertext against the advanced IV state fails
        assert_eq!(unwrapper.unwrap(&wire), Err(ScpError::InvalidMac));
    }

    #[test]
    fn test_tampered_mac_rejected() {
        let (mut wrapper, mut unwrapper) = session_pair();
        let mut wire = wrapper.wrap(b"data");
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        assert_eq!(unwrapper.unwrap(&wire), Err(ScpError::InvalidMac));
    }

    #[test]
    fn test_unwrap_empty_is_empty() {
        let (_, mut unwrapper) = session_pair();
        assert_eq!(unwrapper.unwrap(&[]).unwrap(), Vec::<u8>::new());
    }
}
