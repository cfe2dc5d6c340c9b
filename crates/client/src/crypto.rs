//! Elliptic-curve primitives used by the secure channel protocol
//!
//! Thin wrappers around `k256` exposing exactly the capabilities the
//! handshake needs: DER-encoded ECDSA signatures over SHA-256, uncompressed
//! SEC1 key serialization, and the device's point-compression-hash flavour
//! of ECDH.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::ProjectivePoint;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Errors raised by key material handling
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// A public key is not a valid uncompressed SEC1 point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// A private key scalar is out of range
    #[error("invalid private key")]
    InvalidPrivateKey,
}

/// A secp256k1 public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(k256::PublicKey);

impl PublicKey {
    /// Parse an uncompressed SEC1 point (65 bytes, leading 0x04)
    pub fn from_sec1(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 65 || bytes[0] != 0x04 {
            return Err(CryptoError::InvalidPublicKey);
        }
        k256::PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Serialize as an uncompressed SEC1 point
    pub fn serialize(&self) -> Vec<u8> {
        self.0.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Verify a DER-encoded ECDSA signature over SHA-256(`msg`)
    pub fn verify(&self, msg: &[u8], der_signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_der(der_signature) else {
            return false;
        };
        VerifyingKey::from(&self.0).verify(msg, &signature).is_ok()
    }
}

/// A secp256k1 private key
#[derive(Debug, Clone)]
pub struct PrivateKey(k256::SecretKey);

impl PrivateKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        Self(k256::SecretKey::random(&mut rand_v8::thread_rng()))
    }

    /// Parse a 32-byte big-endian scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        k256::SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPrivateKey)
    }

    /// The corresponding public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// Serialize the scalar, big-endian
    pub fn serialize(&self) -> Zeroizing<[u8; 32]> {
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(self.0.to_bytes().as_slice());
        out
    }

    /// Produce a canonical (low-S) DER-encoded ECDSA signature over
    /// SHA-256(`msg`)
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        let signing_key = SigningKey::from(&self.0);
        let signature: Signature = signing_key.sign(msg);
        signature.to_der().as_bytes().to_vec()
    }

    /// ECDH as the secure element computes it: SHA-256 over the compressed
    /// encoding (parity prefix + big-endian X) of the shared point, not the
    /// raw X coordinate.
    pub fn exchange(&self, peer: &PublicKey) -> Zeroizing<[u8; 32]> {
        let point = ProjectivePoint::from(*peer.0.as_affine()) * *self.0.to_nonzero_scalar();
        let compressed = point.to_affine().to_encoded_point(true);

        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(Sha256::digest(compressed.as_bytes()).as_slice());
        secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const RAW_PRIVATE: [u8; 32] =
        hex!("c2cdf0a8b0a83b35ace53f097b5e6e6a0a1f2d40535eff1cf434f52a43d59d8f");
    const RAW_PUBLIC: [u8; 64] = hex!(
        "6fcc37ea5e9e09fec6c83e5fbd7a745e3eee81d16ebd861c9e66f55518c19798"
        "4e9f113c07f875691df8afc1029496fc4cb9509b39dcd38f251a83359cc8b4f7"
    );

    fn sample_public() -> Vec<u8> {
        let mut bytes = vec![0x04];
        bytes.extend_from_slice(&RAW_PUBLIC);
        bytes
    }

    #[test]
    fn test_public_key_from_private() {
        let key = PrivateKey::from_bytes(&RAW_PRIVATE).unwrap();
        assert_eq!(key.public_key().serialize(), sample_public());
        assert_eq!(*key.serialize(), RAW_PRIVATE);
    }

    #[test]
    fn test_public_key_requires_uncompressed_point() {
        assert_eq!(PublicKey::from_sec1(&[]), Err(CryptoError::InvalidPublicKey));
        let mut compressed_prefix = sample_public();
        compressed_prefix[0] = 0x02;
        assert_eq!(
            PublicKey::from_sec1(&compressed_prefix),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_sign_verify() {
        let key = PrivateKey::from_bytes(&RAW_PRIVATE).unwrap();
        let blob = b"someblobofdata";
        let signature = key.sign(blob);
        assert!(key.public_key().verify(blob, &signature));
        assert!(!key.public_key().verify(b"otherblob", &signature));
        assert!(!key.public_key().verify(blob, &[0x30, 0x00]));
    }

    #[test]
    fn test_exchange_is_symmetric() {
        let a = PrivateKey::generate();
        let b = PrivateKey::generate();
        assert_eq!(*a.exchange(&b.public_key()), *b.exchange(&a.public_key()));
    }
}
