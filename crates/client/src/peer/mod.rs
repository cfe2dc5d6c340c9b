//! Authentication peers for the secure channel handshake
//!
//! The handshake authenticates the client side through a peer that owns the
//! signing key material: either an in-process key ([`SoftAuthPeer`]) or a
//! remote HSM reached over scripted HTTP queries ([`HsmAuthPeer`]). The
//! device session drives the same handshake steps against either.

mod soft;

#[cfg(feature = "remote")]
mod hsm;

pub use soft::SoftAuthPeer;

#[cfg(feature = "remote")]
pub use hsm::{HsmAuthPeer, HsmScript, DEFAULT_HSM_KEY, DEFAULT_HSM_URL};

use zeroize::Zeroizing;

use crate::error::Result;

/// Length of handshake nonces
pub const NONCE_LENGTH: usize = 8;

/// One entry of a certificate chain: opaque, length-prefixed fields as sent
/// on the wire
pub type CertificateEntry = Vec<u8>;

/// Peer driving the authentication side of the handshake
pub trait AuthPeer {
    /// Produce the server nonce for this handshake attempt
    fn get_nonce(&mut self) -> Result<[u8; NONCE_LENGTH]>;

    /// Learn the device nonce
    fn send_nonce(&mut self, nonce: &[u8]) -> Result<()>;

    /// Produce the server certificate chain (1 or 2 entries)
    fn receive_certificate_chain(&mut self) -> Result<Vec<CertificateEntry>>;

    /// Verify the device certificate chain and derive the shared secret
    fn send_certificate_chain(&mut self, chain: Vec<CertificateEntry>) -> Result<()>;

    /// The negotiated shared secret, if this peer derives one locally
    ///
    /// A remote peer keeps the secret on its side and returns `None`; secure
    /// operations then stay with the peer rather than a local channel.
    fn shared_secret(&self) -> Option<Zeroizing<[u8; 32]>> {
        None
    }
}
