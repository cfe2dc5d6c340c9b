//! In-process authentication peer
//!
//! Signs the handshake with a local private key and verifies the device
//! certificate chain against the issuer key material it carries.

use rand::RngCore;
use tracing::warn;
use zeroize::Zeroizing;

use super::{AuthPeer, CertificateEntry, NONCE_LENGTH};
use crate::codec::{serialize, unserialize};
use crate::constants::cert_role;
use crate::crypto::{PrivateKey, PublicKey};
use crate::error::{Error, Result};
use crate::scp::ScpError;

/// Authentication peer backed by an in-process private key
pub struct SoftAuthPeer {
    master: PrivateKey,
    /// Fixed first chain entry, when issued by a CA instead of self-signed
    certificate: Option<CertificateEntry>,
    device_nonce: Option<[u8; NONCE_LENGTH]>,
    server_nonce: Option<[u8; NONCE_LENGTH]>,
    ephemeral: Option<PrivateKey>,
    shared_secret: Option<Zeroizing<[u8; 32]>>,
}

impl std::fmt::Debug for SoftAuthPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftAuthPeer")
            .field("has_certificate", &self.certificate.is_some())
            .finish_non_exhaustive()
    }
}

impl SoftAuthPeer {
    /// Create a peer that self-signs its chain with `master`
    pub fn new(master: PrivateKey) -> Self {
        Self {
            master,
            certificate: None,
            device_nonce: None,
            server_nonce: None,
            ephemeral: None,
            shared_secret: None,
        }
    }

    /// Use a fixed, CA-issued certificate as the first chain entry
    pub fn with_certificate(mut self, certificate: CertificateEntry) -> Self {
        self.certificate = Some(certificate);
        self
    }

    fn nonces(&self) -> Result<([u8; NONCE_LENGTH], [u8; NONCE_LENGTH])> {
        match (self.server_nonce, self.device_nonce) {
            (Some(server), Some(device)) => Ok((server, device)),
            _ => Err(ScpError::Handshake("nonces not exchanged").into()),
        }
    }
}

impl AuthPeer for SoftAuthPeer {
    fn get_nonce(&mut self) -> Result<[u8; NONCE_LENGTH]> {
        let mut nonce = [0u8; NONCE_LENGTH];
        rand::rng().fill_bytes(&mut nonce);
        self.server_nonce = Some(nonce);
        Ok(nonce)
    }

    fn send_nonce(&mut self, nonce: &[u8]) -> Result<()> {
        let nonce: [u8; NONCE_LENGTH] = nonce
            .try_into()
            .map_err(|_| Error::InvalidArgument("device nonce must be 8 bytes"))?;
        self.device_nonce = Some(nonce);
        Ok(())
    }

    fn receive_certificate_chain(&mut self) -> Result<Vec<CertificateEntry>> {
        let (server_nonce, device_nonce) = self.nonces()?;
        let mut chain = Vec::with_capacity(2);

        if let Some(certificate) = &self.certificate {
            chain.push(certificate.clone());
        } else {
            let master_public = self.master.public_key().serialize();
            let mut to_sign = vec![cert_role::SIGNER];
            to_sign.extend_from_slice(&master_public);
            let signature = self.master.sign(&to_sign);

            let mut entry = serialize(&master_public)?;
            entry.extend_from_slice(&serialize(&signature)?);
            chain.push(entry);
        }

        // The ephemeral certificate binds this handshake's nonce pair and is
        // signed with the master key
        let ephemeral = PrivateKey::generate();
        let ephemeral_public = ephemeral.public_key().serialize();

        let mut to_sign = vec![cert_role::SIGNER_EPHEMERAL];
        to_sign.extend_from_slice(&server_nonce);
        to_sign.extend_from_slice(&device_nonce);
        to_sign.extend_from_slice(&ephemeral_public);
        let signature = self.master.sign(&to_sign);

        let mut entry = serialize(&ephemeral_public)?;
        entry.extend_from_slice(&serialize(&signature)?);
        chain.push(entry);

        self.ephemeral = Some(ephemeral);
        Ok(chain)
    }

    fn send_certificate_chain(&mut self, chain: Vec<CertificateEntry>) -> Result<()> {
        let (server_nonce, device_nonce) = self.nonces()?;
        let ephemeral = self
            .ephemeral
            .take()
            .ok_or(ScpError::Handshake("server chain not sent yet"))?;

        let mut last_public_key = self.master.public_key();
        for (index, entry) in chain.iter().enumerate() {
            let (header, rest) = unserialize(entry)?;
            let (public_key, rest) = unserialize(rest)?;
            let (signature, _) = unserialize(rest)?;

            let signed_data = if index == 0 {
                // The first entry carries a header holding the key's role
                let mut data = vec![cert_role::DEVICE];
                data.extend_from_slice(header);
                data.extend_from_slice(public_key);
                data
            } else {
                let mut data = vec![cert_role::DEVICE_EPHEMERAL];
                data.extend_from_slice(&device_nonce);
                data.extend_from_slice(&server_nonce);
                data.extend_from_slice(public_key);
                data
            };

            if !last_public_key.verify(&signed_data, signature) {
                if index != 0 {
                    return Err(ScpError::BrokenCertificateChain.into());
                }
                // Inherited trust asymmetry: an unverifiable first entry is
                // treated as a device running on a user key, not an attack
                warn!("device certificate not issuer-signed, loading from user key");
            }
            last_public_key = PublicKey::from_sec1(public_key)?;
        }

        self.shared_secret = Some(ephemeral.exchange(&last_public_key));
        Ok(())
    }

    fn shared_secret(&self) -> Option<Zeroizing<[u8; 32]>> {
        self.shared_secret.clone()
    }
}
