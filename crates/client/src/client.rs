//! Device management client
//!
//! [`DeviceClient`] owns one transport handle and the secure channel state
//! established over it, and exposes the high-level management operations as
//! sequences of plain and secure-wrapped APDUs. One client per device; calls
//! mutate chained channel state and must be totally ordered.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::debug;
use zeroize::Zeroizing;

use tessera_apdu_core::{Command, Device, Response, TransportError};

use crate::constants::{ins, secure_ins, DEFAULT_CLA, P1_LAST_CERTIFICATE};
use crate::crypto::PrivateKey;
use crate::error::{Error, Result};
use crate::image::{HexImage, ImageError, Segment};
use crate::manifest::AppManifest;
use crate::peer::{AuthPeer, SoftAuthPeer};
use crate::scp::{Scp, ScpError, MAC_LENGTH};
use crate::types::{parse_app_list, AppInfo, MemoryInfo, VersionInfo};

#[cfg(feature = "remote")]
use crate::peer::{HsmAuthPeer, HsmScript};

/// Secure instruction byte plus the 2-byte intra-window offset of a LOAD
const LOAD_CHUNK_HEADER_LENGTH: usize = 3;

/// ISO 9797 padding appends at least one byte
const MIN_PADDING_LENGTH: usize = 1;

/// Payload budget of a single secure exchange
const SECURE_PAYLOAD_BUDGET: usize = 0xF0;

/// LOAD offsets are 16-bit, so the cursor is re-anchored every 64 KiB
const LOAD_WINDOW: usize = 0x10000;

/// Client for one secure element device
#[derive(Debug)]
pub struct DeviceClient<D: Device> {
    device: D,
    cla: u8,
    private_key: PrivateKey,
    target_id: Option<u32>,
    scp: Option<Scp>,
}

impl<D: Device> DeviceClient<D> {
    /// Create a client over an opened device with a fresh client key
    pub fn new(device: D) -> Self {
        Self::with_private_key(device, PrivateKey::generate())
    }

    /// Create a client authenticating with a persistent client key
    pub fn with_private_key(device: D, private_key: PrivateKey) -> Self {
        Self {
            device,
            cla: DEFAULT_CLA,
            private_key,
            target_id: None,
            scp: None,
        }
    }

    /// Override the command class byte
    pub const fn with_cla(mut self, cla: u8) -> Self {
        self.cla = cla;
        self
    }

    /// The underlying device
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Close the device handle
    pub fn close(&mut self) {
        self.scp = None;
        self.device.close();
    }

    /// Exchange one raw frame with the device
    pub fn raw_exchange(&mut self, data: &[u8]) -> Result<Bytes> {
        debug!("=> {}", hex::encode(data));
        let response = self.device.exchange(data)?;
        if !response.is_empty() {
            debug!("<= {}", hex::encode(&response));
        }
        Ok(response)
    }

    /// Exchange one plain APDU, returning the payload
    ///
    /// Accepts only `90 00` and `61 XX` status words; everything else maps to
    /// a device status error, which leaves the channel state untouched. The
    /// caller decides whether to retry the whole operation.
    pub fn apdu_exchange(&mut self, ins: u8, data: &[u8], p1: u8, p2: u8) -> Result<Bytes> {
        let command = Command::new(self.cla, ins, p1, p2).with_data(data.to_vec());
        let frame = command.to_bytes().map_err(Error::from)?;

        let raw = match self.raw_exchange(&frame) {
            Ok(raw) => raw,
            Err(e) => {
                // A desynchronized chunk stream also invalidates the channel
                if matches!(e, Error::Transport(TransportError::Framing(_))) {
                    self.scp = None;
                }
                return Err(e);
            }
        };
        Ok(Response::from_bytes(&raw)
            .and_then(Response::into_payload)
            .map_err(Error::from)?)
    }

    /// Exchange one secure-wrapped instruction, lazily establishing the
    /// secure channel on first use
    pub fn apdu_secure_exchange(&mut self, secure_ins: u8, data: &[u8]) -> Result<Bytes> {
        self.ensure_secure_channel()?;

        let mut plain = Vec::with_capacity(1 + data.len());
        plain.push(secure_ins);
        plain.extend_from_slice(data);

        let scp = self
            .scp
            .as_mut()
            .ok_or(ScpError::Handshake("secure channel not established"))?;
        let wrapped = scp.wrap(&plain);

        let response = self.apdu_exchange(ins::SECUINS, &wrapped, 0, 0)?;

        let scp = self
            .scp
            .as_mut()
            .ok_or(ScpError::Handshake("secure channel not established"))?;
        match scp.unwrap(&response) {
            Ok(payload) => Ok(Bytes::from(payload)),
            Err(e) => {
                // Cryptographic failures are fatal to the channel; force a
                // fresh handshake before the next secure call
                self.scp = None;
                Err(e.into())
            }
        }
    }

    fn ensure_secure_channel(&mut self) -> Result<()> {
        if self.scp.is_some() {
            return Ok(());
        }

        let mut peer = SoftAuthPeer::new(self.private_key.clone());
        let secret = self
            .authenticate(&mut peer)?
            .ok_or(ScpError::MissingSharedSecret)?;
        self.scp = Some(Scp::new(secret.as_slice()));
        Ok(())
    }

    /// Run the mutual authentication handshake against `peer`
    ///
    /// Returns the negotiated shared secret when the peer derives one
    /// locally; a remote peer keeps it and returns `None`.
    pub fn authenticate(&mut self, peer: &mut dyn AuthPeer) -> Result<Option<Zeroizing<[u8; 32]>>> {
        self.reset()?;
        let target_id = self.target_id()?;
        if target_id & 0xF < 2 {
            return Err(Error::UnsupportedTarget(target_id));
        }

        // Nonce exchange
        let server_nonce = peer.get_nonce()?;
        let data = self.apdu_exchange(ins::INITIALIZE_AUTHENTICATION, &server_nonce, 0, 0)?;
        let device_nonce = data
            .get(4..12)
            .ok_or(crate::codec::CodecError::TruncatedInput)?;
        peer.send_nonce(device_nonce)?;

        // Server certificate chain, last entry flagged
        let server_chain = peer.receive_certificate_chain()?;
        let last = server_chain.len().saturating_sub(1);
        for (index, certificate) in server_chain.iter().enumerate() {
            let p1 = if index == last { P1_LAST_CERTIFICATE } else { 0 };
            self.apdu_exchange(ins::VALIDATE_CERTIFICATE, certificate, p1, 0)?;
        }

        // Device certificate chain; an empty response ends the walk early
        let mut device_chain = Vec::with_capacity(2);
        for index in 0..2 {
            let p1 = if index == 0 { 0 } else { P1_LAST_CERTIFICATE };
            let certificate = self.apdu_exchange(ins::GET_CERTIFICATE, &[], p1, 0)?;
            if certificate.is_empty() {
                break;
            }
            device_chain.push(certificate.to_vec());
        }
        peer.send_certificate_chain(device_chain)?;

        self.apdu_exchange(ins::MUTUAL_AUTHENTICATE, &[], 0, 0)?;
        Ok(peer.shared_secret())
    }

    /// Read version information with a plain exchange
    pub fn get_version_info(&mut self) -> Result<VersionInfo> {
        let data = self.apdu_exchange(ins::GET_VERSION, &[], 0, 0)?;
        let info = VersionInfo::parse(&data)?;
        self.target_id = Some(info.target_id);
        Ok(info)
    }

    /// Read version information over the secure channel
    pub fn get_version_info_secure(&mut self) -> Result<VersionInfo> {
        let data = self.apdu_secure_exchange(secure_ins::GET_VERSION, &[])?;
        let info = VersionInfo::parse(&data)?;
        self.target_id = Some(info.target_id);
        Ok(info)
    }

    /// Target id of the connected device, fetched on first use
    pub fn target_id(&mut self) -> Result<u32> {
        match self.target_id {
            Some(target_id) => Ok(target_id),
            None => Ok(self.get_version_info()?.target_id),
        }
    }

    /// Ask the device to validate a target id
    pub fn validate_target_id(&mut self, target_id: u32) -> Result<()> {
        self.apdu_exchange(ins::VALIDATE_TARGET_ID, &target_id.to_be_bytes(), 0, 0)?;
        Ok(())
    }

    /// Revalidate the target and invalidate any established secure channel
    pub fn reset(&mut self) -> Result<()> {
        let target_id = self.target_id()?;
        self.validate_target_id(target_id)?;
        self.scp = None;
        Ok(())
    }

    /// Read memory usage over the secure channel
    pub fn get_memory_info(&mut self) -> Result<MemoryInfo> {
        let data = self.apdu_secure_exchange(secure_ins::GET_MEMORY_INFORMATION, &[])?;
        Ok(MemoryInfo::parse(&data)?)
    }

    /// Iterate installed applications, requesting pages lazily
    pub fn apps(&mut self) -> AppIterator<'_, D> {
        AppIterator {
            client: self,
            page: VecDeque::new(),
            started: false,
            exhausted: false,
        }
    }

    /// List installed applications
    pub fn list_apps(&mut self) -> Result<Vec<AppInfo>> {
        self.apps().collect()
    }

    /// Install the application described by `manifest`
    ///
    /// A device status error at any step aborts the install; partially
    /// loaded applications are not rolled back and must be deleted before a
    /// clean retry.
    pub fn install_app(&mut self, manifest: &dyn AppManifest) -> Result<()> {
        let target_id = self.target_id()?;
        manifest.assert_compatible_device(target_id)?;

        let mut image = HexImage::from_file(&manifest.binary_path(target_id)?)?;
        let data_size = manifest.data_size(target_id);
        let code_length = image
            .span()
            .checked_sub(data_size)
            .ok_or(Error::InvalidArgument("data size exceeds image span"))?;
        if code_length % 64 != 0 {
            // Caught before any device interaction
            return Err(Error::MisalignedImage(code_length));
        }

        let flags = manifest.application_flags(target_id);
        let params = manifest.serialize_parameters(target_id)?;
        let entry_point = image.entry_point().ok_or(ImageError::MissingEntryPoint)?;
        let main_address = entry_point
            .checked_sub(image.min_addr())
            .ok_or(Error::InvalidArgument("entry point outside image"))?;

        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&code_length.to_be_bytes());
        payload.extend_from_slice(&data_size.to_be_bytes());
        payload.extend_from_slice(&(params.len() as u32).to_be_bytes());
        payload.extend_from_slice(&flags.to_be_bytes());
        payload.extend_from_slice(&main_address.to_be_bytes());
        self.apdu_secure_exchange(secure_ins::CREATE_APP, &payload)?;

        // The serialized parameters ride along at the end of the image
        image.append(&params);

        let image_base = image.min_addr();
        for segment in image.segments() {
            self.load_segment(segment, image_base)?;
        }
        self.apdu_secure_exchange(secure_ins::COMMIT, &[])?;
        Ok(())
    }

    /// Load one contiguous segment, re-anchoring the cursor per 64 KiB window
    fn load_segment(&mut self, segment: &Segment, image_base: u32) -> Result<()> {
        // Chunks are sized so header, padding and MAC fit the budget together
        let max_chunk_size =
            SECURE_PAYLOAD_BUDGET - LOAD_CHUNK_HEADER_LENGTH - MIN_PADDING_LENGTH - MAC_LENGTH;

        for (window_index, window) in segment.data.chunks(LOAD_WINDOW).enumerate() {
            let window_start = segment.start + (window_index * LOAD_WINDOW) as u32;
            let load_offset = window_start - image_base;
            self.apdu_secure_exchange(secure_ins::SET_LOAD_OFFSET, &load_offset.to_be_bytes())?;

            let mut chunk_offset: usize = 0;
            for chunk in window.chunks(max_chunk_size) {
                let mut data = Vec::with_capacity(2 + chunk.len());
                data.extend_from_slice(&(chunk_offset as u16).to_be_bytes());
                data.extend_from_slice(chunk);
                self.apdu_secure_exchange(secure_ins::LOAD, &data)?;
                chunk_offset += chunk.len();
            }
        }
        Ok(())
    }

    /// Delete an application by name
    pub fn delete_app_by_name(&mut self, name: &str) -> Result<()> {
        let data = crate::codec::serialize(name.as_bytes())?;
        self.apdu_secure_exchange(secure_ins::DELETE_APP, &data)?;
        Ok(())
    }

    /// Delete an application by its exact 32-byte content hash
    pub fn delete_app_by_hash(&mut self, hash: &[u8]) -> Result<()> {
        if hash.len() != 32 {
            // Local error; nothing is sent to the device
            return Err(Error::InvalidArgument("app hash must be 32 bytes"));
        }
        self.apdu_secure_exchange(secure_ins::DELETE_APP_BY_HASH, hash)?;
        Ok(())
    }

    /// Run an installed application by name
    pub fn run_app(&mut self, name: &str) -> Result<()> {
        self.apdu_exchange(ins::RUN_APP, name.as_bytes(), 0, 0)?;
        Ok(())
    }

    /// Install a custom certificate authority
    pub fn install_ca(&mut self, name: &str, public_key: &[u8]) -> Result<()> {
        let mut data = crate::codec::serialize(name.as_bytes())?;
        data.extend_from_slice(&crate::codec::serialize(public_key)?);
        self.apdu_secure_exchange(secure_ins::SETUP_CUSTOM_CERTIFICATE, &data)?;
        Ok(())
    }

    /// Delete the custom certificate authority
    pub fn delete_ca(&mut self) -> Result<()> {
        self.apdu_secure_exchange(secure_ins::RESET_CUSTOM_CERTIFICATE, &[])?;
        Ok(())
    }
}

#[cfg(feature = "remote")]
impl<D: Device> DeviceClient<D> {
    /// Replay a stream of concatenated raw APDUs from a remote server
    fn replay_apdu_stream(&mut self, stream: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < stream.len() {
            let header_end = offset + 5;
            if stream.len() < header_end {
                return Err(crate::codec::CodecError::TruncatedInput.into());
            }
            let end = header_end + stream[offset + 4] as usize;
            if stream.len() < end {
                return Err(crate::codec::CodecError::TruncatedInput.into());
            }
            self.raw_exchange(&stream[offset..end])?;
            offset = end;
        }
        Ok(())
    }

    /// Authenticate through the HSM and replay the distribution stream it
    /// produces for `app_path`
    pub fn install_remote_app(
        &mut self,
        app_path: &str,
        key_path: &str,
        url: &str,
        key: &str,
    ) -> Result<()> {
        let script = HsmScript::new("distributeFirmware11", &[("persoKey", key), ("scpv2", "dummy")]);
        let mut peer = HsmAuthPeer::new(script, url);
        self.authenticate(&mut peer)?;

        let stream = peer.query(
            None,
            Some(&[
                ("firmware", app_path),
                ("firmwareKey", key_path),
                ("scpv2", "dummy"),
            ]),
        )?;
        self.replay_apdu_stream(&stream)
    }

    /// Delete an application through the HSM
    pub fn delete_remote_app(
        &mut self,
        app_path: &str,
        key_path: &str,
        url: &str,
        key: &str,
    ) -> Result<()> {
        let script = HsmScript::new("deleteApplication", &[("persoKey", key), ("scpv2", "dummy")]);
        let mut peer = HsmAuthPeer::new(script, url);
        self.authenticate(&mut peer)?;

        let stream = peer.query(
            None,
            Some(&[
                ("firmware", app_path),
                ("firmwareKey", key_path),
                ("scpv2", "dummy"),
            ]),
        )?;
        self.replay_apdu_stream(&stream)
    }

    /// Upgrade the device firmware through the HSM distribution script
    pub fn upgrade_firmware(
        &mut self,
        firmware_name: &str,
        firmware_key: &str,
        url: &str,
        key: &str,
    ) -> Result<()> {
        self.install_remote_app(firmware_name, firmware_key, url, key)
    }

    /// Check device genuineness through the HSM
    ///
    /// The HSM drives the device over forwarded APDUs until it is satisfied.
    pub fn genuine_check(&mut self, url: &str, key: &str) -> Result<bool> {
        let script = HsmScript::new("checkGenuine", &[("persoKey", key), ("scpv2", "dummy")]);
        let mut peer = HsmAuthPeer::new(script, url);
        self.authenticate(&mut peer)?;

        let mut client_data = Vec::new();
        loop {
            let data = peer.query(Some(&client_data), None)?;
            if data.len() < 5 {
                break;
            }
            client_data = self.raw_exchange(&data)?.to_vec();
        }
        Ok(true)
    }

    /// Create a device endorsement signed by the HSM for key slot `key_id`
    pub fn endorse(&mut self, key_id: u8, url: &str, key: &str) -> Result<()> {
        let script = HsmScript::new("signEndorsement", &[("persoKey", key)]);
        let mut peer = HsmAuthPeer::new(script, url);
        self.authenticate(&mut peer)?;
        // Commit the endorsement agreement
        peer.query(None, None)?;

        let data = self.apdu_exchange(ins::ENDORSE_SET_START, &[], key_id, 0)?;
        let certificate = peer.query(Some(&data), Some(&[("endorsementKey", "attest_1")]))?;
        self.apdu_exchange(ins::ENDORSE_SET_COMMIT, &certificate, 0, 0)?;
        Ok(())
    }

    /// List installed applications through the HSM
    ///
    /// The HSM forwards APDUs through us until it answers with the app-list
    /// payload itself instead of another APDU.
    pub fn list_apps_remote(&mut self, url: &str, key: &str) -> Result<Vec<AppInfo>> {
        let script = HsmScript::new("listApps", &[("persoKey", key), ("scpv2", "dummy")]);
        let mut peer = HsmAuthPeer::new(script, url);
        self.authenticate(&mut peer)?;

        let mut device_data = Vec::new();
        loop {
            let data = peer.query(Some(&device_data), None)?;
            // A forwarded APDU is exactly header plus declared payload
            let is_apdu = data.len() >= 5 && data.len() == 5 + data[4] as usize;
            if !is_apdu {
                if data.is_empty() {
                    return Ok(Vec::new());
                }
                return Ok(parse_app_list(&data)?);
            }
            device_data = self.raw_exchange(&data)?.to_vec();
        }
    }
}

/// Lazy, restartable iterator over installed applications
///
/// Pages are requested on demand; the iterator reaches its terminal state
/// when the device returns a page with zero records.
#[derive(Debug)]
pub struct AppIterator<'a, D: Device> {
    client: &'a mut DeviceClient<D>,
    page: VecDeque<AppInfo>,
    started: bool,
    exhausted: bool,
}

impl<D: Device> Iterator for AppIterator<'_, D> {
    type Item = Result<AppInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(app) = self.page.pop_front() {
                return Some(Ok(app));
            }
            if self.exhausted {
                return None;
            }

            let instruction = if self.started {
                secure_ins::LIST_APPS_CONTINUE
            } else {
                secure_ins::LIST_APPS
            };
            self.started = true;

            match self.client.apdu_secure_exchange(instruction, &[]) {
                Ok(data) if data.is_empty() => self.exhausted = true,
                Ok(data) => match parse_app_list(&data) {
                    Ok(apps) if apps.is_empty() => self.exhausted = true,
                    Ok(apps) => self.page.extend(apps),
                    Err(e) => {
                        self.exhausted = true;
                        return Some(Err(e.into()));
                    }
                },
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
