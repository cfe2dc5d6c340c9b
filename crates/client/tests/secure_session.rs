//! End-to-end tests against a scripted fake device
//!
//! The fake implements the device side of the handshake (nonce exchange,
//! certificate chains, ephemeral ECDH) and a real secure channel, so these
//! tests exercise the client's authentication flow, IV chaining and
//! pagination exactly as a live device would.

use std::time::Duration;

use bytes::Bytes;

use tessera_apdu_core::{Command, Device, TransportError};
use tessera_client::client::DeviceClient;
use tessera_client::constants::{cert_role, ins, secure_ins};
use tessera_client::crypto::{PrivateKey, PublicKey};
use tessera_client::codec::{serialize, unserialize};
use tessera_client::error::{Error, ErrorKind};
use tessera_client::scp::{Scp, ScpError};

const TARGET_ID: u32 = 0x33000004;

fn version_info_payload() -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&TARGET_ID.to_be_bytes());
    payload.push(5);
    payload.extend_from_slice(b"2.1.0");
    payload.push(4);
    payload.extend_from_slice(&4u32.to_le_bytes());
    payload.push(3);
    payload.extend_from_slice(b"1.0");
    payload
}

fn app_record(name: &str) -> Vec<u8> {
    let mut record = Vec::new();
    record.push((1 + 4 + 32 + 32 + name.len()) as u8);
    record.extend_from_slice(&0x0800u32.to_be_bytes());
    record.extend_from_slice(&[0x11; 32]);
    record.extend_from_slice(&[0x22; 32]);
    record.push(name.len() as u8);
    record.extend_from_slice(name.as_bytes());
    record
}

/// Scripted device implementing the handshake and secure channel for real
#[derive(Debug)]
struct FakeSecureDevice {
    device_key: PrivateKey,
    device_nonce: [u8; 8],
    server_nonce: Option<[u8; 8]>,
    ephemeral: Option<PrivateKey>,
    client_ephemeral: Option<PublicKey>,
    scp: Option<Scp>,
    /// Scripted app-list pages, drained in order
    pages: Vec<Vec<u8>>,
    /// Unwrapped secure instructions seen, for assertions
    secure_instructions: Vec<u8>,
    /// Number of handshakes started
    handshakes: usize,
    /// Corrupt the MAC of the next wrapped response
    corrupt_next_mac: bool,
    pending: Option<Bytes>,
}

impl FakeSecureDevice {
    fn new(pages: Vec<Vec<u8>>) -> Self {
        Self {
            device_key: PrivateKey::generate(),
            device_nonce: [0xD1; 8],
            server_nonce: None,
            ephemeral: None,
            client_ephemeral: None,
            scp: None,
            pages,
            secure_instructions: Vec::new(),
            handshakes: 0,
            corrupt_next_mac: false,
            pending: None,
        }
    }

    fn certificate_entry(&mut self, index: u8) -> Vec<u8> {
        let header = [0x00u8];
        if index == 0 {
            let device_public = self.device_key.public_key().serialize();
            let mut to_sign = vec![cert_role::DEVICE];
            to_sign.extend_from_slice(&header);
            to_sign.extend_from_slice(&device_public);
            // Self-signed: the client tolerates this as a user-key device
            let signature = self.device_key.sign(&to_sign);

            let mut entry = serialize(&header).unwrap();
            entry.extend_from_slice(&serialize(&device_public).unwrap());
            entry.extend_from_slice(&serialize(&signature).unwrap());
            entry
        } else {
            let ephemeral = PrivateKey::generate();
            let ephemeral_public = ephemeral.public_key().serialize();

            let mut to_sign = vec![cert_role::DEVICE_EPHEMERAL];
            to_sign.extend_from_slice(&self.device_nonce);
            to_sign.extend_from_slice(&self.server_nonce.unwrap());
            to_sign.extend_from_slice(&ephemeral_public);
            let signature = self.device_key.sign(&to_sign);

            let mut entry = serialize(&header).unwrap();
            entry.extend_from_slice(&serialize(&ephemeral_public).unwrap());
            entry.extend_from_slice(&serialize(&signature).unwrap());
            self.ephemeral = Some(ephemeral);
            entry
        }
    }

    fn handle_secure(&mut self, wrapped: &[u8]) -> Vec<u8> {
        let scp = self.scp.as_mut().expect("secure channel not established");
        let plain = scp.unwrap(wrapped).expect("client sent an invalid wrap");
        let (&instruction, _payload) = plain.split_first().expect("empty secure payload");
        self.secure_instructions.push(instruction);

        let response = match instruction {
            secure_ins::LIST_APPS | secure_ins::LIST_APPS_CONTINUE => {
                if self.pages.is_empty() {
                    vec![0x01]
                } else {
                    self.pages.remove(0)
                }
            }
            secure_ins::GET_VERSION => version_info_payload(),
            _ => Vec::new(),
        };

        let scp = self.scp.as_mut().unwrap();
        let mut wire = scp.wrap(&response);
        if self.corrupt_next_mac {
            self.corrupt_next_mac = false;
            let last = wire.len() - 1;
            wire[last] ^= 0x01;
        }
        wire
    }

    fn handle(&mut self, frame: &[u8]) -> Vec<u8> {
        let command = Command::from_bytes(frame).expect("malformed APDU");
        let data = command.data().unwrap_or(&[]);

        let mut response = match command.ins {
            ins::GET_VERSION => version_info_payload(),
            ins::VALIDATE_TARGET_ID => Vec::new(),
            ins::INITIALIZE_AUTHENTICATION => {
                self.handshakes += 1;
                self.server_nonce = Some(data.try_into().expect("bad server nonce"));
                // 4 bytes of battery/format state, then the device nonce
                let mut payload = vec![0u8; 4];
                payload.extend_from_slice(&self.device_nonce);
                payload
            }
            ins::VALIDATE_CERTIFICATE => {
                if command.p1 == 0x80 {
                    // Final entry carries the client's ephemeral key
                    let (public_key, _) = unserialize(data).expect("bad certificate");
                    self.client_ephemeral = Some(PublicKey::from_sec1(public_key).unwrap());
                }
                Vec::new()
            }
            ins::GET_CERTIFICATE => {
                let index = u8::from(command.p1 == 0x80);
                self.certificate_entry(index)
            }
            ins::MUTUAL_AUTHENTICATE => {
                let ephemeral = self.ephemeral.take().expect("no device ephemeral");
                let client_public = self.client_ephemeral.as_ref().expect("no client key");
                let secret = ephemeral.exchange(client_public);
                self.scp = Some(Scp::new(secret.as_slice()));
                Vec::new()
            }
            ins::SECUINS => self.handle_secure(data),
            other => panic!("unexpected instruction {other:#04x}"),
        };

        response.extend_from_slice(&[0x90, 0x00]);
        response
    }
}

impl Device for FakeSecureDevice {
    fn name(&self) -> String {
        "fake-secure".to_string()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {}

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let response = self.handle(data);
        self.pending = Some(Bytes::from(response));
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<Bytes, TransportError> {
        self.pending.take().ok_or(TransportError::Timeout)
    }
}

#[test]
fn list_apps_paginates_until_empty_page() {
    let mut page1 = vec![0x01];
    page1.extend_from_slice(&app_record("Bitcoin"));
    // Page 2 is a valid list with zero records
    let device = FakeSecureDevice::new(vec![page1, vec![0x01]]);
    let mut client = DeviceClient::new(device);

    let apps = client.list_apps().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name, "Bitcoin");
    assert_eq!(apps[0].flags, 0x0800);

    let device = client.device_mut();
    assert_eq!(device.handshakes, 1);
    assert_eq!(
        device.secure_instructions,
        vec![secure_ins::LIST_APPS, secure_ins::LIST_APPS_CONTINUE]
    );
}

#[test]
fn secure_version_info_round_trips() {
    let mut client = DeviceClient::new(FakeSecureDevice::new(Vec::new()));

    let info = client.get_version_info_secure().unwrap();
    assert_eq!(info.target_id, TARGET_ID);
    assert_eq!(info.device_name(), "Ledger Nano X");
    assert!(info.is_onboarded());
}

#[test]
fn channel_is_reused_across_operations() {
    let mut page = vec![0x01];
    page.extend_from_slice(&app_record("App"));
    let mut client = DeviceClient::new(FakeSecureDevice::new(vec![page, vec![0x01]]));

    client.get_version_info_secure().unwrap();
    client.list_apps().unwrap();
    client.delete_app_by_name("App").unwrap();

    // One handshake serves all subsequent secure exchanges
    assert_eq!(client.device_mut().handshakes, 1);
    assert_eq!(
        client.device_mut().secure_instructions.last(),
        Some(&secure_ins::DELETE_APP)
    );
}

#[test]
fn mac_corruption_tears_down_channel() {
    let mut client = DeviceClient::new(FakeSecureDevice::new(Vec::new()));

    client.get_version_info_secure().unwrap();
    client.device_mut().corrupt_next_mac = true;

    let err = client.get_memory_info().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Crypto);
    assert!(matches!(err, Error::Scp(ScpError::InvalidMac)));

    // The fake device also lost sync (it wrapped a response the client
    // rejected), so it needs a fresh channel too
    client.device_mut().scp = None;
    client.get_version_info_secure().unwrap();
    assert_eq!(client.device_mut().handshakes, 2);
}

#[test]
fn explicit_reset_forces_new_handshake() {
    let mut client = DeviceClient::new(FakeSecureDevice::new(Vec::new()));

    client.get_version_info_secure().unwrap();
    assert_eq!(client.device_mut().handshakes, 1);

    client.reset().unwrap();
    client.get_version_info_secure().unwrap();
    assert_eq!(client.device_mut().handshakes, 2);
}
