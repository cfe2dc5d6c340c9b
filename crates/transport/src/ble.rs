//! BLE transport framing
//!
//! BLE frames are chunked to a small MTU. Every chunk starts with the APDU
//! tag and a big-endian sequence index; chunk 0 additionally carries the
//! 2-byte total frame length. Responses arrive as asynchronous notifications,
//! which the link surfaces as a blocking chunk queue.
//!
//! OS-level GATT plumbing (scanning, connecting, characteristic writes and
//! notification subscriptions) lives behind the [`BleLink`] trait; this
//! module owns only the chunking and reassembly protocol.

use std::fmt;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tessera_apdu_core::{Device, TransportError};

/// APDU tag carried by every chunk
const TAG: u8 = 0x05;

/// Negotiated MTU of the write characteristic
pub const DEFAULT_MTU: usize = 0x99;

/// Prefix devices advertise under when pairable
pub const DEVICE_NAME_PREFIX: &str = "Nano X";

/// Low-level GATT link: one writable characteristic plus a notification queue
pub trait BleLink: fmt::Debug {
    /// Peer identifier, e.g. the advertised device name
    fn peer(&self) -> String;

    /// Connect and enable notifications
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the connection down
    fn disconnect(&mut self);

    /// Write one chunk to the characteristic
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError>;

    /// Take the next notification chunk, blocking up to `timeout`
    fn read_chunk(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

/// BLE-attached device, generic over the underlying GATT link
#[derive(Debug)]
pub struct BleTransport<L: BleLink> {
    link: L,
    mtu: usize,
}

impl<L: BleLink> BleTransport<L> {
    /// Create a transport over `link` with the default MTU
    pub const fn new(link: L) -> Self {
        Self {
            link,
            mtu: DEFAULT_MTU,
        }
    }

    /// Override the negotiated MTU
    pub const fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }
}

impl<L: BleLink> Device for BleTransport<L> {
    fn name(&self) -> String {
        format!("ble:{}", self.link.peer())
    }

    fn open(&mut self) -> Result<(), TransportError> {
        self.link.connect()
    }

    fn close(&mut self) {
        self.link.disconnect();
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut offset = 0;
        let mut seq_idx = 0u16;
        while offset < data.len() || seq_idx == 0 {
            let mut chunk = BytesMut::with_capacity(self.mtu);
            chunk.put_u8(TAG);
            chunk.put_u16(seq_idx);
            if seq_idx == 0 {
                chunk.put_u16(data.len() as u16);
            }
            let take = (self.mtu - chunk.len()).min(data.len() - offset);
            chunk.put_slice(&data[offset..offset + take]);
            self.link.write_chunk(&chunk)?;
            offset += take;
            seq_idx += 1;
        }
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Bytes, TransportError> {
        let chunk = self.link.read_chunk(timeout)?;
        if chunk.len() < 5 {
            return Err(TransportError::Framing("short first chunk"));
        }
        if chunk[0] != TAG {
            return Err(TransportError::Framing("unexpected tag"));
        }
        if chunk[1..3] != [0, 0] {
            return Err(TransportError::Framing("unexpected sequence index"));
        }
        let total = u16::from_be_bytes([chunk[3], chunk[4]]) as usize;

        let mut data = BytesMut::with_capacity(total);
        data.put_slice(&chunk[5..]);

        let mut seq_idx = 1u16;
        while data.len() < total {
            let chunk = self.link.read_chunk(timeout)?;
            if chunk.len() < 3 {
                return Err(TransportError::Framing("short continuation chunk"));
            }
            if chunk[0] != TAG {
                return Err(TransportError::Framing("unexpected tag"));
            }
            if chunk[1..3] != seq_idx.to_be_bytes() {
                return Err(TransportError::Framing("unexpected sequence index"));
            }
            data.put_slice(&chunk[3..]);
            seq_idx += 1;
        }

        if data.len() != total {
            return Err(TransportError::Framing("reassembled length mismatch"));
        }
        Ok(data.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory link echoing a scripted notification queue
    #[derive(Debug, Default)]
    struct LoopbackLink {
        written: Vec<Vec<u8>>,
        notifications: VecDeque<Vec<u8>>,
    }

    impl BleLink for LoopbackLink {
        fn peer(&self) -> String {
            "loopback".to_string()
        }

        fn connect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn disconnect(&mut self) {}

        fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
            self.written.push(chunk.to_vec());
            Ok(())
        }

        fn read_chunk(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.notifications.pop_front().ok_or(TransportError::Timeout)
        }
    }

    #[test]
    fn test_write_single_chunk() {
        let mut transport = BleTransport::new(LoopbackLink::default());
        transport.write(&[0xE0, 0x01, 0x00, 0x00]).unwrap();

        let written = &transport.link.written;
        assert_eq!(written.len(), 1);
        assert_eq!(
            written[0],
            vec![0x05, 0x00, 0x00, 0x00, 0x04, 0xE0, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_write_chunking_respects_mtu() {
        let mut transport = BleTransport::new(LoopbackLink::default()).with_mtu(8);
        let frame: Vec<u8> = (0u8..10).collect();
        transport.write(&frame).unwrap();

        let written = &transport.link.written;
        // 3 bytes fit in chunk 0 (5-byte header), 5 in each continuation
        assert_eq!(written.len(), 3);
        assert_eq!(written[0], vec![0x05, 0x00, 0x00, 0x00, 0x0A, 0, 1, 2]);
        assert_eq!(written[1], vec![0x05, 0x00, 0x01, 3, 4, 5, 6, 7]);
        assert_eq!(written[2], vec![0x05, 0x00, 0x02, 8, 9]);
    }

    #[test]
    fn test_read_reassembles_notifications() {
        let mut link = LoopbackLink::default();
        link.notifications
            .push_back(vec![0x05, 0x00, 0x00, 0x00, 0x06, 0xAA, 0xBB, 0xCC]);
        link.notifications.push_back(vec![0x05, 0x00, 0x01, 0xDD, 0x90, 0x00]);

        let mut transport = BleTransport::new(link);
        let frame = transport.read(Duration::from_millis(10)).unwrap();
        assert_eq!(frame.as_ref(), &[0xAA, 0xBB, 0xCC, 0xDD, 0x90, 0x00]);
    }

    #[test]
    fn test_read_rejects_bad_sequence() {
        let mut link = LoopbackLink::default();
        link.notifications
            .push_back(vec![0x05, 0x00, 0x00, 0x00, 0x06, 0xAA, 0xBB, 0xCC]);
        link.notifications.push_back(vec![0x05, 0x00, 0x07, 0xDD, 0x90, 0x00]);

        let mut transport = BleTransport::new(link);
        assert_eq!(
            transport.read(Duration::from_millis(10)),
            Err(TransportError::Framing("unexpected sequence index"))
        );
    }
}
