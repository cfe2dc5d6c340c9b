//! USB HID transport
//!
//! Frames are chunked into 64-byte reports. Every report starts with a 3-byte
//! channel + tag header followed by a big-endian sequence index; the payload
//! of the first report additionally starts with the 2-byte total frame
//! length. Reassembly validates the header of every report.

use std::ffi::CString;
use std::fmt;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use hidapi::HidApi;
use tessera_apdu_core::{Device, TransportError};
use tracing::debug;

/// USB vendor id of the secure element devices
pub const VENDOR_ID: u16 = 0x2C97;

/// HID report size
const PACKET_SIZE: usize = 64;

/// Channel identifier carried by every report
const CHANNEL: [u8; 2] = [0x01, 0x01];

/// APDU tag carried by every report
const TAG: u8 = 0x05;

/// Report header: channel (2) + tag (1) + sequence index (2)
const HEADER_SIZE: usize = 5;

/// HID-attached device
pub struct HidTransport {
    path: CString,
    device: Option<hidapi::HidDevice>,
}

impl fmt::Debug for HidTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidTransport")
            .field("path", &self.path)
            .field("opened", &self.device.is_some())
            .finish()
    }
}

impl HidTransport {
    /// Create a transport for the HID device at `path` (not yet opened)
    pub const fn new(path: CString) -> Self {
        Self { path, device: None }
    }

    /// Enumerate candidate devices by USB vendor id
    ///
    /// The management interface is interface 0 (or usage page 0xFFA0 on
    /// platforms that do not report interface numbers).
    pub fn enumerate() -> Result<Vec<Self>, TransportError> {
        let api = HidApi::new().map_err(TransportError::io)?;
        let devices = api
            .device_list()
            .filter(|info| {
                info.vendor_id() == VENDOR_ID
                    && (info.interface_number() == 0 || info.usage_page() == 0xFFA0)
            })
            .map(|info| Self::new(info.path().to_owned()))
            .collect();
        Ok(devices)
    }

    fn handle(&mut self) -> Result<&hidapi::HidDevice, TransportError> {
        self.device.as_ref().ok_or(TransportError::NotOpen)
    }

    fn read_packet(&mut self, timeout: Duration) -> Result<[u8; PACKET_SIZE], TransportError> {
        let device = self.handle()?;
        let mut packet = [0u8; PACKET_SIZE];
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let read = device
            .read_timeout(&mut packet, millis)
            .map_err(TransportError::io)?;
        if read == 0 {
            return Err(TransportError::Timeout);
        }
        Ok(packet)
    }
}

/// Validate the 5-byte header of a received report
fn check_header(packet: &[u8], seq_idx: u16) -> Result<(), TransportError> {
    if packet[..2] != CHANNEL {
        return Err(TransportError::Framing("unexpected channel"));
    }
    if packet[2] != TAG {
        return Err(TransportError::Framing("unexpected tag"));
    }
    if packet[3..5] != seq_idx.to_be_bytes() {
        return Err(TransportError::Framing("unexpected sequence index"));
    }
    Ok(())
}

impl Device for HidTransport {
    fn name(&self) -> String {
        format!("hid:{}", self.path.to_string_lossy())
    }

    fn open(&mut self) -> Result<(), TransportError> {
        let api = HidApi::new().map_err(TransportError::io)?;
        let device = api.open_path(&self.path).map_err(TransportError::io)?;
        self.device = Some(device);
        Ok(())
    }

    fn close(&mut self) {
        self.device = None;
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        // The frame is prefixed by its total length, then split across reports
        let mut frame = BytesMut::with_capacity(2 + data.len());
        frame.put_u16(data.len() as u16);
        frame.put_slice(data);

        let device = self.handle()?;
        let chunk_size = PACKET_SIZE - HEADER_SIZE;
        for (seq_idx, chunk) in frame.chunks(chunk_size).enumerate() {
            // Report id 0 followed by the padded 64-byte report
            let mut packet = [0u8; PACKET_SIZE + 1];
            packet[1..3].copy_from_slice(&CHANNEL);
            packet[3] = TAG;
            packet[4..6].copy_from_slice(&(seq_idx as u16).to_be_bytes());
            packet[6..6 + chunk.len()].copy_from_slice(chunk);
            device.write(&packet).map_err(TransportError::io)?;
        }
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Bytes, TransportError> {
        let packet = self.read_packet(timeout)?;
        check_header(&packet, 0)?;

        let data_len = u16::from_be_bytes([packet[5], packet[6]]) as usize;
        let mut data = BytesMut::with_capacity(data_len);
        data.put_slice(&packet[7..]);

        let mut seq_idx = 1u16;
        while data.len() < data_len {
            let packet = self.read_packet(timeout)?;
            check_header(&packet, seq_idx)?;
            data.put_slice(&packet[HEADER_SIZE..]);
            seq_idx += 1;
        }

        data.truncate(data_len);
        debug!(len = data_len, "reassembled HID frame");
        Ok(data.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_header() {
        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = 0x01;
        packet[1] = 0x01;
        packet[2] = 0x05;
        packet[3] = 0x00;
        packet[4] = 0x02;
        assert!(check_header(&packet, 2).is_ok());
        assert_eq!(
            check_header(&packet, 3),
            Err(TransportError::Framing("unexpected sequence index"))
        );

        packet[2] = 0x06;
        assert_eq!(
            check_header(&packet, 2),
            Err(TransportError::Framing("unexpected tag"))
        );

        packet[0] = 0x02;
        assert_eq!(
            check_header(&packet, 2),
            Err(TransportError::Framing("unexpected channel"))
        );
    }
}
