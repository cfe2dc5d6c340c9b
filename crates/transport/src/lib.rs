//! Concrete transports for secure element communication
//!
//! Every transport implements the [`Device`] capability trait from
//! `tessera-apdu-core`: HID (chunked 64-byte reports), TCP proxy (4-byte
//! length prefix), BLE framing over an abstract GATT link, and a write-only
//! file sink that dumps APDU scripts.

pub mod ble;
pub mod file;
pub mod hid;
pub mod tcp;

pub use ble::{BleLink, BleTransport};
pub use file::FileSink;
pub use hid::HidTransport;
pub use tcp::TcpTransport;

use tessera_apdu_core::{Device, TransportError};
use tracing::debug;

/// Enumerate available devices across the TCP and HID backends
///
/// A configured TCP proxy takes precedence over attached HID devices, so an
/// emulator can be targeted without unplugging hardware. BLE peers are not
/// enumerated here; scanning happens at the OS integration layer.
pub fn enumerate_devices() -> Vec<Box<dyn Device>> {
    let mut devices: Vec<Box<dyn Device>> = Vec::new();

    for device in TcpTransport::enumerate() {
        devices.push(Box::new(device));
    }

    match HidTransport::enumerate() {
        Ok(found) => {
            for device in found {
                devices.push(Box::new(device));
            }
        }
        Err(e) => debug!(error = %e, "HID enumeration failed"),
    }

    devices
}

/// Open the first available device
pub fn open_first_device() -> Result<Box<dyn Device>, TransportError> {
    let mut devices = enumerate_devices();
    if devices.is_empty() {
        return Err(TransportError::NoDevice);
    }
    let mut device = devices.remove(0);
    device.open()?;
    Ok(device)
}
