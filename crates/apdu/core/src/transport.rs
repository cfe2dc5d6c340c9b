//! Transport trait for APDU communication
//!
//! A device transport moves opaque APDU frames to and from a secure element.
//! It has no knowledge of command structure, secure channels, or protocol
//! details; chunking and reassembly of frames into transport-sized packets is
//! the concrete implementation's business.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::TransportError;

/// Default timeout applied by [`Device::exchange`]
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Capability trait for device transports
///
/// A transport is owned by exactly one session. Exchanges mutate chunk
/// sequence counters and must be totally ordered: `exchange` is `write` then
/// `read`, and is not atomic against concurrent exchanges on the same handle.
pub trait Device: fmt::Debug {
    /// Human-readable identifier, e.g. `hid:/dev/hidraw3`
    fn name(&self) -> String;

    /// Open the device handle
    fn open(&mut self) -> Result<(), TransportError>;

    /// Close the device handle, releasing OS resources
    fn close(&mut self);

    /// Send one frame to the device
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive one full frame from the device
    ///
    /// Blocks until a complete frame has been reassembled or `timeout`
    /// expires while waiting for a packet.
    fn read(&mut self, timeout: Duration) -> Result<Bytes, TransportError>;

    /// Send a frame and read the device's response
    fn exchange(&mut self, data: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(data), "=>");
        self.write(data)?;
        let response = self.read(DEFAULT_READ_TIMEOUT);
        match &response {
            Ok(data) if !data.is_empty() => trace!(response = %hex::encode(data), "<="),
            Ok(_) => {}
            Err(e) => debug!(error = ?e, "transport error during exchange"),
        }
        response
    }
}

impl<T: Device + ?Sized> Device for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read(&mut self, timeout: Duration) -> Result<Bytes, TransportError> {
        (**self).read(timeout)
    }

    fn exchange(&mut self, data: &[u8]) -> Result<Bytes, TransportError> {
        (**self).exchange(data)
    }
}

/// Scripted mock device for tests
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Default)]
pub struct MockDevice {
    /// Responses to return, first in first out
    pub responses: Vec<Bytes>,
    /// Frames that were written
    pub commands: Vec<Bytes>,
    /// Whether the device is open
    pub opened: bool,
}

#[cfg(any(test, feature = "mock"))]
impl MockDevice {
    /// Create a mock that replays the given responses in order
    pub fn new(responses: Vec<Bytes>) -> Self {
        Self {
            responses,
            commands: Vec::new(),
            opened: true,
        }
    }

    /// Create a mock that always answers success (90 00)
    pub fn with_success() -> Self {
        Self::new(vec![Bytes::from_static(&[0x90, 0x00])])
    }

    /// Queue another response
    pub fn push_response(&mut self, response: impl Into<Bytes>) {
        self.responses.push(response.into());
    }
}

#[cfg(any(test, feature = "mock"))]
impl Device for MockDevice {
    fn name(&self) -> String {
        "mock".to_string()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.opened {
            return Err(TransportError::NotOpen);
        }
        self.commands.push(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<Bytes, TransportError> {
        if self.responses.is_empty() {
            return Err(TransportError::Timeout);
        }
        // Replay a single scripted response forever, or drain a sequence
        if self.responses.len() == 1 {
            Ok(self.responses[0].clone())
        } else {
            Ok(self.responses.remove(0))
        }
    }
}
