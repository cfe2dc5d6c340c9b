//! TCP proxy transport
//!
//! Talks to a proxy (e.g. a device emulator) over a socket. Frames carry a
//! 4-byte big-endian length prefix and are not chunked further. Reads block
//! until the proxy answers; the proxy returns the response payload length
//! excluding the 2-byte status word.

use std::env;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use bytes::Bytes;
use tessera_apdu_core::{Device, TransportError};

/// Environment variable naming the proxy host
pub const PROXY_ADDRESS_ENV: &str = "TESSERA_PROXY_ADDRESS";
/// Environment variable naming the proxy port
pub const PROXY_PORT_ENV: &str = "TESSERA_PROXY_PORT";

/// TCP proxy device
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create a transport for the proxy at `host:port` (not yet connected)
    pub const fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            stream: None,
        }
    }

    /// Enumerate the proxy configured through the environment, if any
    pub fn enumerate() -> Vec<Self> {
        match (env::var(PROXY_ADDRESS_ENV), env::var(PROXY_PORT_ENV)) {
            (Ok(host), Ok(port)) => match port.parse() {
                Ok(port) => vec![Self::new(host, port)],
                Err(_) => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Device for TcpTransport {
    fn name(&self) -> String {
        format!("tcp:{}:{}", self.host, self.port)
    }

    fn open(&mut self) -> Result<(), TransportError> {
        let stream =
            TcpStream::connect((self.host.as_str(), self.port)).map_err(TransportError::io)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream()?;
        let prefix = (data.len() as u32).to_be_bytes();
        stream.write_all(&prefix).map_err(TransportError::io)?;
        stream.write_all(data).map_err(TransportError::io)?;
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<Bytes, TransportError> {
        // Reads block until the proxy answers; there is no packet-level
        // timeout on this transport.
        let stream = self.stream()?;

        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).map_err(TransportError::io)?;
        let payload_len = u32::from_be_bytes(prefix) as usize;

        // The declared length excludes the trailing status word
        let mut frame = vec![0u8; payload_len + 2];
        stream.read_exact(&mut frame).map_err(TransportError::io)?;
        Ok(Bytes::from(frame))
    }
}
