//! File sink transport
//!
//! A write-only transport that serializes every outgoing APDU as a hex line
//! instead of talking to hardware, so an installation script can be dumped
//! and replayed later. Reads synthesize a success status word; a version
//! request additionally gets a synthesized version-info payload so the
//! layers above behave exactly as against a live device.

use std::fmt;
use std::io::Write;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tessera_apdu_core::{Device, TransportError};

/// GET VERSION instruction, the one request the sink answers with a payload
const INS_GET_VERSION: u8 = 0x01;

/// Write-only APDU script sink
pub struct FileSink {
    out: Box<dyn Write + Send>,
    target_id: u32,
    pending: Option<Bytes>,
}

impl fmt::Debug for FileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSink")
            .field("target_id", &format_args!("{:#010x}", self.target_id))
            .finish()
    }
}

impl FileSink {
    /// Create a sink writing hex lines to `out`, posing as target `target_id`
    pub fn new(out: Box<dyn Write + Send>, target_id: u32) -> Self {
        Self {
            out,
            target_id,
            pending: None,
        }
    }

    fn synthesized_version_info(&self) -> Bytes {
        let mut payload = BytesMut::new();
        payload.put_u32(self.target_id);
        payload.put_u8(3);
        payload.put_slice(b"0.0");
        payload.put_u8(4);
        payload.put_u32_le(0); // flags
        payload.put_u8(3);
        payload.put_slice(b"0.0");
        payload.put_slice(&[0x90, 0x00]);
        payload.freeze()
    }
}

impl Device for FileSink {
    fn name(&self) -> String {
        "file".to_string()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.out.flush();
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        writeln!(self.out, "{}", hex::encode(data)).map_err(TransportError::io)?;
        self.pending = if data.len() >= 2 && data[1] == INS_GET_VERSION {
            Some(self.synthesized_version_info())
        } else {
            None
        };
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<Bytes, TransportError> {
        Ok(self
            .pending
            .take()
            .unwrap_or_else(|| Bytes::from_static(&[0x90, 0x00])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_dumps_hex_lines() {
        let buf = SharedBuf::default();
        let mut sink = FileSink::new(Box::new(buf.clone()), 0x33000004);

        let response = sink.exchange(&[0xE0, 0x04, 0x00, 0x00]).unwrap();
        assert_eq!(response.as_ref(), &[0x90, 0x00]);

        let dumped = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(dumped, "e0040000\n");
    }

    #[test]
    fn test_synthesizes_version_info() {
        let buf = SharedBuf::default();
        let mut sink = FileSink::new(Box::new(buf), 0x33000004);

        let response = sink.exchange(&[0xE0, 0x01, 0x00, 0x00]).unwrap();
        assert_eq!(&response[..4], &[0x33, 0x00, 0x00, 0x04]);
        assert_eq!(&response[response.len() - 2..], &[0x90, 0x00]);
    }
}
