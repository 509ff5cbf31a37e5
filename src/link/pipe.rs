//! In-memory byte pipes standing in for a UART.
//!
//! Used by the host demo and the tests to join two transport managers, or
//! to feed raw bytes into one.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{LinkReader, LinkWriter};

type Bytes = Arc<Mutex<VecDeque<u8>>>;

/// Write end of a pipe. Clones write into the same pipe.
#[derive(Clone)]
pub struct PipeWriter {
    bytes: Bytes,
}

/// Read end of a pipe.
pub struct PipeReader {
    bytes: Bytes,
}

/// One-directional pipe.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let bytes: Bytes = Arc::default();
    (
        PipeWriter {
            bytes: Arc::clone(&bytes),
        },
        PipeReader { bytes },
    )
}

/// One side of a [`duplex`] connection.
pub struct PipeEnd {
    pub reader: PipeReader,
    pub writer: PipeWriter,
}

/// Two cross-connected ends: what one writes, the other reads.
pub fn duplex() -> (PipeEnd, PipeEnd) {
    let (a_tx, b_rx) = pipe();
    let (b_tx, a_rx) = pipe();
    (
        PipeEnd {
            reader: a_rx,
            writer: a_tx,
        },
        PipeEnd {
            reader: b_rx,
            writer: b_tx,
        },
    )
}

impl PipeReader {
    /// Everything buffered so far, as text.
    pub fn take_string(&mut self) -> String {
        let bytes: Vec<u8> = self.bytes.lock().drain(..).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Complete lines buffered so far; a trailing partial line stays queued.
    pub fn take_lines(&mut self) -> Vec<String> {
        let mut bytes = self.bytes.lock();
        let Some(last_newline) = bytes.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = bytes.drain(..=last_newline).collect();
        String::from_utf8_lossy(&complete)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl LinkReader for PipeReader {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock();
        let n = buf.len().min(bytes.len());
        for (slot, b) in buf.iter_mut().zip(bytes.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

impl LinkWriter for PipeWriter {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.bytes.lock().extend(data.iter().copied());
        Ok(())
    }
}
