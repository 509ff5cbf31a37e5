//! Bounded line accumulator shared by the link RX task and the console.

/// Line input buffer with a fixed capacity.
///
/// Bytes pushed past capacity are discarded and the buffer remembers that
/// it overflowed until it is cleared.
pub struct LineBuffer {
    buf: Vec<u8>,
    capacity: usize,
    overflowed: bool,
}

impl LineBuffer {
    /// Create empty buffer
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            overflowed: false,
        }
    }

    /// Push a byte. Returns `false` if the buffer is full.
    pub fn push(&mut self, c: u8) -> bool {
        if self.buf.len() < self.capacity {
            self.buf.push(c);
            true
        } else {
            self.overflowed = true;
            false
        }
    }

    /// Remove last byte
    pub fn backspace(&mut self) {
        self.buf.pop();
    }

    /// Clear contents and the overflow flag
    pub fn clear(&mut self) {
        self.buf.clear();
        self.overflowed = false;
    }

    /// Set buffer contents from string, truncating at capacity
    pub fn set(&mut self, s: &str) {
        self.clear();
        let bytes = s.as_bytes();
        let copy_len = bytes.len().min(self.capacity);
        self.buf.extend_from_slice(&bytes[..copy_len]);
    }

    /// Get buffer as string slice (empty if not UTF-8, see [`as_bytes`](Self::as_bytes))
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` if bytes were dropped since the last clear
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
