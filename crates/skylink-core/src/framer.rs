//! Newline framer for the LoRa serial stream.
//!
//! The radio delivers arbitrary chunks; frames are text lines terminated by
//! `\n`, `\r\n` or a lone `\r`. Splitting happens on raw bytes so that a
//! multi-byte character cut by a chunk boundary decodes the same as if it had
//! arrived in one read. Each completed line is decoded lossily as UTF-8.
use bytes::{Buf, BytesMut};
use tracing::warn;

/// Default ceiling for the unterminated fragment.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

pub struct LineFramer {
    buf: BytesMut,
    max_pending: usize,
    dropped: u64,
}

impl LineFramer {
    pub fn new(max_pending: usize) -> Self {
        Self { buf: BytesMut::with_capacity(1024), max_pending: max_pending.max(1), dropped: 0 }
    }

    /// Appends a chunk and returns every complete, non-empty, trimmed line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let raw = self.buf.split_to(pos);
            self.buf.advance(1); // delimiter
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        // whatever is left is the single partial fragment
        if self.buf.len() > self.max_pending {
            let excess = self.buf.len() - self.max_pending;
            self.buf.advance(excess);
            self.dropped += excess as u64;
            warn!("framer: no delimiter within {} bytes, dropped {} oldest bytes", self.max_pending, excess);
        }

        lines
    }

    /// Bytes held in the unterminated fragment.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes discarded by the buffer cap.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}
