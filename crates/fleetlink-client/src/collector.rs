//! Response assembly for JSON documents.

use alloc::vec::Vec;

use crate::ports::{ResponseSink, SinkError};

/// Initial capacity of the response buffer; doubled on demand.
pub const RESPONSE_BUFFER_INITIAL: usize = 1100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectError {
    /// The accumulated body does not match the reported `Content-Length`.
    LengthMismatch,
}

/// Accumulates a JSON response body in a growable heap buffer.
///
/// The buffer starts at [`RESPONSE_BUFFER_INITIAL`] bytes and doubles when a
/// slice would overflow it; a failed reservation aborts the transfer.
pub struct JsonCollector {
    buf: Vec<u8>,
    expected: usize,
}

impl JsonCollector {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(RESPONSE_BUFFER_INITIAL),
            expected: 0,
        }
    }

    /// The complete body, once the transfer finished.
    pub fn finish(&self) -> Result<&[u8], CollectError> {
        if self.buf.len() != self.expected {
            return Err(CollectError::LengthMismatch);
        }
        Ok(&self.buf)
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

impl Default for JsonCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for JsonCollector {
    fn on_content_length(&mut self, length: usize) {
        self.expected = length;
    }

    fn on_body(&mut self, chunk: &[u8], _last: bool) -> Result<(), SinkError> {
        let needed = self.buf.len() + chunk.len();
        if needed > self.buf.capacity() {
            let mut target = self.buf.capacity().max(RESPONSE_BUFFER_INITIAL);
            while target < needed {
                target <<= 1;
            }
            self.buf
                .try_reserve_exact(target - self.buf.len())
                .map_err(|_| SinkError::Overflow)?;
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }
}

/// Drains a response nobody is interested in (feedback and config answers).
#[derive(Default)]
pub struct DiscardSink;

impl ResponseSink for DiscardSink {
    fn on_content_length(&mut self, _length: usize) {}

    fn on_body(&mut self, _chunk: &[u8], _last: bool) -> Result<(), SinkError> {
        Ok(())
    }
}
