//! Growable read buffer in front of a flow's byte stream.
//!
//! The request reader peeks at buffered bytes while looking for the end of a
//! header section, then takes exactly what a message occupies so the next
//! message starts at the front of the buffer.

use bytes::{Bytes, BytesMut};
use tokio::io::{self, AsyncRead, AsyncReadExt};

const INITIAL_CAPACITY: usize = 4 * 1024;

pub struct FlowBuffer<R> {
    inner: R,
    buf: BytesMut,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FlowBuffer<R> {
    /// `max_len` caps how much may be buffered at once, not the stream length.
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_CAPACITY.min(max_len)),
            max_len,
        }
    }

    /// Unconsumed buffered bytes.
    pub fn buffer(&self) -> &[u8] {
        &self.buf[..]
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.max_len
    }

    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        let _ = self.buf.split_to(n);
    }

    /// Removes and returns up to `n` bytes from the front of the buffer.
    pub fn take(&mut self, n: usize) -> Bytes {
        let n = n.min(self.buf.len());
        self.buf.split_to(n).freeze()
    }

    /// Reads more data from the stream. Returns 0 at end of stream.
    pub async fn fill(&mut self) -> io::Result<usize> {
        let room = self.max_len.saturating_sub(self.buf.len());
        if room == 0 {
            return Ok(0);
        }
        (&mut self.inner).take(room as u64).read_buf(&mut self.buf).await
    }
}
