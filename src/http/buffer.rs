use bytes::{Bytes, BytesMut};

/// Free space below which the buffer doubles before the next read.
const LOW_WATERMARK: usize = 1024;

/// The receive buffer has hit its hard maximum with no message boundary in
/// sight; the request cannot be framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

/// Per-connection growable receive buffer.
///
/// Capacity doubles whenever free space drops under the low watermark, up to
/// a hard maximum chosen in configuration. Beyond the maximum no further
/// growth occurs and [`window`](RecvBuffer::window) reports [`BufferFull`],
/// which the connection surfaces as a framing failure.
///
/// Completed messages are split off and frozen, so body views derived from
/// them stay valid while the remainder of the buffer (pipelined bytes of the
/// next request) is reused.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: BytesMut,
    filled: usize,
    limit: usize,
    max: usize,
}

impl RecvBuffer {
    pub fn new(initial: usize, max: usize) -> Self {
        let initial = initial.min(max).max(LOW_WATERMARK);
        Self {
            buf: BytesMut::with_capacity(initial),
            filled: 0,
            limit: initial,
            max,
        }
    }

    /// Bytes received so far and not yet split off.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Current logical capacity (grows per policy, capped at the maximum).
    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// Produces the writable slice for the next read, growing first if free
    /// space is below the low watermark. Every `window` call must be paired
    /// with a [`commit`](RecvBuffer::commit) of the bytes actually read.
    pub fn window(&mut self) -> Result<&mut [u8], BufferFull> {
        if self.limit - self.filled < LOW_WATERMARK && self.limit < self.max {
            self.limit = (self.limit * 2).min(self.max);
        }
        if self.filled == self.limit {
            return Err(BufferFull);
        }
        self.buf.resize(self.limit, 0);
        Ok(&mut self.buf[self.filled..])
    }

    /// Records `n` bytes read into the last window.
    pub fn commit(&mut self, n: usize) {
        self.filled += n;
        debug_assert!(self.filled <= self.limit);
        self.buf.truncate(self.filled);
    }

    /// Splits off the first `consumed` bytes as an immutable message,
    /// leaving any pipelined remainder in place for the next request.
    pub fn take_message(&mut self, consumed: usize) -> Bytes {
        debug_assert!(consumed <= self.filled);
        self.buf.truncate(self.filled);
        let message = self.buf.split_to(consumed).freeze();
        self.filled -= consumed;
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_when_free_space_is_low() {
        let mut buf = RecvBuffer::new(2048, 8192);
        let window = buf.window().unwrap();
        let n = window.len();
        buf.commit(n); // fill to the brim
        assert!(buf.window().unwrap().len() >= LOW_WATERMARK);
        assert_eq!(buf.capacity(), 4096);
    }

    #[test]
    fn stops_growing_at_the_maximum() {
        let mut buf = RecvBuffer::new(1024, 2048);
        let n = buf.window().unwrap().len();
        buf.commit(n);
        let n = buf.window().unwrap().len();
        buf.commit(n);
        assert_eq!(buf.capacity(), 2048);
        assert_eq!(buf.window(), Err(BufferFull));
    }

    #[test]
    fn take_message_keeps_pipelined_remainder() {
        let mut buf = RecvBuffer::new(1024, 4096);
        let window = buf.window().unwrap();
        window[..10].copy_from_slice(b"firstsecon");
        buf.commit(10);

        let first = buf.take_message(5);
        assert_eq!(&first[..], b"first");
        assert_eq!(buf.filled(), b"secon");

        // The frozen message stays intact while the buffer keeps reading.
        let window = buf.window().unwrap();
        window[0] = b'X';
        buf.commit(1);
        assert_eq!(&first[..], b"first");
        assert_eq!(buf.filled(), b"seconX");
    }
}
