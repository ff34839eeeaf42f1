//! Fixed-size FIFO ring buffer for captured PCM bytes.
//!
//! The buffer is allocated once at `size` slots and holds at most
//! `size - 1` items; the spare slot keeps "full" and "empty" distinguishable
//! the way hardware ring buffers do.  Writes never overwrite: callers that
//! want drop-oldest behaviour call [`discard`](RingBuffer::discard) first.
//!
//! # Example
//!
//! ```rust
//! use voice_chat_core::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(5); // holds at most 4
//! assert_eq!(buf.write(&[1u8, 2, 3, 4, 5]), 4);
//! assert_eq!(buf.read_exact(2), Some(vec![1, 2]));
//! assert_eq!(buf.len(), 2);
//! ```

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-size circular FIFO.
pub struct RingBuffer<T> {
    buf: Vec<T>,
    size: usize,
    /// Index of the oldest stored item.
    read_pos: usize,
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a ring buffer with `size` slots (`size - 1` usable).
    ///
    /// # Panics
    ///
    /// Panics if `size < 2`.
    pub fn new(size: usize) -> Self {
        assert!(size > 1, "RingBuffer size must be > 1");
        Self {
            buf: vec![T::default(); size],
            size,
            read_pos: 0,
            len: 0,
        }
    }

    /// Like [`new`](Self::new) but reports allocation failure instead of
    /// aborting.  Returns `None` for `size < 2` as well.
    pub fn try_new(size: usize) -> Option<Self> {
        if size < 2 {
            return None;
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).ok()?;
        buf.resize(size, T::default());
        Some(Self {
            buf,
            size,
            read_pos: 0,
            len: 0,
        })
    }

    /// Append as much of `data` as fits; returns the number written.
    pub fn write(&mut self, data: &[T]) -> usize {
        let n = data.len().min(self.free());
        let mut write_pos = (self.read_pos + self.len) % self.size;
        for &item in &data[..n] {
            self.buf[write_pos] = item;
            write_pos = (write_pos + 1) % self.size;
        }
        self.len += n;
        n
    }

    /// Remove and return exactly `n` of the oldest items, or `None` (leaving
    /// the buffer untouched) when fewer are stored.
    pub fn read_exact(&mut self, n: usize) -> Option<Vec<T>> {
        if n > self.len {
            return None;
        }
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            out.push(self.buf[(self.read_pos + i) % self.size]);
        }
        self.advance(n);
        Some(out)
    }

    /// Drop up to `n` of the oldest items; returns how many were dropped.
    pub fn discard(&mut self, n: usize) -> usize {
        let n = n.min(self.len);
        self.advance(n);
        n
    }

    /// Discard all items.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.len = 0;
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Most items the buffer can hold (`size - 1`).
    pub fn max_len(&self) -> usize {
        self.size - 1
    }

    /// Allocated slot count.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn free(&self) -> usize {
        self.max_len() - self.len
    }

    fn advance(&mut self, n: usize) {
        self.read_pos = (self.read_pos + n) % self.size;
        self.len -= n;
        if self.len == 0 {
            self.read_pos = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Basic write / read ------------------------------------------------

    #[test]
    fn write_and_read_within_capacity() {
        let mut buf = RingBuffer::new(8);
        assert_eq!(buf.write(&[1u8, 2, 3]), 3);
        assert_eq!(buf.len(), 3);

        assert_eq!(buf.read_exact(3), Some(vec![1, 2, 3]));
        assert!(buf.is_empty());
    }

    #[test]
    fn one_slot_stays_free() {
        let mut buf = RingBuffer::new(4);
        assert_eq!(buf.max_len(), 3);
        assert_eq!(buf.write(&[1u8, 2, 3, 4]), 3);
        assert_eq!(buf.free(), 0);
        assert_eq!(buf.read_exact(3), Some(vec![1, 2, 3]));
    }

    #[test]
    fn read_exact_short_leaves_buffer_untouched() {
        let mut buf = RingBuffer::new(8);
        buf.write(&[1u8, 2]);
        assert_eq!(buf.read_exact(3), None);
        assert_eq!(buf.len(), 2);
    }

    // ---- Wrap-around ---------------------------------------------------------

    #[test]
    fn wraps_preserving_order() {
        let mut buf = RingBuffer::new(5);
        buf.write(&[1u8, 2, 3, 4]);
        assert_eq!(buf.read_exact(3), Some(vec![1, 2, 3]));
        buf.write(&[5, 6, 7]);
        assert_eq!(buf.read_exact(4), Some(vec![4, 5, 6, 7]));
    }

    // ---- Discard -------------------------------------------------------------

    #[test]
    fn discard_drops_oldest() {
        let mut buf = RingBuffer::new(8);
        buf.write(&[1u8, 2, 3, 4, 5]);
        assert_eq!(buf.discard(2), 2);
        assert_eq!(buf.read_exact(3), Some(vec![3, 4, 5]));
    }

    #[test]
    fn discard_more_than_stored_empties() {
        let mut buf = RingBuffer::new(8);
        buf.write(&[1u8, 2]);
        assert_eq!(buf.discard(10), 2);
        assert!(buf.is_empty());
    }

    // ---- Clear / reuse -------------------------------------------------------

    #[test]
    fn clear_resets_state() {
        let mut buf = RingBuffer::new(4);
        buf.write(&[1u8, 2, 3]);
        buf.clear();
        assert!(buf.is_empty());

        buf.write(&[9u8]);
        assert_eq!(buf.read_exact(1), Some(vec![9]));
        assert!(buf.is_empty());
    }

    // ---- Construction --------------------------------------------------------

    #[test]
    fn try_new_rejects_tiny_sizes() {
        assert!(RingBuffer::<u8>::try_new(1).is_none());
        let buf = RingBuffer::<u8>::try_new(1024).unwrap();
        assert_eq!(buf.size(), 1024);
        assert_eq!(buf.max_len(), 1023);
    }

    #[test]
    #[should_panic(expected = "RingBuffer size must be > 1")]
    fn size_one_panics() {
        let _buf: RingBuffer<u8> = RingBuffer::new(1);
    }
}
