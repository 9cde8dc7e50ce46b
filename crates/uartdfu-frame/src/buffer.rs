use crate::error::{FrameError, Result};

/// A borrowed span of bytes that makes up part of a frame.
///
/// Frames are described as an ordered list of fragments (magic, tag, fields,
/// payload) and copied exactly once, into a [`PacketBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a>(&'a [u8]);

impl<'a> Fragment<'a> {
    /// Wrap a byte span.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    /// The fragment bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    /// Fragment length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the fragment carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fixed-capacity byte sink with an append cursor.
///
/// Capacity is set at construction and never grows. Appends are
/// all-or-nothing: a write that would overflow fails and leaves the cursor
/// where it was.
pub struct PacketBuffer {
    storage: Box<[u8]>,
    len: usize,
}

impl PacketBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if no further byte fits.
    pub fn is_full(&self) -> bool {
        self.len == self.storage.len()
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.storage.len() - self.len
    }

    /// The written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// Rewind the cursor. Old bytes stay in storage until overwritten.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Zero the storage and rewind the cursor.
    pub fn clear(&mut self) {
        self.storage.fill(0);
        self.len = 0;
    }

    /// Append `bytes`, or fail without writing anything.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(FrameError::Overflow {
                needed: bytes.len(),
                available: self.remaining(),
            });
        }
        self.storage[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Append a single byte.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        self.append(&[byte])
    }

    /// Replace the contents with `fragments`, in order.
    ///
    /// If any fragment does not fit, the buffer is left empty.
    pub fn fill(&mut self, fragments: &[Fragment<'_>]) -> Result<()> {
        self.reset();
        for fragment in fragments {
            if let Err(err) = self.append(fragment.as_bytes()) {
                self.reset();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Drop the first `n` written bytes, shifting the rest to the front.
    pub fn discard_front(&mut self, n: usize) {
        let n = n.min(self.len);
        self.storage.copy_within(n..self.len, 0);
        self.len -= n;
    }
}

impl std::fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("len", &self.len)
            .field("capacity", &self.storage.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_tracks_cursor() {
        let mut buf = PacketBuffer::new(8);
        buf.append(b"xogq").unwrap();
        buf.push(7).unwrap();

        assert_eq!(buf.len(), 5);
        assert_eq!(buf.remaining(), 3);
        assert_eq!(buf.as_slice(), b"xogq\x07");
    }

    #[test]
    fn overflowing_append_leaves_cursor_unchanged() {
        let mut buf = PacketBuffer::new(6);
        buf.append(b"abcd").unwrap();

        let err = buf.append(b"xyz").unwrap_err();
        assert_eq!(
            err,
            FrameError::Overflow {
                needed: 3,
                available: 2
            }
        );
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.as_slice(), b"abcd");

        buf.append(b"ef").unwrap();
        assert!(buf.is_full());
        assert!(buf.push(0).is_err());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn buffer_is_reusable_after_overflow() {
        let mut buf = PacketBuffer::new(4);
        assert!(buf.append(b"too long").is_err());
        assert!(buf.is_empty());

        buf.append(b"fits").unwrap();
        assert_eq!(buf.as_slice(), b"fits");
    }

    #[test]
    fn fill_is_all_or_nothing() {
        let mut buf = PacketBuffer::new(10);
        buf.append(b"stale").unwrap();

        let fragments = [
            Fragment::new(b"xogq"),
            Fragment::new(b"\x00\x00\x00\x00"),
            Fragment::new(b"foqs"),
        ];
        let err = buf.fill(&fragments).unwrap_err();
        assert!(matches!(err, FrameError::Overflow { .. }));
        assert!(buf.is_empty());

        buf.fill(&fragments[..2]).unwrap();
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn clear_zeroes_storage_but_reset_does_not() {
        let mut buf = PacketBuffer::new(4);
        buf.append(b"abcd").unwrap();
        buf.reset();
        buf.len = 4;
        assert_eq!(buf.as_slice(), b"abcd");

        buf.clear();
        assert!(buf.is_empty());
        buf.len = 4;
        assert_eq!(buf.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn discard_front_shifts_remaining_bytes() {
        let mut buf = PacketBuffer::new(8);
        buf.append(b"zxogq").unwrap();
        buf.discard_front(1);
        assert_eq!(buf.as_slice(), b"xogq");

        buf.discard_front(10);
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut buf = PacketBuffer::new(0);
        assert!(buf.is_full());
        assert!(buf.push(1).is_err());
        assert!(buf.append(&[]).is_ok());
    }
}
