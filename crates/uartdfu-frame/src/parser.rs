use bytes::Buf;
use tracing::{debug, warn};

use crate::buffer::PacketBuffer;
use crate::codec::{
    min_request_len, HEADER_SIZE, MAGIC_LEN, MAGIC_START, MAGIC_STOP, MIN_FRAME_SIZE,
    TAG_OFFSET, WRITE_DATA_OFFSET,
};
use crate::command::Command;

/// Which frames a parser expects to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Responder side: requests, with a length-prefixed WRITE payload.
    Requests,
    /// Requester side: responses. A WRITE status is never read as a length.
    Responses,
}

/// Outcome of feeding one byte to an [`RxParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Byte stored, frame not complete yet.
    Pending,
    /// Byte stored and it completed a frame.
    Complete,
    /// A complete frame is waiting to be drained; the byte was not consumed.
    Ignored,
    /// The buffer could not take the frame; framing restarted and the byte
    /// was dropped.
    Overflow,
}

/// Per-byte receive state machine.
///
/// Runs in interrupt context: every call is O(1) apart from the at most
/// four-byte shift done while hunting for the start magic. It never fails
/// outward.
///
/// A frame completes on the first stop marker once the header is in, except
/// for a WRITE request, which must first reach the length its header
/// declares. Short frames are therefore handed over as they are, and the
/// decoder reports them as truncated.
pub struct RxParser {
    buf: PacketBuffer,
    inbound: Inbound,
    command: Option<Command>,
    expected_len: Option<usize>,
    complete: bool,
    overflows: u64,
}

impl RxParser {
    /// Parser for a responder's receive line.
    pub fn for_requests(capacity: usize) -> Self {
        Self::new(capacity, Inbound::Requests)
    }

    /// Parser for a requester's receive line.
    pub fn for_responses(capacity: usize) -> Self {
        Self::new(capacity, Inbound::Responses)
    }

    /// Create a parser with a fixed-capacity receive buffer.
    pub fn new(capacity: usize, inbound: Inbound) -> Self {
        Self {
            buf: PacketBuffer::new(capacity),
            inbound,
            command: None,
            expected_len: None,
            complete: false,
            overflows: 0,
        }
    }

    /// Consume one received byte.
    pub fn feed(&mut self, byte: u8) -> Feed {
        if self.complete {
            return Feed::Ignored;
        }

        if self.buf.push(byte).is_err() {
            warn!(
                capacity = self.buf.capacity(),
                "rx buffer overflow, restarting framing"
            );
            self.restart();
            return Feed::Overflow;
        }

        let len = self.buf.len();
        if len <= MAGIC_LEN {
            self.resync();
            return Feed::Pending;
        }
        if len < HEADER_SIZE {
            return Feed::Pending;
        }
        if len == HEADER_SIZE {
            self.on_tag();
        }

        if self.expected_len.is_none()
            && len == WRITE_DATA_OFFSET
            && self.inbound == Inbound::Requests
            && self.command == Some(Command::Write)
            && !self.on_write_length()
        {
            return Feed::Overflow;
        }

        if let Some(expected) = self.expected_len {
            if len < expected {
                return Feed::Pending;
            }
        }

        if len >= MIN_FRAME_SIZE && self.buf.as_slice()[len - MAGIC_LEN..] == MAGIC_STOP {
            self.complete = true;
            return Feed::Complete;
        }
        Feed::Pending
    }

    /// The accumulated bytes (a whole frame once complete).
    pub fn frame(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// Whether a complete frame is waiting to be drained.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Command of the frame being received, once its tag has arrived.
    pub fn command(&self) -> Option<Command> {
        self.command
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Receive buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Number of times framing restarted because a frame did not fit.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Drop the buffered bytes and start looking for a new frame.
    pub fn reset(&mut self) {
        self.buf.reset();
        self.command = None;
        self.expected_len = None;
        self.complete = false;
    }

    /// Like [`RxParser::reset`], but also zero the buffer.
    pub fn clear(&mut self) {
        self.reset();
        self.buf.clear();
    }

    fn restart(&mut self) {
        self.overflows += 1;
        self.reset();
    }

    // Keep the buffer a prefix of the start magic.
    fn resync(&mut self) {
        while !MAGIC_START.starts_with(self.buf.as_slice()) {
            self.buf.discard_front(1);
        }
    }

    fn on_tag(&mut self) {
        let tag = (&self.buf.as_slice()[TAG_OFFSET..HEADER_SIZE]).get_u32_le();
        self.command = Command::from_tag(tag);

        match self.command {
            Some(command) => debug!(%command, "command tag received"),
            None => debug!(tag, "unknown command tag, waiting for stop marker"),
        }
    }

    fn on_write_length(&mut self) -> bool {
        let declared =
            (&self.buf.as_slice()[HEADER_SIZE..WRITE_DATA_OFFSET]).get_u32_le() as usize;
        let total = min_request_len(Command::Write).saturating_add(declared);
        if total > self.buf.capacity() {
            warn!(
                declared,
                capacity = self.buf.capacity(),
                "write chunk cannot fit in rx buffer, restarting framing"
            );
            self.restart();
            return false;
        }
        debug!(declared, "write chunk length");
        self.expected_len = Some(total);
        true
    }
}

impl std::fmt::Debug for RxParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxParser")
            .field("inbound", &self.inbound)
            .field("len", &self.buf.len())
            .field("command", &self.command)
            .field("expected_len", &self.expected_len)
            .field("complete", &self.complete)
            .finish()
    }
}
