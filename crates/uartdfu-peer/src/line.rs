use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;
use uartdfu_frame::{Feed, RxParser};
use uartdfu_transport::RxHandler;

use crate::signal::Completion;

/// Receive side of one endpoint: the parser fed from the byte-delivery
/// context, plus the completion raised when a frame is ready.
///
/// The byte-delivery context (an [`RxPump`](uartdfu_transport::RxPump) thread
/// or any other caller of [`RxHandler::on_byte`]) locks the parser for one
/// byte at a time. The endpoint thread takes the same lock through
/// [`RxLine::mask`] while it inspects a frame, so reception is held off until
/// the mask is dropped.
#[derive(Debug)]
pub struct RxLine {
    parser: Mutex<RxParser>,
    completion: Completion,
}

/// Guard that keeps reception masked; derefs to the [`RxParser`].
///
/// Reception resumes when the guard is dropped, on every exit path.
pub struct RxMask<'a> {
    parser: MutexGuard<'a, RxParser>,
}

impl RxLine {
    /// Receive line for an endpoint that accepts requests.
    pub fn for_requests(capacity: usize) -> Self {
        Self::new(RxParser::for_requests(capacity))
    }

    /// Receive line for an endpoint that accepts responses.
    pub fn for_responses(capacity: usize) -> Self {
        Self::new(RxParser::for_responses(capacity))
    }

    pub fn new(parser: RxParser) -> Self {
        Self {
            parser: Mutex::new(parser),
            completion: Completion::new(),
        }
    }

    /// Completion raised once per complete inbound frame.
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Mask reception and borrow the parser.
    pub fn mask(&self) -> RxMask<'_> {
        RxMask {
            parser: self.parser.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Drop any partial or complete frame and any pending completion.
    ///
    /// Returns `true` if something was discarded.
    pub fn discard_stale(&self) -> bool {
        let mut rx = self.mask();
        let buffered = !rx.is_empty();
        rx.reset();
        let signalled = self.completion.try_take();
        buffered || signalled
    }
}

impl RxHandler for RxLine {
    fn on_byte(&self, byte: u8) {
        let feed = self.mask().feed(byte);
        match feed {
            Feed::Complete => self.completion.give(),
            Feed::Overflow => warn!("receive buffer overflow, framing restarted"),
            Feed::Pending | Feed::Ignored => {}
        }
    }
}

impl Deref for RxMask<'_> {
    type Target = RxParser;

    fn deref(&self) -> &RxParser {
        &self.parser
    }
}

impl DerefMut for RxMask<'_> {
    fn deref_mut(&mut self) -> &mut RxParser {
        &mut self.parser
    }
}

impl std::fmt::Debug for RxMask<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxMask")
            .field("parser", &*self.parser)
            .finish()
    }
}
