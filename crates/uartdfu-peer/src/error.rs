use std::time::Duration;

use uartdfu_frame::{errno, Command, FrameError};

/// Coarse classification of a [`DfuError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A frame did not fit in a packet buffer.
    Overflow,
    /// A frame was malformed or answered the wrong command.
    Malformed,
    /// No response arrived before the deadline.
    Timeout,
    /// The firmware-update backend reported an error.
    Backend,
    /// The serial transport failed.
    Transport,
    /// The caller passed an unusable argument.
    InvalidArgument,
    /// The responder worker could not be started or stopped.
    Worker,
}

/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum DfuError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] uartdfu_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The responder did not answer in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The response carried a different command tag than the request.
    #[error("expected {expected} response, received {received}")]
    CommandMismatch {
        expected: Command,
        received: Command,
    },

    /// Status code reported by the responder's backend, passed through verbatim.
    #[error("backend error {0}")]
    Backend(i32),

    /// The caller passed an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The responder worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(std::io::Error),

    /// The responder worker thread panicked.
    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl DfuError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DfuError::Transport(_) => ErrorKind::Transport,
            DfuError::Frame(FrameError::Overflow { .. }) => ErrorKind::Overflow,
            DfuError::Frame(_) | DfuError::CommandMismatch { .. } => ErrorKind::Malformed,
            DfuError::Timeout(_) => ErrorKind::Timeout,
            DfuError::Backend(_) => ErrorKind::Backend,
            DfuError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DfuError::WorkerSpawn(_) | DfuError::WorkerPanicked => ErrorKind::Worker,
        }
    }

    /// Negative errno-style code for callers that report integer statuses.
    pub fn status(&self) -> i32 {
        match self {
            DfuError::Backend(code) => *code,
            DfuError::Timeout(_) => -errno::EAGAIN,
            DfuError::Frame(FrameError::Overflow { .. }) => -errno::ENOMEM,
            DfuError::Frame(_) | DfuError::CommandMismatch { .. } => -errno::EBADMSG,
            DfuError::InvalidArgument(_) => -errno::EINVAL,
            DfuError::Transport(_) | DfuError::WorkerSpawn(_) | DfuError::WorkerPanicked => {
                -errno::EIO
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DfuError>;
