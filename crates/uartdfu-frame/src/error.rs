use crate::command::Command;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A fragment did not fit in the remaining packet buffer space.
    #[error("packet buffer overflow ({needed} bytes needed, {available} available)")]
    Overflow { needed: usize, available: usize },

    /// The frame does not start and end with the expected magic markers.
    #[error("invalid frame magic (expected \"xogq\" ... \"foqs\")")]
    InvalidMagic,

    /// The frame ends before its command tag.
    #[error("frame too short to carry a command tag ({0} bytes)")]
    TooShort(usize),

    /// The command tag is not one of the four DFU commands.
    #[error("unknown command tag {0}")]
    UnknownCommand(u32),

    /// The frame is shorter than its command requires.
    #[error("truncated {command} frame ({len} bytes, need at least {min})")]
    Truncated {
        command: Command,
        len: usize,
        min: usize,
    },

    /// A WRITE frame declares more chunk bytes than it carries.
    #[error("write chunk declares {declared} bytes but only {received} arrived")]
    LengthMismatch { declared: usize, received: usize },
}

impl FrameError {
    /// True for errors caused by bad framing rather than lack of space.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, FrameError::Overflow { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
