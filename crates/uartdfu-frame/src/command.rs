//! DFU command tags.
//!
//! The same tag identifies a request and the response that answers it.

use std::fmt;

/// One of the four DFU primitives relayed over the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Start a session: announce image size and slot.
    Init = 0,
    /// Transfer one chunk of image data.
    Write = 1,
    /// Ask how many bytes the responder has stored.
    Offset = 2,
    /// Finish the session, successfully or not.
    Done = 3,
}

impl Command {
    /// All commands, in tag order.
    pub const ALL: [Command; 4] = [Command::Init, Command::Write, Command::Offset, Command::Done];

    /// Wire tag for this command.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Resolve a wire tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Command::Init),
            1 => Some(Command::Write),
            2 => Some(Command::Offset),
            3 => Some(Command::Done),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Command::Init => "INIT",
            Command::Write => "WRITE",
            Command::Offset => "OFFSET",
            Command::Done => "DONE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for Command {
    type Error = crate::error::FrameError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        Command::from_tag(tag).ok_or(crate::error::FrameError::UnknownCommand(tag))
    }
}
