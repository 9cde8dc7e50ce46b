use bytes::Buf;

use crate::buffer::{Fragment, PacketBuffer};
use crate::command::Command;
use crate::error::{FrameError, Result};

/// Start-of-frame marker.
pub const MAGIC_START: [u8; 4] = *b"xogq";

/// End-of-frame marker.
pub const MAGIC_STOP: [u8; 4] = *b"foqs";

/// Length of either magic marker.
pub const MAGIC_LEN: usize = 4;

/// Offset of the command tag inside a frame.
pub const TAG_OFFSET: usize = MAGIC_LEN;

/// Start magic + command tag = 8 bytes. The payload begins here.
pub const HEADER_SIZE: usize = TAG_OFFSET + 4;

/// Offset of the chunk bytes in a WRITE request (after the length field).
pub const WRITE_DATA_OFFSET: usize = HEADER_SIZE + 4;

/// Smallest possible frame: header + stop magic, empty payload.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + MAGIC_LEN;

/// Every response is header + 4-byte status + stop magic.
pub const RESPONSE_SIZE: usize = HEADER_SIZE + 4 + MAGIC_LEN;

/// Marker at the start of a UART update image.
pub const IMAGE_HEADER_MAGIC: u32 = 0x85f3_d83a;

/// Size of the UART image header stripped from the first WRITE.
pub const IMAGE_HEADER_SIZE: usize = 4;

/// A decoded request. WRITE chunks borrow from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// Start a session for an image of `file_size` bytes in slot `image_id`.
    Init { file_size: u32, image_id: u8 },
    /// One chunk of image data.
    Write { chunk: &'a [u8] },
    /// Ask for the number of bytes stored so far.
    Offset,
    /// Finish the session.
    Done { success: bool },
}

impl Request<'_> {
    /// The command tag this request travels under.
    pub fn command(&self) -> Command {
        match self {
            Request::Init { .. } => Command::Init,
            Request::Write { .. } => Command::Write,
            Request::Offset => Command::Offset,
            Request::Done { .. } => Command::Done,
        }
    }

    /// The total wire size of this request.
    pub fn wire_size(&self) -> usize {
        match self {
            Request::Write { chunk } => min_request_len(Command::Write) + chunk.len(),
            other => min_request_len(other.command()),
        }
    }
}

/// A decoded response: the echoed command tag and its status.
///
/// For OFFSET a non-negative status is the offset and a negative status is
/// the error. For every other command `0` means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub command: Command,
    pub status: i32,
}

impl Response {
    /// Create a response.
    pub fn new(command: Command, status: i32) -> Self {
        Self { command, status }
    }
}

/// Minimum wire length of a request for `command`.
pub fn min_request_len(command: Command) -> usize {
    let payload = match command {
        Command::Init => 4 + 1,
        Command::Write => 4,
        Command::Offset => 0,
        Command::Done => 1,
    };
    MIN_FRAME_SIZE + payload
}

/// Encode a request into `dst`, replacing its contents.
///
/// Wire format:
/// ```text
/// ┌──────────────┬────────────┬───────────────────────┬──────────────┐
/// │ "xogq" (4B)  │ tag (4B LE)│ payload (per command) │ "foqs" (4B)  │
/// └──────────────┴────────────┴───────────────────────┴──────────────┘
/// INIT    payload: file_size (4B LE), image_id (1B)
/// WRITE   payload: chunk_length (4B LE), chunk bytes
/// OFFSET  payload: empty
/// DONE    payload: success flag (1B)
/// ```
///
/// On overflow the buffer is left empty.
pub fn encode_request(request: &Request<'_>, dst: &mut PacketBuffer) -> Result<()> {
    let tag = request.command().tag().to_le_bytes();
    let start = Fragment::new(&MAGIC_START);
    let stop = Fragment::new(&MAGIC_STOP);

    match *request {
        Request::Init {
            file_size,
            image_id,
        } => {
            let size = file_size.to_le_bytes();
            let image = [image_id];
            dst.fill(&[
                start,
                Fragment::new(&tag),
                Fragment::new(&size),
                Fragment::new(&image),
                stop,
            ])
        }
        Request::Write { chunk } => {
            let Ok(len) = u32::try_from(chunk.len()) else {
                dst.reset();
                return Err(FrameError::Overflow {
                    needed: chunk.len(),
                    available: dst.capacity(),
                });
            };
            let len = len.to_le_bytes();
            dst.fill(&[
                start,
                Fragment::new(&tag),
                Fragment::new(&len),
                Fragment::new(chunk),
                stop,
            ])
        }
        Request::Offset => dst.fill(&[start, Fragment::new(&tag), stop]),
        Request::Done { success } => {
            let flag = [u8::from(success)];
            dst.fill(&[start, Fragment::new(&tag), Fragment::new(&flag), stop])
        }
    }
}

/// Encode a response into `dst`, replacing its contents.
pub fn encode_response(response: &Response, dst: &mut PacketBuffer) -> Result<()> {
    let tag = response.command.tag().to_le_bytes();
    let status = response.status.to_le_bytes();
    dst.fill(&[
        Fragment::new(&MAGIC_START),
        Fragment::new(&tag),
        Fragment::new(&status),
        Fragment::new(&MAGIC_STOP),
    ])
}

/// Read the command tag of an accumulated frame without validating its payload.
pub fn peek_command(frame: &[u8]) -> Result<Command> {
    if frame.len() < MAGIC_LEN || frame[..MAGIC_LEN] != MAGIC_START {
        return Err(FrameError::InvalidMagic);
    }
    if frame.len() < HEADER_SIZE {
        return Err(FrameError::TooShort(frame.len()));
    }
    let tag = (&frame[TAG_OFFSET..HEADER_SIZE]).get_u32_le();
    Command::try_from(tag)
}

/// Interpret an accumulated frame as a request.
///
/// Zero-copy: a WRITE chunk borrows from `frame`.
pub fn decode_request(frame: &[u8]) -> Result<Request<'_>> {
    let command = peek_command(frame)?;
    let mut payload = payload_of(frame, command, min_request_len(command))?;

    match command {
        Command::Init => {
            let file_size = payload.get_u32_le();
            let image_id = payload.get_u8();
            Ok(Request::Init {
                file_size,
                image_id,
            })
        }
        Command::Write => {
            let declared = payload.get_u32_le() as usize;
            if declared > payload.len() {
                return Err(FrameError::LengthMismatch {
                    declared,
                    received: payload.len(),
                });
            }
            Ok(Request::Write {
                chunk: &payload[..declared],
            })
        }
        Command::Offset => Ok(Request::Offset),
        Command::Done => Ok(Request::Done {
            success: payload.get_u8() != 0,
        }),
    }
}

/// Interpret an accumulated frame as a response.
pub fn decode_response(frame: &[u8]) -> Result<Response> {
    let command = peek_command(frame)?;
    let mut payload = payload_of(frame, command, RESPONSE_SIZE)?;
    Ok(Response {
        command,
        status: payload.get_i32_le(),
    })
}

/// Whether `image` starts with the UART image header.
pub fn identify(image: &[u8]) -> bool {
    image.len() >= IMAGE_HEADER_SIZE
        && (&image[..IMAGE_HEADER_SIZE]).get_u32_le() == IMAGE_HEADER_MAGIC
}

fn payload_of(frame: &[u8], command: Command, min: usize) -> Result<&[u8]> {
    if frame.len() < min {
        return Err(FrameError::Truncated {
            command,
            len: frame.len(),
            min,
        });
    }
    let stop_at = frame.len() - MAGIC_LEN;
    if frame[stop_at..] != MAGIC_STOP {
        return Err(FrameError::InvalidMagic);
    }
    Ok(&frame[HEADER_SIZE..stop_at])
}
