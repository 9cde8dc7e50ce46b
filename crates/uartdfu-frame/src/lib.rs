//! Magic-delimited DFU command framing for UART links.
//!
//! Every frame on the wire is:
//! - a 4-byte start magic (`"xogq"`)
//! - a 4-byte little-endian command tag
//! - a command-specific payload
//! - a 4-byte stop magic (`"foqs"`)
//!
//! The codec is pure and allocation free: requests are assembled from
//! borrowed [`Fragment`]s into a fixed-capacity [`PacketBuffer`], and decoding
//! reads fixed offsets of the accumulated receive buffer. [`RxParser`] is the
//! per-byte receive state machine that decides when a frame is complete.

pub mod buffer;
pub mod codec;
pub mod command;
pub mod errno;
pub mod error;
pub mod parser;

pub use buffer::{Fragment, PacketBuffer};
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, identify,
    min_request_len, peek_command, Request, Response, HEADER_SIZE, IMAGE_HEADER_MAGIC,
    IMAGE_HEADER_SIZE, MAGIC_START, MAGIC_STOP, MIN_FRAME_SIZE, RESPONSE_SIZE,
};
pub use command::Command;
pub use error::{FrameError, Result};
pub use parser::{Feed, Inbound, RxParser};
