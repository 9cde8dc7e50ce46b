//! Firmware updates over a UART link.
//!
//! A requester streams an image to a responder with four commands (INIT,
//! WRITE, OFFSET, DONE), each framed between fixed start and stop magics and
//! answered with a status code.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-level serial abstraction (raw tty, stream adapters)
//! - [`frame`]: frame codec, bounded packet buffer and receive parser
//! - [`peer`]: requester and responder endpoints (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use uartdfu_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use uartdfu_frame::*;
}

/// Re-export endpoint types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use uartdfu_peer::*;
}
