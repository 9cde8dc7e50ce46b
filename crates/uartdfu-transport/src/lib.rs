//! Byte-oriented serial transport abstraction.
//!
//! The DFU link only needs two things from a UART:
//! - blocking single-byte transmit ([`SerialPort::poll_out`])
//! - a receive callback invoked once per incoming byte ([`RxHandler::on_byte`])
//!
//! This is the lowest layer of uartdfu. [`StreamPort`] and [`RxPump`] adapt any
//! `Read`/`Write` stream (a raw tty, a socket pair) to that model.

pub mod error;
pub mod pump;
pub mod traits;

#[cfg(unix)]
pub mod tty;

pub use error::{Result, TransportError};
pub use pump::RxPump;
pub use traits::{RxHandler, SerialPort, StreamPort};

#[cfg(unix)]
pub use tty::{open_raw, DEFAULT_BAUD};
