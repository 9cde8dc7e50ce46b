//! Requester and responder endpoints for firmware updates over a UART link.
//!
//! This is the "just works" layer. A [`Requester`] turns the asynchronous byte
//! stream into blocking `init` / `write` / `offset_get` / `done` calls; a
//! [`Responder`] runs a worker that applies received requests to a
//! [`DfuBackend`] and answers each one with the same framing.

pub mod backend;
pub mod config;
pub mod connector;
pub mod error;
pub mod line;
pub mod requester;
pub mod responder;
pub mod session;
pub mod signal;

pub use backend::{BackendError, BackendResult, DfuBackend, MemoryBackend, MemoryImage};
pub use config::LinkConfig;
#[cfg(unix)]
pub use connector::{open_requester, open_responder};
pub use connector::{requester_over, responder_over};
pub use error::{DfuError, ErrorKind, Result};
pub use line::{RxLine, RxMask};
pub use requester::Requester;
pub use responder::{Responder, ResponderHandle};
pub use session::Session;
pub use signal::Completion;
