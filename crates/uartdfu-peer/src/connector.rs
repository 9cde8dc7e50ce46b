//! Wiring endpoints onto byte streams.
//!
//! Each helper builds the endpoint's [`RxLine`], starts an [`RxPump`] feeding
//! it from `reader`, and wraps `writer` in a [`StreamPort`]. The pump must be
//! kept alive for as long as the endpoint is in use.

use std::io::{Read, Write};
use std::sync::Arc;

use uartdfu_transport::{RxHandler, RxPump, StreamPort};

use crate::backend::DfuBackend;
use crate::config::LinkConfig;
use crate::error::Result;
use crate::line::RxLine;
use crate::requester::Requester;
use crate::responder::Responder;

/// Build a requester over a reader/writer pair.
pub fn requester_over<R, W>(
    reader: R,
    writer: W,
    config: &LinkConfig,
) -> Result<(Requester<StreamPort<W>>, RxPump)>
where
    R: Read + Send + 'static,
    W: Write + Send,
{
    let line = Arc::new(RxLine::for_responses(config.input_capacity));
    let pump = spawn_pump(reader, &line, &format!("{}_rsp", config.worker_name))?;
    Ok((Requester::new(StreamPort::new(writer), line, config), pump))
}

/// Build a responder over a reader/writer pair.
///
/// The responder is returned idle; call [`Responder::spawn`] to start its
/// worker or [`Responder::serve_one`] to drive it manually.
pub fn responder_over<R, W, B>(
    reader: R,
    writer: W,
    backend: B,
    config: &LinkConfig,
) -> Result<(Responder<StreamPort<W>, B>, RxPump)>
where
    R: Read + Send + 'static,
    W: Write + Send,
    B: DfuBackend,
{
    let line = Arc::new(RxLine::for_requests(config.input_capacity));
    let pump = spawn_pump(reader, &line, &format!("{}_req", config.worker_name))?;
    let responder = Responder::new(StreamPort::new(writer), backend, line, config);
    Ok((responder, pump))
}

/// Open a serial device in raw mode and build a requester on it.
#[cfg(unix)]
pub fn open_requester(
    path: impl AsRef<std::path::Path>,
    baud: u32,
    config: &LinkConfig,
) -> Result<(Requester<StreamPort<std::fs::File>>, RxPump)> {
    let (reader, writer) = uartdfu_transport::open_raw(path, baud)?;
    requester_over(reader, writer, config)
}

/// Open a serial device in raw mode and build a responder on it.
#[cfg(unix)]
pub fn open_responder<B: DfuBackend>(
    path: impl AsRef<std::path::Path>,
    baud: u32,
    backend: B,
    config: &LinkConfig,
) -> Result<(Responder<StreamPort<std::fs::File>, B>, RxPump)> {
    let (reader, writer) = uartdfu_transport::open_raw(path, baud)?;
    responder_over(reader, writer, backend, config)
}

fn spawn_pump<R>(reader: R, line: &Arc<RxLine>, name: &str) -> Result<RxPump>
where
    R: Read + Send + 'static,
{
    let line = Arc::clone(line);
    let pump = RxPump::spawn(reader, move |byte: u8| line.on_byte(byte), name)?;
    Ok(pump)
}
