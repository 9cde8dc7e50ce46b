//! Blocking requester endpoint.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uartdfu_frame::{
    decode_response, encode_request, PacketBuffer, Request, Response, IMAGE_HEADER_SIZE,
};
use uartdfu_transport::SerialPort;

use crate::config::LinkConfig;
use crate::error::{DfuError, Result};
use crate::line::RxLine;
use crate::session::Session;

/// Requester side of a DFU link.
///
/// Each call frames one request, transmits it byte by byte and blocks until
/// the matching response arrives or the configured timeout expires. Calls are
/// never retried.
pub struct Requester<P> {
    port: P,
    line: Arc<RxLine>,
    out: PacketBuffer,
    timeout: Duration,
    session: Session,
}

impl<P: SerialPort> Requester<P> {
    /// Create a requester transmitting on `port` and receiving through `line`.
    ///
    /// `line` should be built with [`RxLine::for_responses`] and fed by the
    /// port's receive path.
    pub fn new(port: P, line: Arc<RxLine>, config: &LinkConfig) -> Self {
        Self {
            port,
            line,
            out: PacketBuffer::new(config.output_capacity),
            timeout: config.response_timeout,
            session: Session::default(),
        }
    }

    /// Announce an image of `file_size` bytes and start a new session.
    pub fn init(&mut self, file_size: u32, image_id: u8) -> Result<()> {
        self.session.reset();
        info!(file_size, image_id, "starting DFU session");
        let response = self.transact(&Request::Init {
            file_size,
            image_id,
        })?;
        check_status(response)
    }

    /// Send a chunk of image data.
    ///
    /// The first chunk of a session starts with the image header, which is
    /// stripped before framing; it must therefore be at least
    /// [`IMAGE_HEADER_SIZE`] bytes long.
    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let payload = if self.session.first_fragment() {
            if chunk.len() < IMAGE_HEADER_SIZE {
                return Err(DfuError::InvalidArgument(
                    "first fragment is shorter than the image header",
                ));
            }
            self.session.take_first_fragment();
            &chunk[IMAGE_HEADER_SIZE..]
        } else {
            chunk
        };
        self.session.mark_download_started();
        debug!(len = payload.len(), "sending image fragment");

        let response = self.transact(&Request::Write { chunk: payload })?;
        check_status(response)
    }

    /// Ask the responder how many image bytes it has stored.
    pub fn offset_get(&mut self) -> Result<u32> {
        let response = self.transact(&Request::Offset)?;
        match u32::try_from(response.status) {
            Ok(offset) => Ok(offset),
            Err(_) => {
                error!(status = response.status, "responder could not report offset");
                Err(DfuError::Backend(response.status))
            }
        }
    }

    /// Finish the session; `success = false` aborts it.
    pub fn done(&mut self, success: bool) -> Result<()> {
        let response = self.transact(&Request::Done { success });
        self.session.reset();
        info!(success, "DFU session finished");
        check_status(response?)
    }

    /// The responder schedules the update itself when DONE succeeds, so this
    /// only records the request.
    pub fn schedule_update(&mut self, image_id: u8) -> Result<()> {
        debug!(image_id, "update scheduling is handled by the responder");
        Ok(())
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn line(&self) -> &Arc<RxLine> {
        &self.line
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Consume the requester, returning the port.
    pub fn into_port(self) -> P {
        self.port
    }

    fn transact(&mut self, request: &Request<'_>) -> Result<Response> {
        let command = request.command();
        if self.line.discard_stale() {
            warn!(%command, "discarded stale inbound data before request");
        }

        if let Err(err) = encode_request(request, &mut self.out) {
            error!(%command, error = %err, "request does not fit the output buffer");
            return Err(err.into());
        }
        self.send_pending()?;

        if !self.line.completion().take_timeout(self.timeout) {
            self.line.mask().reset();
            error!(%command, timeout = ?self.timeout, "no response from responder");
            return Err(DfuError::Timeout(self.timeout));
        }

        let decoded = {
            let mut rx = self.line.mask();
            let decoded = decode_response(rx.frame());
            rx.reset();
            decoded
        };
        let response = match decoded {
            Ok(response) => response,
            Err(err) => {
                error!(%command, error = %err, "malformed response");
                return Err(err.into());
            }
        };

        if response.command != command {
            error!(
                expected = %command,
                received = %response.command,
                "response does not match request"
            );
            return Err(DfuError::CommandMismatch {
                expected: command,
                received: response.command,
            });
        }
        debug!(%command, status = response.status, "response received");
        Ok(response)
    }

    fn send_pending(&mut self) -> Result<()> {
        if self.out.is_empty() {
            warn!("no data to send");
            return Ok(());
        }
        for &byte in self.out.as_slice() {
            self.port.poll_out(byte)?;
        }
        self.port.flush()?;
        self.out.reset();
        Ok(())
    }
}

impl<P> std::fmt::Debug for Requester<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("timeout", &self.timeout)
            .field("session", &self.session)
            .field("out", &self.out)
            .finish_non_exhaustive()
    }
}

fn check_status(response: Response) -> Result<()> {
    if response.status == 0 {
        Ok(())
    } else {
        error!(command = %response.command, status = response.status, "responder reported an error");
        Err(DfuError::Backend(response.status))
    }
}
