//! Responder endpoint and its worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uartdfu_frame::{
    decode_request, encode_response, errno, peek_command, PacketBuffer, Request, Response,
};
use uartdfu_transport::SerialPort;

use crate::backend::{BackendError, BackendResult, DfuBackend};
use crate::config::LinkConfig;
use crate::error::{DfuError, Result};
use crate::line::RxLine;
use crate::session::Session;

/// Responder side of a DFU link.
///
/// Applies each received request to a [`DfuBackend`] and answers it with a
/// response carrying the same command tag.
pub struct Responder<P, B> {
    port: P,
    backend: B,
    line: Arc<RxLine>,
    out: PacketBuffer,
    session: Session,
    image_id: u8,
    worker_name: String,
    worker_priority: Option<i32>,
}

/// Handle to a running responder worker.
pub struct ResponderHandle<P, B> {
    thread: JoinHandle<Responder<P, B>>,
    stop: Arc<AtomicBool>,
    line: Arc<RxLine>,
}

impl<P: SerialPort, B: DfuBackend> Responder<P, B> {
    /// Create a responder transmitting on `port` and receiving through `line`.
    ///
    /// `line` should be built with [`RxLine::for_requests`] and fed by the
    /// port's receive path.
    pub fn new(port: P, backend: B, line: Arc<RxLine>, config: &LinkConfig) -> Self {
        Self {
            port,
            backend,
            line,
            out: PacketBuffer::new(config.output_capacity),
            session: Session::default(),
            image_id: 0,
            worker_name: config.worker_name.clone(),
            worker_priority: config.worker_priority,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn line(&self) -> &Arc<RxLine> {
        &self.line
    }

    /// Wait for one frame and answer it on the calling thread.
    ///
    /// `None` waits forever. Returns `false` if the timeout expired first.
    pub fn serve_one(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let signalled = match timeout {
            Some(timeout) => self.line.completion().take_timeout(timeout),
            None => {
                self.line.completion().take();
                true
            }
        };
        if signalled {
            self.process_pending()?;
        }
        Ok(signalled)
    }

    /// Answer the frame currently held by the receive line, if any.
    ///
    /// Reception stays masked until the response has been sent and the input
    /// buffer zeroed.
    pub fn process_pending(&mut self) -> Result<()> {
        let line = Arc::clone(&self.line);
        let mut rx = line.mask();
        if !rx.is_complete() {
            debug!(len = rx.len(), "woken without a complete frame");
            return Ok(());
        }
        let result = self.handle_frame(rx.frame());
        rx.clear();
        result
    }

    /// Start the worker thread.
    pub fn spawn(self) -> Result<ResponderHandle<P, B>>
    where
        P: 'static,
        B: 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let line = Arc::clone(&self.line);
        let name = self.worker_name.clone();
        let priority = self.worker_priority;

        let worker_stop = Arc::clone(&stop);
        let mut responder = self;
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                apply_priority(priority);
                responder.run(&worker_stop);
                responder
            })
            .map_err(DfuError::WorkerSpawn)?;

        info!(worker = %name, "DFU responder started");
        Ok(ResponderHandle { thread, stop, line })
    }

    fn run(&mut self, stop: &AtomicBool) {
        loop {
            self.line.completion().take();
            if stop.load(Ordering::Acquire) {
                break;
            }
            if let Err(err) = self.process_pending() {
                error!(error = %err, "failed to answer request");
            }
        }
        debug!("DFU responder worker exiting");
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<()> {
        let command = match peek_command(frame) {
            Ok(command) => command,
            Err(err) => {
                warn!(error = %err, len = frame.len(), "dropping frame without a known command");
                return Ok(());
            }
        };
        debug!(%command, len = frame.len(), "request received");

        let status = match decode_request(frame) {
            Ok(request) => self.apply(request),
            Err(err) => {
                error!(%command, error = %err, "malformed request");
                errno::status(errno::EINVAL)
            }
        };
        if status < 0 {
            debug!(%command, status, "replying with error");
        }
        self.reply(Response::new(command, status))
    }

    fn apply(&mut self, request: Request<'_>) -> i32 {
        match request {
            Request::Init {
                file_size,
                image_id,
            } => {
                self.session.reset();
                self.image_id = image_id;
                info!(file_size, image_id, "DFU init");
                status_of(self.backend.init(file_size as usize, image_id))
            }
            Request::Write { chunk } => {
                self.session.mark_download_started();
                status_of(self.backend.write(chunk))
            }
            Request::Offset => match self.backend.offset_get() {
                Ok(offset) => i32::try_from(offset).unwrap_or_else(|_| {
                    warn!(offset, "offset does not fit the status field");
                    errno::status(errno::EOVERFLOW)
                }),
                Err(err) => offset_error(err),
            },
            Request::Done { success } => {
                self.session.reset();
                info!(success, "DFU done");
                match self.backend.done(success) {
                    Ok(()) => status_of(self.backend.schedule_update(self.image_id)),
                    Err(err) => status_of(Err(err)),
                }
            }
        }
    }

    fn reply(&mut self, response: Response) -> Result<()> {
        encode_response(&response, &mut self.out)?;
        for &byte in self.out.as_slice() {
            self.port.poll_out(byte)?;
        }
        self.port.flush()?;
        self.out.reset();
        Ok(())
    }
}

impl<P, B> ResponderHandle<P, B> {
    /// Stop the worker and return the responder.
    ///
    /// A request that arrives concurrently with the stop may go unanswered.
    pub fn shutdown(self) -> Result<Responder<P, B>> {
        self.stop.store(true, Ordering::Release);
        self.line.completion().give();
        self.thread.join().map_err(|_| DfuError::WorkerPanicked)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

impl<P, B> std::fmt::Debug for Responder<P, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("session", &self.session)
            .field("image_id", &self.image_id)
            .field("worker_name", &self.worker_name)
            .finish_non_exhaustive()
    }
}

impl<P, B> std::fmt::Debug for ResponderHandle<P, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderHandle")
            .field("worker", &self.thread.thread().name())
            .field("stopping", &self.stop.load(Ordering::Relaxed))
            .finish()
    }
}

fn status_of(result: BackendResult<()>) -> i32 {
    match result {
        Ok(()) => errno::OK,
        Err(err) => {
            error!(code = err.code(), "backend error");
            err.code()
        }
    }
}

/// OFFSET carries errors in the same field as the offset, so they must be
/// negative to be told apart.
fn offset_error(err: BackendError) -> i32 {
    error!(code = err.code(), "backend could not report offset");
    match err.code() {
        code if code < 0 => code,
        0 => errno::status(errno::EIO),
        code => -code,
    }
}

#[cfg(target_os = "linux")]
fn apply_priority(priority: Option<i32>) {
    let Some(nice) = priority else {
        return;
    };
    // SAFETY: setpriority only reads its integer arguments; who = 0 selects
    // the calling thread on Linux.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if rc == 0 {
        debug!(nice, "worker priority set");
    } else {
        warn!(nice, error = %std::io::Error::last_os_error(), "could not set worker priority");
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_priority(priority: Option<i32>) {
    if let Some(nice) = priority {
        debug!(nice, "worker priority is not supported on this platform");
    }
}
