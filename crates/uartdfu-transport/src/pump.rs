use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::RxHandler;

const READ_CHUNK_SIZE: usize = 256;

/// Delivers bytes read from a stream to an [`RxHandler`], one byte per call.
///
/// The pump thread plays the role of the UART receive interrupt. It exits at
/// end of stream, on a hard I/O error, or after [`RxPump::stop`] once the next
/// read returns (streams with a read timeout return periodically).
pub struct RxPump {
    handle: Option<JoinHandle<Result<u64>>>,
    stop: Arc<AtomicBool>,
}

impl RxPump {
    /// Spawn a named pump thread reading from `reader`.
    pub fn spawn<R, H>(reader: R, handler: H, name: &str) -> Result<Self>
    where
        R: Read + Send + 'static,
        H: RxHandler + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || pump_loop(reader, &handler, &thread_stop))
            .map_err(TransportError::Io)?;

        Ok(Self {
            handle: Some(handle),
            stop,
        })
    }

    /// Ask the pump to exit after its current read.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether the pump thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Wait for the pump thread and return the number of bytes it delivered.
    pub fn join(mut self) -> Result<u64> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TransportError::Io(std::io::Error::other("rx pump panicked")))?,
            None => Ok(0),
        }
    }
}

impl Drop for RxPump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for RxPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxPump")
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn pump_loop<R: Read, H: RxHandler>(mut reader: R, handler: &H, stop: &AtomicBool) -> Result<u64> {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut delivered = 0u64;

    while !stop.load(Ordering::SeqCst) {
        let read = match reader.read(&mut chunk) {
            Ok(0) => {
                debug!(delivered, "serial link reached end of stream");
                return Ok(delivered);
            }
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(err) => {
                warn!(error = %err, "serial receive failed");
                return Err(TransportError::Io(err));
            }
        };

        for byte in &chunk[..read] {
            handler.on_byte(*byte);
        }
        delivered += read as u64;
    }

    debug!(delivered, "rx pump stopped");
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn delivers_every_byte_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let seen = Arc::clone(&seen);
            move |byte: u8| seen.lock().unwrap().push(byte)
        };

        let pump = RxPump::spawn(Cursor::new(b"xogq\x02\x00\x00\x00foqs".to_vec()), handler, "rx")
            .unwrap();
        assert_eq!(pump.join().unwrap(), 12);
        assert_eq!(seen.lock().unwrap().as_slice(), b"xogq\x02\x00\x00\x00foqs");
    }

    #[test]
    #[cfg(unix)]
    fn pump_over_socket_pair_ends_when_peer_closes() {
        let (mut left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let seen = Arc::clone(&seen);
            move |byte: u8| seen.lock().unwrap().push(byte)
        };

        let pump = RxPump::spawn(right, handler, "rx-pair").unwrap();
        left.write_all(&[1, 2, 3]).unwrap();
        drop(left);

        assert_eq!(pump.join().unwrap(), 3);
        assert_eq!(seen.lock().unwrap().as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn hard_read_errors_end_the_pump() {
        let pump = RxPump::spawn(BrokenReader, |_byte: u8| {}, "rx-broken").unwrap();
        let err = pump.join().unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
    }
}
