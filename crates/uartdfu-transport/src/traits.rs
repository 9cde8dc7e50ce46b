use std::io::{ErrorKind, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, TransportError};

/// Bytes queued before `poll_out` pushes them to the underlying stream.
const TX_CHUNK_SIZE: usize = 64;

/// Transmit side of a UART.
///
/// Mirrors a polled UART transmitter: one byte at a time, blocking until the
/// byte has been handed to the hardware.
pub trait SerialPort: Send {
    /// Transmit a single byte.
    fn poll_out(&mut self, byte: u8) -> Result<()>;

    /// Push any bytes the port is still holding onto the wire.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<P: SerialPort + ?Sized> SerialPort for Box<P> {
    fn poll_out(&mut self, byte: u8) -> Result<()> {
        (**self).poll_out(byte)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Receive side of a UART: called once per received byte.
///
/// Implementations run in interrupt context on a device, so they must not
/// block for long and must do O(1) work per byte.
pub trait RxHandler: Send + Sync {
    fn on_byte(&self, byte: u8);
}

impl<F> RxHandler for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_byte(&self, byte: u8) {
        self(byte)
    }
}

/// A [`SerialPort`] over any `Write` stream (raw tty, socket pair).
pub struct StreamPort<W> {
    inner: W,
    pending: BytesMut,
}

impl<W: Write + Send> StreamPort<W> {
    /// Wrap a writable stream.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(TX_CHUNK_SIZE),
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the port and return the inner stream. Unflushed bytes are lost.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_pending(&mut self) -> Result<()> {
        while self.pending.has_remaining() {
            match self.inner.write(self.pending.chunk()) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => self.pending.advance(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        self.pending.clear();
        Ok(())
    }
}

impl<W: Write + Send> SerialPort for StreamPort<W> {
    fn poll_out(&mut self, byte: u8) -> Result<()> {
        self.pending.put_u8(byte);
        if self.pending.len() >= TX_CHUNK_SIZE {
            self.write_pending()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.write_pending()?;
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl<W> std::fmt::Debug for StreamPort<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPort")
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn poll_out_buffers_until_flush() {
        let mut port = StreamPort::new(Cursor::new(Vec::<u8>::new()));
        for byte in b"xogq" {
            port.poll_out(*byte).unwrap();
        }
        assert!(port.get_ref().get_ref().is_empty());

        port.flush().unwrap();
        assert_eq!(port.get_ref().get_ref().as_slice(), b"xogq");
    }

    #[test]
    fn poll_out_spills_full_chunks() {
        let mut port = StreamPort::new(Cursor::new(Vec::<u8>::new()));
        for i in 0..TX_CHUNK_SIZE + 3 {
            port.poll_out(i as u8).unwrap();
        }
        assert_eq!(port.get_ref().get_ref().len(), TX_CHUNK_SIZE);

        port.flush().unwrap();
        let written = port.into_inner().into_inner();
        assert_eq!(written.len(), TX_CHUNK_SIZE + 3);
        assert_eq!(written[TX_CHUNK_SIZE + 2], (TX_CHUNK_SIZE + 2) as u8);
    }

    #[test]
    fn zero_write_reports_closed_link() {
        let mut port = StreamPort::new(ZeroWriter);
        port.poll_out(1).unwrap();
        let err = port.flush().unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn interrupted_and_would_block_writes_retry() {
        let sink = FlakyWriter {
            failures: 2,
            data: Vec::new(),
            flushed: AtomicBool::new(false),
        };
        let mut port = StreamPort::new(sink);
        port.poll_out(0x42).unwrap();
        port.flush().unwrap();

        let sink = port.into_inner();
        assert_eq!(sink.data, vec![0x42]);
        assert!(sink.flushed.load(Ordering::SeqCst));
    }

    #[test]
    fn closures_act_as_rx_handlers() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = {
            let count = Arc::clone(&count);
            move |_byte: u8| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };
        let shared: Arc<dyn RxHandler> = Arc::new(handler);
        shared.on_byte(1);
        shared.on_byte(2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FlakyWriter {
        failures: u8,
        data: Vec<u8>,
        flushed: AtomicBool,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.failures > 0 {
                self.failures -= 1;
                let kind = if self.failures % 2 == 0 {
                    ErrorKind::Interrupted
                } else {
                    ErrorKind::WouldBlock
                };
                return Err(std::io::Error::from(kind));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
