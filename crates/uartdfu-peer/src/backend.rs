//! Firmware-update backend driven by the responder.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uartdfu_frame::errno;

/// Opaque error code reported by a backend, passed to the requester verbatim.
///
/// Codes are negative errno values by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("backend error {0}")]
pub struct BackendError(pub i32);

impl BackendError {
    /// Backend error for a positive errno constant.
    pub const fn errno(errno: i32) -> Self {
        Self(errno::status(errno))
    }

    pub fn code(self) -> i32 {
        self.0
    }
}

impl From<BackendError> for crate::DfuError {
    fn from(err: BackendError) -> Self {
        crate::DfuError::Backend(err.0)
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Device-side firmware-update backend.
///
/// Only the responder worker calls into the backend, one request at a time.
pub trait DfuBackend: Send {
    /// Prepare to receive an image of `file_size` bytes.
    fn init(&mut self, file_size: usize, image_id: u8) -> BackendResult<()>;

    /// Append a chunk of image data.
    fn write(&mut self, chunk: &[u8]) -> BackendResult<()>;

    /// Number of image bytes stored so far.
    fn offset_get(&mut self) -> BackendResult<usize>;

    /// Finish the transfer; `success` is false when the requester aborts.
    fn done(&mut self, success: bool) -> BackendResult<()>;

    /// Mark the received image for installation on next boot.
    fn schedule_update(&mut self, image_id: u8) -> BackendResult<()>;
}

impl<B: DfuBackend + ?Sized> DfuBackend for Box<B> {
    fn init(&mut self, file_size: usize, image_id: u8) -> BackendResult<()> {
        (**self).init(file_size, image_id)
    }

    fn write(&mut self, chunk: &[u8]) -> BackendResult<()> {
        (**self).write(chunk)
    }

    fn offset_get(&mut self) -> BackendResult<usize> {
        (**self).offset_get()
    }

    fn done(&mut self, success: bool) -> BackendResult<()> {
        (**self).done(success)
    }

    fn schedule_update(&mut self, image_id: u8) -> BackendResult<()> {
        (**self).schedule_update(image_id)
    }
}

/// State of a [`MemoryBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    /// Size announced by the last INIT.
    pub file_size: Option<usize>,
    /// Image id announced by the last INIT.
    pub image_id: Option<u8>,
    /// Image bytes received so far.
    pub data: Vec<u8>,
    /// Length of every chunk written, in order.
    pub writes: Vec<usize>,
    /// Success flag of the last DONE.
    pub finished: Option<bool>,
    /// Image id passed to the last `schedule_update`.
    pub scheduled: Option<u8>,
}

#[derive(Debug, Default)]
struct MemoryState {
    image: MemoryImage,
    max_size: Option<usize>,
    fail_next: Option<i32>,
}

/// In-memory backend; clones share the same image.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that refuses images larger than `max_size` bytes.
    pub fn with_max_size(max_size: usize) -> Self {
        let backend = Self::new();
        backend.lock().max_size = Some(max_size);
        backend
    }

    /// Make the next backend call fail with `code`.
    pub fn fail_next(&self, code: i32) {
        self.lock().fail_next = Some(code);
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> MemoryImage {
        self.lock().image.clone()
    }

    /// Preload received data, as if an earlier transfer was interrupted.
    pub fn preload(&self, data: &[u8]) {
        self.lock().image.data = data.to_vec();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> BackendResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        let injected = state.fail_next.take();
        match injected {
            Some(code) => Err(BackendError(code)),
            None => Ok(state),
        }
    }
}

impl DfuBackend for MemoryBackend {
    fn init(&mut self, file_size: usize, image_id: u8) -> BackendResult<()> {
        let mut state = self.begin()?;
        if state.max_size.is_some_and(|max| file_size > max) {
            return Err(BackendError::errno(errno::EFBIG));
        }
        // Resume is driven by offset_get, so data received earlier is kept.
        state.image.file_size = Some(file_size);
        state.image.image_id = Some(image_id);
        state.image.finished = None;
        state.image.scheduled = None;
        debug!(file_size, image_id, "memory backend initialised");
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> BackendResult<()> {
        let mut state = self.begin()?;
        let Some(file_size) = state.image.file_size else {
            return Err(BackendError::errno(errno::EINVAL));
        };
        if state.image.data.len() + chunk.len() > file_size {
            return Err(BackendError::errno(errno::EFBIG));
        }
        state.image.data.extend_from_slice(chunk);
        state.image.writes.push(chunk.len());
        Ok(())
    }

    fn offset_get(&mut self) -> BackendResult<usize> {
        let state = self.begin()?;
        Ok(state.image.data.len())
    }

    fn done(&mut self, success: bool) -> BackendResult<()> {
        let mut state = self.begin()?;
        state.image.finished = Some(success);
        if !success {
            state.image.data.clear();
        }
        Ok(())
    }

    fn schedule_update(&mut self, image_id: u8) -> BackendResult<()> {
        let mut state = self.begin()?;
        state.image.scheduled = Some(image_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_writes_in_order() {
        let mut backend = MemoryBackend::new();
        backend.init(6, 1).unwrap();
        backend.write(b"abc").unwrap();
        backend.write(b"de").unwrap();
        assert_eq!(backend.offset_get().unwrap(), 5);

        let image = backend.snapshot();
        assert_eq!(image.data, b"abcde");
        assert_eq!(image.writes, vec![3, 2]);
        assert_eq!(image.image_id, Some(1));
    }

    #[test]
    fn write_before_init_is_rejected() {
        let mut backend = MemoryBackend::new();
        assert_eq!(
            backend.write(b"x"),
            Err(BackendError::errno(errno::EINVAL))
        );
    }

    #[test]
    fn write_past_announced_size_is_rejected() {
        let mut backend = MemoryBackend::new();
        backend.init(2, 0).unwrap();
        assert_eq!(backend.write(b"abc"), Err(BackendError(-27)));
        assert!(backend.snapshot().data.is_empty());
    }

    #[test]
    fn oversized_image_is_refused() {
        let mut backend = MemoryBackend::with_max_size(100);
        assert_eq!(backend.init(101, 0), Err(BackendError(-27)));
        backend.init(100, 0).unwrap();
    }

    #[test]
    fn injected_failure_applies_once() {
        let mut backend = MemoryBackend::new();
        backend.fail_next(-5);
        assert_eq!(backend.offset_get(), Err(BackendError(-5)));
        assert_eq!(backend.offset_get(), Ok(0));
    }

    #[test]
    fn aborted_transfer_discards_data() {
        let mut backend = MemoryBackend::new();
        backend.init(4, 0).unwrap();
        backend.write(b"ab").unwrap();
        backend.done(false).unwrap();
        let image = backend.snapshot();
        assert_eq!(image.finished, Some(false));
        assert!(image.data.is_empty());
    }

    #[test]
    fn clones_share_state() {
        let backend = MemoryBackend::new();
        let mut handle = backend.clone();
        handle.init(1, 3).unwrap();
        handle.schedule_update(3).unwrap();
        assert_eq!(backend.snapshot().scheduled, Some(3));
    }
}
