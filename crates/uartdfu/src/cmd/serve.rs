use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use uartdfu_frame::errno;
use uartdfu_peer::{BackendError, BackendResult, DfuBackend};

use crate::cmd::ServeArgs;
use crate::exit::CliResult;
use crate::output::OutputFormat;

#[cfg(unix)]
pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use uartdfu_peer::{open_responder, LinkConfig};

    use crate::exit::{dfu_error, CliError, INTERNAL, SUCCESS};
    use crate::output::{print_serve, ServeReport, SERVE_SCHEMA_ID};

    let config = LinkConfig {
        worker_priority: args.priority,
        ..LinkConfig::default()
    };
    let backend = FileBackend::new(&args.out, args.max_size);
    let (responder, pump) = open_responder(&args.device, args.baud, backend, &config)
        .map_err(|err| dfu_error("open failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst)).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })?;

    let worker = responder
        .spawn()
        .map_err(|err| dfu_error("responder start failed", err))?;
    tracing::info!(
        device = %args.device.display(),
        out = %args.out.display(),
        "waiting for DFU requests, Ctrl-C to stop"
    );

    while running.load(Ordering::SeqCst) && !pump.is_finished() {
        std::thread::sleep(Duration::from_millis(100));
    }
    if pump.is_finished() {
        tracing::warn!("serial device closed");
    }
    pump.stop();

    let backend = worker
        .shutdown()
        .map_err(|err| dfu_error("responder shutdown failed", err))?
        .into_backend();
    let report = ServeReport {
        schema_id: SERVE_SCHEMA_ID,
        device: args.device.display().to_string(),
        out: args.out.display().to_string(),
        bytes_stored: backend.stored(),
        scheduled_image: backend.scheduled(),
    };
    print_serve(&report, format);
    Ok(SUCCESS)
}

#[cfg(not(unix))]
pub fn run(_args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "serial devices are only supported on Unix",
    ))
}

/// Backend that stores the received image in a file.
///
/// A file left over from an interrupted transfer is kept, so the requester
/// can resume from its length.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    max_size: Option<u64>,
    file: Option<File>,
    file_size: u64,
    stored: u64,
    scheduled: Option<u8>,
}

impl FileBackend {
    pub fn new(path: &Path, max_size: Option<u64>) -> Self {
        Self {
            path: path.to_path_buf(),
            max_size,
            file: None,
            file_size: 0,
            stored: 0,
            scheduled: None,
        }
    }

    pub fn stored(&self) -> u64 {
        self.stored
    }

    pub fn scheduled(&self) -> Option<u8> {
        self.scheduled
    }

    fn io_failure(&self, op: &str, err: std::io::Error) -> BackendError {
        tracing::error!(path = %self.path.display(), op, error = %err, "image file error");
        BackendError::errno(errno::EIO)
    }
}

impl DfuBackend for FileBackend {
    fn init(&mut self, file_size: usize, image_id: u8) -> BackendResult<()> {
        let file_size = file_size as u64;
        if self.max_size.is_some_and(|max| file_size > max) {
            return Err(BackendError::errno(errno::EFBIG));
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|err| self.io_failure("open", err))?;
        let mut stored = file
            .metadata()
            .map_err(|err| self.io_failure("stat", err))?
            .len();
        if stored > file_size {
            file.set_len(0)
                .map_err(|err| self.io_failure("truncate", err))?;
            stored = 0;
        }
        file.seek(SeekFrom::Start(stored))
            .map_err(|err| self.io_failure("seek", err))?;

        tracing::info!(file_size, image_id, stored, "image file ready");
        self.file = Some(file);
        self.file_size = file_size;
        self.stored = stored;
        self.scheduled = None;
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> BackendResult<()> {
        if self.stored + chunk.len() as u64 > self.file_size {
            return Err(BackendError::errno(errno::EFBIG));
        }
        let Some(file) = self.file.as_mut() else {
            return Err(BackendError::errno(errno::EINVAL));
        };
        if let Err(err) = file.write_all(chunk) {
            return Err(self.io_failure("write", err));
        }
        self.stored += chunk.len() as u64;
        Ok(())
    }

    fn offset_get(&mut self) -> BackendResult<usize> {
        Ok(self.stored as usize)
    }

    fn done(&mut self, success: bool) -> BackendResult<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let result = if success {
            file.sync_all()
        } else {
            self.stored = 0;
            file.set_len(0)
        };
        result.map_err(|err| self.io_failure("finish", err))
    }

    fn schedule_update(&mut self, image_id: u8) -> BackendResult<()> {
        tracing::info!(image_id, path = %self.path.display(), "image ready to install");
        self.scheduled = Some(image_id);
        Ok(())
    }
}
